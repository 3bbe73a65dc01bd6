// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration as StdDuration;

use atrium_bus::{BusSubscriber, EventBus};
use atrium_config::model::{AtriumConfig, OperatorConfig, StorageConfig, TenantOverride};
use atrium_core::traits::auth::Principal;
use atrium_core::traits::storage::{InboundAppend, InboundOutcome, ResolveContact};
use atrium_core::types::{
    AttendanceItem, AttendanceStatus, CanonicalInbound, Channel, ChannelType, CloseReason,
    ContentType, ConversationId, ConversationStatus, HandoffReason, OperatorId, TenantId,
    format_ts,
};
use atrium_core::{AtriumError, BusEvent, OperatorEvent, StorageAdapter};
use atrium_queue::{AssignResult, AttendanceQueue};
use atrium_storage::SqliteStorage;
use chrono::{DateTime, Duration, TimeZone, Utc};

struct Fixture {
    storage: Arc<SqliteStorage>,
    queue: AttendanceQueue,
    bus: EventBus,
    _dir: tempfile::TempDir,
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap()
}

async fn fixture(config: AtriumConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(SqliteStorage::new(StorageConfig {
        database_path: dir.path().join("queue.db").display().to_string(),
        wal_mode: true,
    }));
    storage.initialize().await.unwrap();
    let bus = EventBus::new(64);
    let queue = AttendanceQueue::new(storage.clone(), bus.clone(), Arc::new(config));
    Fixture {
        storage,
        queue,
        bus,
        _dir: dir,
    }
}

fn principal(operator: &str, skills: Vec<ChannelType>) -> Principal {
    Principal {
        tenant_id: TenantId::from("t1"),
        operator_id: OperatorId::from(operator),
        name: operator.to_uppercase(),
        skills,
    }
}

fn roster() -> AtriumConfig {
    let operator = |token: &str, tenant: &str, id: &str, skills: Vec<ChannelType>| OperatorConfig {
        token: token.into(),
        tenant_id: tenant.into(),
        operator_id: id.into(),
        name: id.into(),
        skills,
    };
    let mut config = AtriumConfig::default();
    config.operators = vec![
        operator("tok-ana", "t1", "ana", vec![]),
        operator("tok-bia", "t1", "bia", vec![]),
        operator("tok-caio", "t1", "caio", vec![ChannelType::Email]),
        operator("tok-zed", "t2", "zed", vec![]),
    ];
    config
}

/// Opens a bot-handled conversation on a fresh channel of the given type.
async fn conversation(f: &Fixture, channel_type: ChannelType, contact: &str) -> ConversationId {
    let channel = Channel::new(TenantId::from("t1"), channel_type, "main", "secret");
    f.storage.create_channel(&channel).await.unwrap();
    let now = format_ts(base());
    let contact_id = f
        .storage
        .resolve_contact(ResolveContact {
            tenant_id: channel.tenant_id.clone(),
            channel_type,
            external_id: contact.into(),
            display_name: None,
            phone: None,
            email: None,
            now: now.clone(),
        })
        .await
        .unwrap()
        .contact
        .id;
    let outcome = f
        .storage
        .record_inbound(InboundAppend {
            record: CanonicalInbound {
                tenant_id: channel.tenant_id.clone(),
                channel_id: channel.id.clone(),
                channel_type,
                external_contact_id: contact.into(),
                contact_name: None,
                contact_phone: None,
                contact_email: None,
                external_message_id: format!("{contact}-1"),
                content: "oi".into(),
                content_type: ContentType::Text,
                media_url: None,
                provider_timestamp: None,
            },
            contact_id,
            handoff: None,
            now,
        })
        .await
        .unwrap();
    match outcome {
        InboundOutcome::Recorded(r) => r.conversation.id,
        InboundOutcome::Duplicate => panic!("fresh conversation reported as duplicate"),
    }
}

async fn queued(f: &Fixture, channel_type: ChannelType, contact: &str, at: DateTime<Utc>) -> AttendanceItem {
    let conv = conversation(f, channel_type, contact).await;
    f.queue
        .enqueue(&TenantId::from("t1"), &conv, HandoffReason::Keyword, at)
        .await
        .unwrap()
        .item
}

async fn drain(sub: &mut BusSubscriber) -> Vec<Arc<BusEvent>> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(StdDuration::from_millis(50), sub.recv()).await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn enqueue_announces_the_item_and_the_handoff_message() {
    let f = fixture(AtriumConfig::default()).await;
    let mut sub = f.bus.subscribe("test");
    let item = queued(&f, ChannelType::Whatsapp, "5511", base()).await;

    assert_eq!(item.status, AttendanceStatus::Waiting);
    assert_eq!(item.sla_deadline, format_ts(base() + Duration::seconds(300)));

    let events = drain(&mut sub).await;
    assert!(events.iter().any(|e| matches!(
        e.as_ref(),
        BusEvent::Operator { event: OperatorEvent::MessageAppended { message }, .. }
            if message.content == "handoff:keyword"
    )));
    assert!(events.iter().any(|e| matches!(
        e.as_ref(),
        BusEvent::Operator { event: OperatorEvent::QueueUpdate { escalated: false, .. }, .. }
    )));
}

#[tokio::test]
async fn manual_handoffs_outrank_routine_ones() {
    let f = fixture(AtriumConfig::default()).await;
    let tenant = TenantId::from("t1");
    let routine = f.queue.plan(&tenant, HandoffReason::Keyword, base());
    let manual = f.queue.plan(&tenant, HandoffReason::Manual, base());
    assert!(manual.priority > routine.priority);
}

#[tokio::test]
async fn concurrent_assignment_has_one_winner() {
    let f = fixture(AtriumConfig::default()).await;
    let first = queued(&f, ChannelType::Whatsapp, "5511", base()).await;
    let second = queued(&f, ChannelType::Whatsapp, "5512", base() + Duration::seconds(1)).await;

    let ana = principal("ana", vec![]);
    let bia = principal("bia", vec![]);
    let now = base() + Duration::seconds(10);
    let (a, b) = tokio::join!(
        f.queue.assign(&ana, &first.id, now),
        f.queue.assign(&bia, &first.id, now)
    );
    let results = [a.unwrap(), b.unwrap()];

    let winners = results
        .iter()
        .filter(|r| matches!(r, AssignResult::Assigned(_)))
        .count();
    assert_eq!(winners, 1);
    let offered = results.iter().find_map(|r| match r {
        AssignResult::Conflict { next } => Some(next.clone()),
        AssignResult::Assigned(_) => None,
    });
    let offered = offered.flatten().expect("loser should be offered the next item");
    assert_eq!(offered.id, second.id);
    assert_eq!(offered.status, AttendanceStatus::Waiting);
}

#[tokio::test]
async fn pull_next_respects_skills_and_order() {
    let f = fixture(AtriumConfig::default()).await;
    let wa = queued(&f, ChannelType::Whatsapp, "5511", base()).await;
    let sms_old = queued(&f, ChannelType::Sms, "5512", base() + Duration::seconds(1)).await;
    let sms_new = queued(&f, ChannelType::Sms, "5513", base() + Duration::seconds(2)).await;

    let sms_only = principal("carla", vec![ChannelType::Sms]);
    let now = base() + Duration::seconds(5);
    let got = f.queue.pull_next(&sms_only, now).await.unwrap().unwrap();
    assert_eq!(got.id, sms_old.id);
    assert_eq!(got.assigned_agent, Some(OperatorId::from("carla")));
    let got = f.queue.pull_next(&sms_only, now).await.unwrap().unwrap();
    assert_eq!(got.id, sms_new.id);
    assert!(f.queue.pull_next(&sms_only, now).await.unwrap().is_none());

    let generalist = principal("dani", vec![]);
    let got = f.queue.pull_next(&generalist, now).await.unwrap().unwrap();
    assert_eq!(got.id, wa.id);
}

#[tokio::test]
async fn assign_outside_skills_is_unauthorized() {
    let f = fixture(AtriumConfig::default()).await;
    let item = queued(&f, ChannelType::Email, "ana@example.com", base()).await;
    let err = f
        .queue
        .assign(&principal("carla", vec![ChannelType::Sms]), &item.id, base())
        .await
        .unwrap_err();
    assert!(matches!(err, AtriumError::Unauthorized(_)));
}

#[tokio::test]
async fn transfer_reports_the_previous_agent() {
    let f = fixture(roster()).await;
    let item = queued(&f, ChannelType::Webchat, "s1", base()).await;
    let ana = principal("ana", vec![]);
    f.queue.assign(&ana, &item.id, base()).await.unwrap();

    let mut sub = f.bus.subscribe("test");
    let record = f
        .queue
        .transfer(&ana, &item.id, Some(OperatorId::from("bia")), base())
        .await
        .unwrap();
    assert_eq!(record.previous_agent, Some(OperatorId::from("ana")));
    assert_eq!(record.item.status, AttendanceStatus::Transferred);
    assert_eq!(record.item.enqueued_at, item.enqueued_at);

    let events = drain(&mut sub).await;
    assert!(events.iter().any(|e| matches!(
        e.as_ref(),
        BusEvent::Operator {
            event: OperatorEvent::AssignmentChanged { previous_agent: Some(prev), .. },
            ..
        } if prev.as_str() == "ana"
    )));

    // Ana no longer holds it.
    let err = f.queue.transfer(&ana, &item.id, None, base()).await.unwrap_err();
    assert!(matches!(err, AtriumError::AssignmentConflict { .. }));
}

#[tokio::test]
async fn transfer_targets_must_attend_the_tenant_and_channel() {
    let f = fixture(roster()).await;
    let item = queued(&f, ChannelType::Webchat, "s1", base()).await;
    let ana = principal("ana", vec![]);
    f.queue.assign(&ana, &item.id, base()).await.unwrap();

    let err = f
        .queue
        .transfer(&ana, &item.id, Some(OperatorId::from("zed")), base())
        .await
        .unwrap_err();
    assert!(matches!(err, AtriumError::NotFound { entity: "operator", .. }));
    let err = f
        .queue
        .transfer(&ana, &item.id, Some(OperatorId::from("nobody")), base())
        .await
        .unwrap_err();
    assert!(matches!(err, AtriumError::NotFound { entity: "operator", .. }));
    let err = f
        .queue
        .transfer(&ana, &item.id, Some(OperatorId::from("caio")), base())
        .await
        .unwrap_err();
    assert!(matches!(err, AtriumError::Unauthorized(_)));

    // Rejected targets leave the item with ana.
    let held = f.storage.get_item(&item.tenant_id, &item.id).await.unwrap();
    assert_eq!(held.status, AttendanceStatus::Assigned);
    assert_eq!(held.assigned_agent, Some(OperatorId::from("ana")));

    let record = f
        .queue
        .transfer(&ana, &item.id, Some(OperatorId::from("bia")), base())
        .await
        .unwrap();
    assert_eq!(record.item.assigned_agent, Some(OperatorId::from("bia")));
}

#[tokio::test]
async fn only_the_assigned_operator_closes_and_a_survey_follows() {
    let mut config = AtriumConfig::default();
    config.tenants.push(TenantOverride {
        id: "t1".into(),
        survey_on_close: Some(true),
        ..Default::default()
    });
    let f = fixture(config).await;
    let item = queued(&f, ChannelType::Whatsapp, "5511", base()).await;
    let ana = principal("ana", vec![]);
    f.queue.assign(&ana, &item.id, base()).await.unwrap();

    let err = f
        .queue
        .close_by_operator(&principal("bia", vec![]), &item.conversation_id, base())
        .await
        .unwrap_err();
    assert!(matches!(err, AtriumError::AssignmentConflict { .. }));

    let mut sub = f.bus.subscribe("test");
    let record = f
        .queue
        .close_by_operator(&ana, &item.conversation_id, base())
        .await
        .unwrap();
    assert_eq!(record.conversation.status, ConversationStatus::Closed);
    assert_eq!(record.item.unwrap().status, AttendanceStatus::Resolved);

    let events = drain(&mut sub).await;
    assert!(events.iter().any(|e| matches!(e.as_ref(), BusEvent::SurveyRequested { .. })));
}

#[tokio::test]
async fn closing_a_waiting_conversation_abandons_its_item() {
    let f = fixture(AtriumConfig::default()).await;
    let item = queued(&f, ChannelType::Sms, "5511", base()).await;
    let record = f
        .queue
        .close(&item.tenant_id, &item.conversation_id, CloseReason::Admin, base())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.item.unwrap().status, AttendanceStatus::Abandoned);
    assert_eq!(f.queue.snapshot(&item.tenant_id).await.unwrap().waiting, 0);
}

#[tokio::test]
async fn sla_sweep_escalates_each_item_once() {
    let f = fixture(AtriumConfig::default()).await;
    let item = queued(&f, ChannelType::Whatsapp, "5511", base()).await;
    let mut sub = f.bus.subscribe("test");

    assert_eq!(f.queue.sweep_sla(base() + Duration::seconds(299)).await.unwrap(), 0);
    assert_eq!(f.queue.sweep_sla(base() + Duration::seconds(300)).await.unwrap(), 1);
    assert_eq!(f.queue.sweep_sla(base() + Duration::seconds(900)).await.unwrap(), 0);

    let events = drain(&mut sub).await;
    let breaches = events
        .iter()
        .filter(|e| matches!(e.as_ref(), BusEvent::SlaBreached { item: i, .. } if i.id == item.id))
        .count();
    assert_eq!(breaches, 1);
    assert!(events.iter().any(|e| matches!(
        e.as_ref(),
        BusEvent::Operator { event: OperatorEvent::QueueUpdate { escalated: true, .. }, .. }
    )));

    // Still waiting, and still first in line.
    let snapshot = f.queue.snapshot(&item.tenant_id).await.unwrap();
    assert_eq!(snapshot.waiting, 1);
    assert_eq!(snapshot.breached, 1);
}

#[tokio::test]
async fn idle_sweep_closes_quiet_attendances_only() {
    let f = fixture(AtriumConfig::default()).await;
    let quiet = queued(&f, ChannelType::Whatsapp, "5511", base()).await;
    let busy = queued(&f, ChannelType::Whatsapp, "5512", base()).await;
    let ana = principal("ana", vec![]);
    f.queue.assign(&ana, &quiet.id, base()).await.unwrap();
    f.queue
        .assign(&ana, &busy.id, base() + Duration::minutes(20))
        .await
        .unwrap();

    let closed = f.queue.sweep_idle(base() + Duration::minutes(31)).await.unwrap();
    assert_eq!(closed, 1);

    let tenant = TenantId::from("t1");
    let quiet_conv = f
        .storage
        .get_conversation(&tenant, &quiet.conversation_id)
        .await
        .unwrap();
    assert_eq!(quiet_conv.status, ConversationStatus::Closed);
    let busy_conv = f
        .storage
        .get_conversation(&tenant, &busy.conversation_id)
        .await
        .unwrap();
    assert_eq!(busy_conv.status, ConversationStatus::InAttendance);
}

#[tokio::test]
async fn zero_idle_timeout_disables_the_sweep() {
    let mut config = AtriumConfig::default();
    config.routing.idle_timeout_mins = 0;
    let f = fixture(config).await;
    let item = queued(&f, ChannelType::Sms, "5511", base()).await;
    f.queue
        .assign(&principal("ana", vec![]), &item.id, base())
        .await
        .unwrap();
    let report = f.queue.sweep(base() + Duration::days(2)).await.unwrap();
    assert_eq!(report.idle_closed, 0);
}
