// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use atrium_agent::ProcessOutcome;
use atrium_config::model::TenantOverride;
use atrium_core::traits::storage::InboundStatus;
use atrium_core::traits::stream::StreamFrame;
use atrium_core::types::{
    AttendanceStatus, ChannelId, ChannelType, ContactStatus, ConversationId, ConversationStatus,
    DeliveryStatus, Direction, HandoffReason, SenderKind,
};
use atrium_core::AtriumError;
use atrium_queue::AssignResult;
use atrium_test_utils::{Scripted, TestHarness};
use chrono::Duration;

fn recorded(outcome: ProcessOutcome) -> (ConversationId, ConversationStatus) {
    match outcome {
        ProcessOutcome::Recorded {
            conversation_id,
            status,
        } => (conversation_id, status),
        ProcessOutcome::Duplicate => panic!("unexpected duplicate"),
    }
}

#[tokio::test]
async fn bot_reply_is_streamed_recorded_and_dispatched() {
    let h = TestHarness::builder()
        .with_script(vec![Scripted::Reply("Olá! Como posso ajudar?".into())])
        .build()
        .await
        .unwrap();
    let ch = h.channel(ChannelType::Webchat).await.unwrap();
    h.streams.connect(&ch.tenant_id, &ch.id, "session-1");

    let record = TestHarness::inbound(&ch, "session-1", "m1", "oi");
    let (conv, status) = recorded(h.process(&record, TestHarness::clock()).await.unwrap());
    assert_eq!(status, ConversationStatus::WaitingBot);

    let messages = h.storage.list_messages(&ch.tenant_id, &conv, 0, 10).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].direction, Direction::Outbound);
    assert_eq!(messages[1].sender_kind, SenderKind::Bot);
    assert_eq!(messages[1].content, "Olá! Como posso ajudar?");
    assert_eq!(messages[1].delivery_status, DeliveryStatus::Delivered);

    let sent = h.dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "session-1");

    let frames = h.streams.frames(&ch.tenant_id, &ch.id, "session-1");
    let chunks: String = frames
        .iter()
        .filter_map(|f| match f {
            StreamFrame::ChatChunk { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, "Olá! Como posso ajudar?");
    assert!(matches!(
        frames.last(),
        Some(StreamFrame::ChatComplete { handoff: false, text, .. }) if text == "Olá! Como posso ajudar?"
    ));

    // The responder saw the inbound message in its history.
    let requests = h.responder.requests().await;
    assert_eq!(requests[0].history.len(), 1);
}

#[tokio::test]
async fn keyword_hands_off_without_calling_the_bot() {
    let h = TestHarness::new().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();
    let record = TestHarness::inbound(&ch, "5511999990000", "wamid.1", "Quero falar com um ATENDENTE");
    let (conv, status) = recorded(h.process(&record, TestHarness::clock()).await.unwrap());

    assert_eq!(status, ConversationStatus::WaitingHuman);
    assert!(h.responder.requests().await.is_empty());
    let item = h.storage.active_item(&ch.tenant_id, &conv).await.unwrap().unwrap();
    assert_eq!(item.status, AttendanceStatus::Waiting);
    assert_eq!(item.handoff_reason, HandoffReason::Keyword);
}

#[tokio::test]
async fn consecutive_fallbacks_reach_the_queue() {
    let h = TestHarness::builder()
        .with_script(vec![
            Scripted::Fallback("Não entendi.".into()),
            Scripted::Fallback("Pode repetir?".into()),
            Scripted::Fallback("Ainda não entendi.".into()),
        ])
        .build()
        .await
        .unwrap();
    let ch = h.channel(ChannelType::Sms).await.unwrap();
    let now = TestHarness::clock();

    let mut last = ConversationStatus::Open;
    let mut conv = None;
    for i in 0..3 {
        let record = TestHarness::inbound(&ch, "+5511988887777", &format!("sms-{i}"), "???");
        let (id, status) = recorded(h.process(&record, now).await.unwrap());
        conv = Some(id);
        last = status;
        if i < 2 {
            assert_eq!(status, ConversationStatus::WaitingBot);
        }
    }
    assert_eq!(last, ConversationStatus::WaitingHuman);
    let item = h
        .storage
        .active_item(&ch.tenant_id, &conv.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.handoff_reason, HandoffReason::BotFailures);
}

#[tokio::test]
async fn a_good_reply_resets_the_fallback_count() {
    let h = TestHarness::builder()
        .with_script(vec![
            Scripted::Fallback("Hã?".into()),
            Scripted::Fallback("Hã?".into()),
            Scripted::Reply("Entendi!".into()),
            Scripted::Fallback("Hã?".into()),
        ])
        .build()
        .await
        .unwrap();
    let ch = h.channel(ChannelType::Sms).await.unwrap();
    for i in 0..4 {
        let record = TestHarness::inbound(&ch, "+5511988887777", &format!("sms-{i}"), "x");
        let (_, status) = recorded(h.process(&record, TestHarness::clock()).await.unwrap());
        assert_eq!(status, ConversationStatus::WaitingBot);
    }
}

#[tokio::test]
async fn responder_failure_degrades_to_the_queue() {
    let h = TestHarness::builder()
        .with_script(vec![Scripted::Fail("upstream 502".into())])
        .build()
        .await
        .unwrap();
    let ch = h.channel(ChannelType::Webchat).await.unwrap();
    h.streams.connect(&ch.tenant_id, &ch.id, "s1");
    let record = TestHarness::inbound(&ch, "s1", "m1", "oi");
    let (conv, status) = recorded(h.process(&record, TestHarness::clock()).await.unwrap());

    assert_eq!(status, ConversationStatus::WaitingHuman);
    let item = h.storage.active_item(&ch.tenant_id, &conv).await.unwrap().unwrap();
    assert_eq!(item.handoff_reason, HandoffReason::ResponderUnavailable);

    // The inbound message is kept and the end user gets an explicit error.
    let messages = h.storage.list_messages(&ch.tenant_id, &conv, 0, 10).await.unwrap();
    assert_eq!(messages[0].content, "oi");
    let frames = h.streams.frames(&ch.tenant_id, &ch.id, "s1");
    assert!(matches!(frames.as_slice(), [StreamFrame::Error { .. }]));
}

#[tokio::test]
async fn responder_timeout_is_a_failure() {
    let h = TestHarness::builder()
        .with_script(vec![Scripted::Hang])
        .build()
        .await
        .unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();
    let record = TestHarness::inbound(&ch, "5511999990000", "wamid.1", "oi");
    let (_, status) = recorded(h.process(&record, TestHarness::clock()).await.unwrap());
    assert_eq!(status, ConversationStatus::WaitingHuman);
}

#[tokio::test]
async fn responder_requested_handoff_keeps_the_reply() {
    let h = TestHarness::builder()
        .with_script(vec![Scripted::Handoff("Vou chamar alguém.".into())])
        .build()
        .await
        .unwrap();
    let ch = h.channel(ChannelType::Instagram).await.unwrap();
    let record = TestHarness::inbound(&ch, "17841400000001", "mid.1", "tenho uma reclamação");
    let (conv, status) = recorded(h.process(&record, TestHarness::clock()).await.unwrap());

    assert_eq!(status, ConversationStatus::WaitingHuman);
    let messages = h.storage.list_messages(&ch.tenant_id, &conv, 0, 10).await.unwrap();
    assert_eq!(messages.last().unwrap().content, "Vou chamar alguém.");
    let item = h.storage.active_item(&ch.tenant_id, &conv).await.unwrap().unwrap();
    assert_eq!(item.handoff_reason, HandoffReason::ResponderRequested);
}

#[tokio::test]
async fn disabled_bot_routes_straight_to_humans() {
    let h = TestHarness::builder()
        .configure(|c| {
            c.tenants.push(TenantOverride {
                id: "t1".into(),
                bot_enabled: Some(false),
                ..Default::default()
            })
        })
        .build()
        .await
        .unwrap();
    let ch = h.channel(ChannelType::Email).await.unwrap();
    let record = TestHarness::inbound(&ch, "ana@example.com", "<m1@example.com>", "Olá");
    let (conv, status) = recorded(h.process(&record, TestHarness::clock()).await.unwrap());
    assert_eq!(status, ConversationStatus::WaitingHuman);
    assert!(h.responder.requests().await.is_empty());
    let item = h.storage.active_item(&ch.tenant_id, &conv).await.unwrap().unwrap();
    assert_eq!(item.handoff_reason, HandoffReason::BotDisabled);
}

#[tokio::test]
async fn no_chunks_after_the_client_disconnects() {
    let h = TestHarness::builder()
        .with_script(vec![Scripted::Reply("um dois três quatro".into())])
        .build()
        .await
        .unwrap();
    let ch = h.channel(ChannelType::Webchat).await.unwrap();
    h.streams
        .connect_with_capacity(&ch.tenant_id, &ch.id, "s1", Some(2));
    let record = TestHarness::inbound(&ch, "s1", "m1", "conta até quatro");
    let (conv, _) = recorded(h.process(&record, TestHarness::clock()).await.unwrap());

    assert_eq!(h.streams.frames(&ch.tenant_id, &ch.id, "s1").len(), 2);
    // The reply is still recorded in full.
    let messages = h.storage.list_messages(&ch.tenant_id, &conv, 0, 10).await.unwrap();
    assert_eq!(messages[1].content, "um dois três quatro");
}

#[tokio::test]
async fn dispatch_failure_marks_the_message_failed() {
    let h = TestHarness::new().await.unwrap();
    h.dispatcher.set_failing(true);
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();
    let record = TestHarness::inbound(&ch, "5511999990000", "wamid.1", "oi");
    let (conv, status) = recorded(h.process(&record, TestHarness::clock()).await.unwrap());
    assert_eq!(status, ConversationStatus::WaitingBot);
    let messages = h.storage.list_messages(&ch.tenant_id, &conv, 0, 10).await.unwrap();
    assert_eq!(messages[1].delivery_status, DeliveryStatus::Failed);
}

#[tokio::test]
async fn only_the_assigned_operator_replies() {
    let h = TestHarness::new().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();
    let record = TestHarness::inbound(&ch, "5511999990000", "wamid.1", "atendente");
    let (conv, _) = recorded(h.process(&record, TestHarness::clock()).await.unwrap());
    let item = h.storage.active_item(&ch.tenant_id, &conv).await.unwrap().unwrap();

    let ana = TestHarness::operator("ana", vec![]);
    let assigned = h.queue.assign(&ana, &item.id, TestHarness::clock()).await.unwrap();
    assert!(matches!(assigned, AssignResult::Assigned(_)));

    let bia = TestHarness::operator("bia", vec![]);
    let err = h
        .orchestrator
        .send_agent_message(&bia, &conv, "posso ajudar?", TestHarness::clock())
        .await
        .unwrap_err();
    assert!(matches!(err, AtriumError::AssignmentConflict { .. }));

    let message = h
        .orchestrator
        .send_agent_message(&ana, &conv, "Oi, sou a Ana.", TestHarness::clock())
        .await
        .unwrap();
    assert_eq!(message.sender_kind, SenderKind::Agent);
    let sent = h.dispatcher.sent();
    assert_eq!(sent.last().unwrap().recipient, "5511999990000");
    assert_eq!(sent.last().unwrap().message.content, "Oi, sou a Ana.");
}

#[tokio::test]
async fn worker_drains_accepted_entries_once() {
    let h = TestHarness::builder().with_scoring().build().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();
    let now = TestHarness::clock();
    let first = TestHarness::inbound(&ch, "5511999990000", "wamid.1", "oi");
    let second = TestHarness::inbound(&ch, "5511999990000", "wamid.2", "qual o preço do plano?");
    h.accept(&first, now).await.unwrap();
    h.accept(&second, now).await.unwrap();
    h.accept(&first, now).await.unwrap();

    assert_eq!(h.drain(now).await.unwrap(), 2);
    assert_eq!(h.drain(now).await.unwrap(), 0);

    let conversations = h
        .storage
        .list_conversations(&ch.tenant_id, None, 10)
        .await
        .unwrap();
    assert_eq!(conversations.len(), 1);
    let messages = h
        .storage
        .list_messages(&ch.tenant_id, &conversations[0].id, 0, 10)
        .await
        .unwrap();
    let inbound: Vec<_> = messages
        .iter()
        .filter(|m| m.direction == Direction::Inbound)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(inbound, vec!["oi", "qual o preço do plano?"]);

    let contact = h
        .storage
        .get_contact(&ch.tenant_id, &conversations[0].contact_id)
        .await
        .unwrap();
    assert!(contact.lead_score.unwrap() > 0.0);
    assert_eq!(contact.status, ContactStatus::Lead);
}

#[tokio::test]
async fn failing_entries_back_off_then_fail() {
    let h = TestHarness::builder()
        .configure(|c| {
            c.ingestion.max_attempts = 2;
            c.ingestion.retry_base_secs = 10;
        })
        .build()
        .await
        .unwrap();
    let ch = h.channel(ChannelType::Sms).await.unwrap();
    let mut orphan = TestHarness::inbound(&ch, "+5511988887777", "sms-1", "oi");
    orphan.channel_id = ChannelId::from("deleted-channel");

    let now = TestHarness::clock();
    h.accept(&orphan, now).await.unwrap();
    assert_eq!(h.drain(now).await.unwrap(), 1);
    // Not due again until the backoff elapses.
    assert_eq!(h.drain(now + Duration::seconds(5)).await.unwrap(), 0);
    assert_eq!(h.drain(now + Duration::seconds(10)).await.unwrap(), 1);

    let depth = h.storage.inbound_depth().await.unwrap();
    assert!(depth.contains(&(InboundStatus::Failed, 1)));
}
