// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end routing scenarios over the assembled stack.
//!
//! Records that enter through the webhook gateway are stamped with the
//! wall clock, so those tests drain with `Utc::now()`.

use atrium_agent::ProcessOutcome;
use atrium_core::types::{
    AttendanceStatus, Channel, ChannelType, ConversationId, ConversationStatus, Direction,
    HandoffReason, SenderKind,
};
use atrium_core::{AtriumError, WebhookRequest};
use atrium_ingest::signature::{HUB_SIGNATURE_HEADER, sign_hub};
use atrium_queue::AssignResult;
use atrium_test_utils::TestHarness;
use chrono::{Duration, Utc};
use serde_json::json;

const SENDER: &str = "5511977776666";

fn whatsapp_delivery(message_id: &str, text: &str) -> WebhookRequest {
    let body = serde_json::to_vec(&json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "102290129340398",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550783881", "phone_number_id": "106540352242922"},
                    "contacts": [{"profile": {"name": "João"}, "wa_id": SENDER}],
                    "messages": [{
                        "from": SENDER, "id": message_id, "timestamp": "1700000000",
                        "type": "text", "text": {"body": text}
                    }]
                }
            }]
        }]
    }))
    .unwrap();
    let signature = sign_hub("test-secret", &body);
    WebhookRequest::new(body).with_header(HUB_SIGNATURE_HEADER, signature)
}

async fn deliver(h: &TestHarness, ch: &Channel, message_id: &str, text: &str) -> (usize, usize) {
    let report = h
        .gateway
        .ingest(ch.channel_type, &ch.id, whatsapp_delivery(message_id, text))
        .await
        .unwrap();
    (report.accepted.len(), report.duplicates)
}

async fn only_conversation(h: &TestHarness) -> atrium_core::types::Conversation {
    let mut conversations = h
        .storage
        .list_conversations(&TestHarness::tenant(), None, 10)
        .await
        .unwrap();
    assert_eq!(conversations.len(), 1);
    conversations.remove(0)
}

fn conversation_of(outcome: ProcessOutcome) -> ConversationId {
    match outcome {
        ProcessOutcome::Recorded { conversation_id, .. } => conversation_id,
        ProcessOutcome::Duplicate => panic!("unexpected duplicate"),
    }
}

#[tokio::test]
async fn scenario_a_first_contact_gets_a_bot_reply() {
    let h = TestHarness::new().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();

    assert_eq!(deliver(&h, &ch, "wamid.A1", "oi, tudo bem?").await, (1, 0));
    assert_eq!(h.drain(Utc::now()).await.unwrap(), 1);

    let contacts = h.storage.list_contacts(&TestHarness::tenant(), 10, 0).await.unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].name, "João");
    let identities = h
        .storage
        .contact_identities(&TestHarness::tenant(), &contacts[0].id)
        .await
        .unwrap();
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0].external_id, SENDER);

    let conv = only_conversation(&h).await;
    assert_eq!(conv.contact_id, contacts[0].id);
    assert_eq!(conv.status, ConversationStatus::WaitingBot);

    let messages = h
        .storage
        .list_messages(&TestHarness::tenant(), &conv.id, 0, 10)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].direction, Direction::Inbound);
    assert_eq!(messages[1].sender_kind, SenderKind::Bot);
    assert_eq!(h.dispatcher.sent().len(), 1);
}

#[tokio::test]
async fn scenario_b_keyword_moves_the_conversation_to_the_queue() {
    let h = TestHarness::new().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();

    deliver(&h, &ch, "wamid.B1", "oi").await;
    h.drain(Utc::now()).await.unwrap();
    deliver(&h, &ch, "wamid.B2", "prefiro falar com um atendente").await;
    h.drain(Utc::now()).await.unwrap();

    let conv = only_conversation(&h).await;
    assert_eq!(conv.status, ConversationStatus::WaitingHuman);

    let items = h.storage.list_items(&TestHarness::tenant(), None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, AttendanceStatus::Waiting);
    assert_eq!(items[0].conversation_id, conv.id);
    assert_eq!(items[0].handoff_reason, HandoffReason::Keyword);

    // The keyword message never reached the bot.
    assert_eq!(h.responder.requests().await.len(), 1);
}

#[tokio::test]
async fn scenario_c_racing_operators_get_one_assignment_and_the_next_item() {
    let h = TestHarness::new().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();
    let now = TestHarness::clock();

    let first = conversation_of(
        h.process(&TestHarness::inbound(&ch, "551101", "wamid.C1", "atendente"), now)
            .await
            .unwrap(),
    );
    let second = conversation_of(
        h.process(
            &TestHarness::inbound(&ch, "551102", "wamid.C2", "atendente"),
            now + Duration::seconds(1),
        )
        .await
        .unwrap(),
    );
    let contested = h.storage.active_item(&ch.tenant_id, &first).await.unwrap().unwrap();

    let ana = TestHarness::operator("ana", vec![]);
    let bia = TestHarness::operator("bia", vec![]);
    let (a, b) = tokio::join!(
        h.queue.assign(&ana, &contested.id, now),
        h.queue.assign(&bia, &contested.id, now),
    );
    let results = [a.unwrap(), b.unwrap()];

    let winners = results
        .iter()
        .filter(|r| matches!(r, AssignResult::Assigned(_)))
        .count();
    assert_eq!(winners, 1);
    let next = results.iter().find_map(|r| match r {
        AssignResult::Conflict { next } => Some(next.clone()),
        AssignResult::Assigned(_) => None,
    });
    let next = next.flatten().expect("loser is offered the next item");
    assert_eq!(next.conversation_id, second);
    assert_eq!(next.status, AttendanceStatus::Waiting);

    let item = h.storage.get_item(&ch.tenant_id, &contested.id).await.unwrap();
    assert_eq!(item.status, AttendanceStatus::Assigned);
    let conv = h.storage.get_conversation(&ch.tenant_id, &first).await.unwrap();
    assert_eq!(conv.status, ConversationStatus::InAttendance);
    assert_eq!(conv.assigned_agent, item.assigned_agent);
}

#[tokio::test]
async fn scenario_d_redelivered_webhook_is_a_no_op() {
    let h = TestHarness::new().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();

    assert_eq!(deliver(&h, &ch, "wamid.XYZ", "oi").await, (1, 0));
    h.drain(Utc::now()).await.unwrap();
    let before = only_conversation(&h).await;

    assert_eq!(deliver(&h, &ch, "wamid.XYZ", "oi").await, (0, 1));
    assert_eq!(h.drain(Utc::now()).await.unwrap(), 0);

    let after = only_conversation(&h).await;
    assert_eq!(after.status, before.status);
    assert_eq!(after.message_count, before.message_count);
    assert_eq!(after.last_seq, before.last_seq);
}

#[tokio::test]
async fn scenario_e_idle_attendance_closes_without_inbound() {
    let h = TestHarness::new().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();
    let now = TestHarness::clock();
    let conv = conversation_of(
        h.process(&TestHarness::inbound(&ch, SENDER, "wamid.E1", "atendente"), now)
            .await
            .unwrap(),
    );
    let ana = TestHarness::operator("ana", vec![]);
    assert!(h.queue.pull_next(&ana, now).await.unwrap().is_some());

    let timeout = i64::try_from(h.config.routing.idle_timeout_mins).unwrap();
    let report = h.queue.sweep(now + Duration::minutes(timeout - 1)).await.unwrap();
    assert_eq!(report.idle_closed, 0);
    let report = h.queue.sweep(now + Duration::minutes(timeout + 1)).await.unwrap();
    assert_eq!(report.idle_closed, 1);

    let closed = h.storage.get_conversation(&ch.tenant_id, &conv).await.unwrap();
    assert_eq!(closed.status, ConversationStatus::Closed);
    let inbound_after = h
        .storage
        .list_messages(&ch.tenant_id, &conv, 0, 50)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.direction == Direction::Inbound)
        .count();
    assert_eq!(inbound_after, 1);
    assert!(h.storage.active_item(&ch.tenant_id, &conv).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_create_one_message() {
    let h = TestHarness::new().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();

    let (a, b, c) = tokio::join!(
        deliver(&h, &ch, "wamid.DUP", "oi"),
        deliver(&h, &ch, "wamid.DUP", "oi"),
        deliver(&h, &ch, "wamid.DUP", "oi"),
    );
    assert_eq!(a.0 + b.0 + c.0, 1);
    assert_eq!(a.1 + b.1 + c.1, 2);
    h.drain(Utc::now()).await.unwrap();

    let conv = only_conversation(&h).await;
    let inbound = h
        .storage
        .list_messages(&ch.tenant_id, &conv.id, 0, 50)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.direction == Direction::Inbound)
        .count();
    assert_eq!(inbound, 1);
}

#[tokio::test]
async fn simultaneous_first_contacts_share_one_contact() {
    let h = TestHarness::new().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();
    let now = TestHarness::clock();
    let first = TestHarness::inbound(&ch, SENDER, "wamid.R1", "oi");
    let second = TestHarness::inbound(&ch, SENDER, "wamid.R2", "alguém aí?");

    let (a, b) = tokio::join!(h.process(&first, now), h.process(&second, now));
    assert_eq!(conversation_of(a.unwrap()), conversation_of(b.unwrap()));

    let contacts = h.storage.list_contacts(&ch.tenant_id, 10, 0).await.unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].total_conversations, 1);
}

#[tokio::test]
async fn sequence_numbers_increase_across_senders() {
    let h = TestHarness::new().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();
    let now = TestHarness::clock();

    let conv = conversation_of(
        h.process(&TestHarness::inbound(&ch, SENDER, "wamid.S1", "oi"), now)
            .await
            .unwrap(),
    );
    h.process(
        &TestHarness::inbound(&ch, SENDER, "wamid.S2", "atendente"),
        now + Duration::seconds(1),
    )
    .await
    .unwrap();
    let ana = TestHarness::operator("ana", vec![]);
    h.queue.pull_next(&ana, now + Duration::seconds(2)).await.unwrap();
    h.orchestrator
        .send_agent_message(&ana, &conv, "Oi, sou a Ana.", now + Duration::seconds(3))
        .await
        .unwrap();
    h.process(
        &TestHarness::inbound(&ch, SENDER, "wamid.S3", "obrigado"),
        now + Duration::seconds(4),
    )
    .await
    .unwrap();

    let messages = h.storage.list_messages(&ch.tenant_id, &conv, 0, 50).await.unwrap();
    assert!(messages.len() >= 5);
    let seqs: Vec<i64> = messages.iter().map(|m| m.seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "seqs out of order: {seqs:?}");
    let kinds: Vec<SenderKind> = messages.iter().map(|m| m.sender_kind).collect();
    assert!(kinds.contains(&SenderKind::Bot));
    assert!(kinds.contains(&SenderKind::Agent));
    assert_eq!(messages.last().map(|m| m.content.as_str()), Some("obrigado"));
}

#[tokio::test]
async fn a_conversation_holds_one_active_item() {
    let h = TestHarness::new().await.unwrap();
    let ch = h.channel(ChannelType::Whatsapp).await.unwrap();
    let now = TestHarness::clock();
    let conv = conversation_of(
        h.process(&TestHarness::inbound(&ch, SENDER, "wamid.I1", "oi"), now)
            .await
            .unwrap(),
    );

    let (a, b) = tokio::join!(
        h.queue.enqueue(&ch.tenant_id, &conv, HandoffReason::Manual, now),
        h.queue.enqueue(&ch.tenant_id, &conv, HandoffReason::Manual, now),
    );
    let oks = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(oks, 1);
    let rejected = if a.is_err() { a.err() } else { b.err() };
    assert!(matches!(rejected, Some(AtriumError::InvalidTransition { .. })));

    let active: Vec<_> = h
        .storage
        .list_items(&ch.tenant_id, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|item| item.conversation_id == conv && !item.status.is_terminal())
        .collect();
    assert_eq!(active.len(), 1);
}
