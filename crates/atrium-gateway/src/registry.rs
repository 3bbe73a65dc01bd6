// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide registry of live operator connections.
//!
//! Each connection owns a bounded outbound buffer. Broadcast never waits:
//! a full or closed buffer removes that connection and delivery to the
//! others continues. Connect and disconnect are the only writers;
//! broadcast tolerates a connection vanishing between lookup and send.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, DashSet};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use atrium_core::OperatorEvent;
use atrium_core::traits::auth::Principal;
use atrium_core::types::{ConversationId, OperatorId, TenantId};

pub type ConnectionId = u64;

struct OperatorConnection {
    tenant_id: TenantId,
    operator_id: OperatorId,
    tx: mpsc::Sender<Arc<str>>,
    conversations: DashSet<ConversationId>,
}

pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, OperatorConnection>,
    buffer: usize,
}

impl ConnectionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Adds a connection for `principal` and returns its id and the
    /// receiving end of its outbound buffer.
    pub fn register(&self, principal: &Principal) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections.insert(
            id,
            OperatorConnection {
                tenant_id: principal.tenant_id.clone(),
                operator_id: principal.operator_id.clone(),
                tx,
                conversations: DashSet::new(),
            },
        );
        metrics::gauge!("atrium_operator_connections").set(self.connections.len() as f64);
        debug!(connection_id = id, tenant_id = %principal.tenant_id, operator_id = %principal.operator_id, "operator connected");
        (id, rx)
    }

    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            metrics::gauge!("atrium_operator_connections").set(self.connections.len() as f64);
            debug!(connection_id = id, "operator disconnected");
        }
        removed
    }

    /// Subscribes a connection to a conversation's message events.
    pub fn join(&self, id: ConnectionId, conversation_id: ConversationId) -> bool {
        match self.connections.get(&id) {
            Some(conn) => {
                conn.conversations.insert(conversation_id);
                true
            }
            None => false,
        }
    }

    pub fn leave(&self, id: ConnectionId, conversation_id: &ConversationId) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|conn| conn.conversations.remove(conversation_id).is_some())
    }

    pub fn is_subscribed(&self, id: ConnectionId, conversation_id: &ConversationId) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|conn| conn.conversations.contains(conversation_id))
    }

    /// Queues a frame for one connection. A full or closed buffer drops
    /// the connection.
    pub fn send_to(&self, id: ConnectionId, frame: &impl Serialize) -> bool {
        let payload: Arc<str> = match serde_json::to_string(frame) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(error = %e, "failed to serialize operator frame");
                return false;
            }
        };
        let sent = match self.connections.get(&id) {
            Some(conn) => conn.tx.try_send(payload).is_ok(),
            None => return false,
        };
        if !sent {
            self.drop_connection(id, "send_failed");
        }
        sent
    }

    /// Delivers an event to every matching connection of the tenant and
    /// returns how many accepted it. Message events only reach connections
    /// subscribed to the conversation; assignment events also subscribe the
    /// newly assigned operator's connections.
    pub fn broadcast(&self, tenant_id: &TenantId, event: &OperatorEvent) -> usize {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(error = %e, "failed to serialize operator event");
                return 0;
            }
        };
        let assignee = match event {
            OperatorEvent::AssignmentChanged { item, .. } => item.assigned_agent.as_ref(),
            _ => None,
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            let conn = entry.value();
            if &conn.tenant_id != tenant_id {
                continue;
            }
            if assignee == Some(&conn.operator_id) {
                conn.conversations.insert(event.conversation_id().clone());
            }
            if !event.is_tenant_wide() && !conn.conversations.contains(event.conversation_id()) {
                continue;
            }
            match conn.tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => dead.push((*entry.key(), "lagging")),
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push((*entry.key(), "closed")),
            }
        }
        for (id, reason) in dead {
            self.drop_connection(id, reason);
        }
        delivered
    }

    fn drop_connection(&self, id: ConnectionId, reason: &'static str) {
        if let Some((_, conn)) = self.connections.remove(&id) {
            warn!(
                connection_id = id,
                tenant_id = %conn.tenant_id,
                operator_id = %conn.operator_id,
                reason,
                "dropping operator connection"
            );
            metrics::counter!("atrium_operator_drops_total", "reason" => reason).increment(1);
            metrics::gauge!("atrium_operator_connections").set(self.connections.len() as f64);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drops every connection. Closing the buffers ends the socket tasks.
    pub fn clear(&self) {
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use atrium_core::types::{
        AttendanceItem, AttendanceStatus, ChannelId, ChannelType, ContentType, DeliveryStatus,
        Direction, HandoffReason, ItemId, Message, MessageId, SenderKind,
    };

    use tracing_test::traced_test;

    use super::*;

    fn principal(tenant: &str, operator: &str) -> Principal {
        Principal {
            tenant_id: TenantId::from(tenant),
            operator_id: OperatorId::from(operator),
            name: operator.into(),
            skills: Vec::new(),
        }
    }

    fn item(conversation: &str, agent: Option<&str>) -> AttendanceItem {
        AttendanceItem {
            id: ItemId::from("i1"),
            tenant_id: TenantId::from("t1"),
            conversation_id: ConversationId::from(conversation),
            channel_type: ChannelType::Whatsapp,
            priority: 0,
            status: AttendanceStatus::Waiting,
            assigned_agent: agent.map(OperatorId::from),
            handoff_reason: HandoffReason::Keyword,
            enqueued_at: "2026-03-02T15:00:00.000Z".into(),
            sla_deadline: "2026-03-02T15:05:00.000Z".into(),
            sla_breached: false,
            updated_at: "2026-03-02T15:00:00.000Z".into(),
            resolved_at: None,
        }
    }

    fn message(conversation: &str) -> Message {
        Message {
            id: MessageId::from("m1"),
            tenant_id: TenantId::from("t1"),
            conversation_id: ConversationId::from(conversation),
            channel_id: ChannelId::from("ch"),
            seq: 1,
            direction: Direction::Inbound,
            sender_kind: SenderKind::Contact,
            sender_id: None,
            content_type: ContentType::Text,
            content: "oi".into(),
            media_url: None,
            delivery_status: DeliveryStatus::Received,
            external_id: None,
            provider_timestamp: None,
            created_at: "2026-03-02T15:00:00.000Z".into(),
        }
    }

    fn queue_update(conversation: &str) -> OperatorEvent {
        OperatorEvent::QueueUpdate {
            item: item(conversation, None),
            escalated: false,
        }
    }

    #[tokio::test]
    async fn queue_events_reach_the_whole_tenant_only() {
        let registry = ConnectionRegistry::new(8);
        let (_, mut ana) = registry.register(&principal("t1", "ana"));
        let (_, mut bia) = registry.register(&principal("t1", "bia"));
        let (_, mut other) = registry.register(&principal("t2", "zed"));

        let tenant = TenantId::from("t1");
        assert_eq!(registry.broadcast(&tenant, &queue_update("c1")), 2);
        assert!(ana.recv().await.unwrap().contains("queue_update"));
        assert!(bia.recv().await.unwrap().contains("queue_update"));
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn message_events_need_a_subscription() {
        let registry = ConnectionRegistry::new(8);
        let (ana_id, mut ana) = registry.register(&principal("t1", "ana"));
        let (_, mut bia) = registry.register(&principal("t1", "bia"));
        let tenant = TenantId::from("t1");
        let event = OperatorEvent::MessageAppended { message: message("c1") };

        assert_eq!(registry.broadcast(&tenant, &event), 0);
        assert!(registry.join(ana_id, ConversationId::from("c1")));
        assert_eq!(registry.broadcast(&tenant, &event), 1);
        assert!(ana.recv().await.unwrap().contains("message_appended"));
        assert!(bia.try_recv().is_err());

        assert!(registry.leave(ana_id, &ConversationId::from("c1")));
        assert_eq!(registry.broadcast(&tenant, &event), 0);
    }

    #[tokio::test]
    async fn assignment_subscribes_the_assignee() {
        let registry = ConnectionRegistry::new(8);
        let (ana_id, _ana) = registry.register(&principal("t1", "ana"));
        let (bia_id, _bia) = registry.register(&principal("t1", "bia"));
        let event = OperatorEvent::AssignmentChanged {
            item: item("c9", Some("ana")),
            previous_agent: None,
        };
        assert_eq!(registry.broadcast(&TenantId::from("t1"), &event), 2);
        assert!(registry.is_subscribed(ana_id, &ConversationId::from("c9")));
        assert!(!registry.is_subscribed(bia_id, &ConversationId::from("c9")));
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_send_removes_only_that_connection() {
        let registry = ConnectionRegistry::new(1);
        let (_, slow) = registry.register(&principal("t1", "slow"));
        let (_, gone) = registry.register(&principal("t1", "gone"));
        let (_, mut live) = registry.register(&principal("t1", "live"));
        drop(gone);
        let tenant = TenantId::from("t1");

        // First event fills the slow buffer and drops the closed one.
        assert_eq!(registry.broadcast(&tenant, &queue_update("c1")), 2);
        assert_eq!(registry.len(), 2);
        live.recv().await.unwrap();

        // Second event finds the slow buffer full.
        assert_eq!(registry.broadcast(&tenant, &queue_update("c2")), 1);
        assert_eq!(registry.len(), 1);
        assert!(live.recv().await.unwrap().contains("c2"));
        assert!(logs_contain("dropping operator connection"));
        assert!(logs_contain("reason=\"closed\""));
        drop(slow);
    }

    #[test]
    fn unregister_and_clear() {
        let registry = ConnectionRegistry::new(4);
        let (id, _rx) = registry.register(&principal("t1", "ana"));
        let (_, _rx2) = registry.register(&principal("t1", "bia"));
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(!registry.join(id, ConversationId::from("c1")));
        registry.clear();
        assert!(registry.is_empty());
    }
}
