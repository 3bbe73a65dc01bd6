// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Committed state changes, published after the transaction that caused them.

use serde::{Deserialize, Serialize};

use crate::types::{
    AttendanceItem, ChannelId, ContactId, Conversation, ConversationId, Message, OperatorId,
    TenantId,
};

/// Server-to-operator frame on the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperatorEvent {
    NewConversation {
        conversation: Conversation,
    },
    /// An attendance item entered, moved within or left the queue.
    /// `escalated` is set when the item breached its SLA.
    QueueUpdate {
        item: AttendanceItem,
        escalated: bool,
    },
    MessageAppended {
        message: Message,
    },
    AssignmentChanged {
        item: AttendanceItem,
        previous_agent: Option<OperatorId>,
    },
}

impl OperatorEvent {
    /// Queue-level events go to every operator of the tenant; message events
    /// only to operators subscribed to the conversation.
    pub fn is_tenant_wide(&self) -> bool {
        !matches!(self, OperatorEvent::MessageAppended { .. })
    }

    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            OperatorEvent::NewConversation { conversation } => &conversation.id,
            OperatorEvent::QueueUpdate { item, .. } => &item.conversation_id,
            OperatorEvent::MessageAppended { message } => &message.conversation_id,
            OperatorEvent::AssignmentChanged { item, .. } => &item.conversation_id,
        }
    }
}

/// Internal event published on the bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// Fan out to the tenant's operator consoles.
    Operator {
        tenant_id: TenantId,
        event: OperatorEvent,
    },
    /// An attendance item exceeded its SLA deadline.
    SlaBreached {
        tenant_id: TenantId,
        item: AttendanceItem,
    },
    /// A closed conversation should receive a satisfaction survey.
    SurveyRequested {
        tenant_id: TenantId,
        conversation_id: ConversationId,
        contact_id: ContactId,
        channel_id: ChannelId,
    },
}

impl BusEvent {
    pub fn operator(tenant_id: &TenantId, event: OperatorEvent) -> Self {
        BusEvent::Operator {
            tenant_id: tenant_id.clone(),
            event,
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        match self {
            BusEvent::Operator { tenant_id, .. }
            | BusEvent::SlaBreached { tenant_id, .. }
            | BusEvent::SurveyRequested { tenant_id, .. } => tenant_id,
        }
    }
}
