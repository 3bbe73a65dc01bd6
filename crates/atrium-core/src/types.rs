// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical domain model shared by every Atrium component.
//!
//! Every entity is scoped to exactly one tenant. Timestamps are UTC strings
//! in a fixed-width RFC 3339 form (see [`format_ts`]) so they sort
//! lexicographically in storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// A company/clinic account.
    TenantId
);
string_id!(ChannelId);
string_id!(ContactId);
string_id!(ConversationId);
string_id!(MessageId);
string_id!(
    /// Identifier of an attendance queue item.
    ItemId
);
string_id!(
    /// Identifier of a human operator (attendant).
    OperatorId
);

/// Formats a timestamp the way storage expects it (`2026-01-01T00:00:00.000Z`).
pub fn format_ts(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Current time in storage format.
pub fn now_ts() -> String {
    format_ts(Utc::now())
}

/// Parses a storage timestamp back into a `DateTime`.
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// External channel family.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelType {
    Whatsapp,
    Instagram,
    Facebook,
    Email,
    Sms,
    Webchat,
}

impl ChannelType {
    pub const ALL: [ChannelType; 6] = [
        ChannelType::Whatsapp,
        ChannelType::Instagram,
        ChannelType::Facebook,
        ChannelType::Email,
        ChannelType::Sms,
        ChannelType::Webchat,
    ];

    /// Whether the external contact id on this channel is a phone number.
    pub fn is_phone_based(&self) -> bool {
        matches!(self, ChannelType::Whatsapp | ChannelType::Sms)
    }
}

/// Lifecycle of a configured channel integration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelStatus {
    Configuring,
    Active,
    Suspended,
    Error,
    Inactive,
}

impl ChannelStatus {
    /// Allowed lifecycle moves. Channels are never deleted, only deactivated.
    pub fn can_transition_to(&self, next: ChannelStatus) -> bool {
        use ChannelStatus::*;
        match (self, next) {
            (Inactive, _) => false,
            (_, Inactive) => true,
            (Configuring, Active) => true,
            (Active, Suspended) | (Active, Error) => true,
            (Suspended, Active) | (Error, Active) => true,
            (Suspended, Error) | (Error, Suspended) => true,
            _ => false,
        }
    }

    /// Whether webhook deliveries are processed in this status.
    pub fn accepts_deliveries(&self) -> bool {
        matches!(self, ChannelStatus::Configuring | ChannelStatus::Active)
    }
}

/// Tenant-scoped external integration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub tenant_id: TenantId,
    pub channel_type: ChannelType,
    pub name: String,
    pub status: ChannelStatus,
    /// WhatsApp / SMS sender number id.
    pub phone_number_id: Option<String>,
    /// Instagram / Facebook page id.
    pub page_id: Option<String>,
    /// Email mailbox address.
    pub mailbox: Option<String>,
    /// Opaque encrypted provider credentials. Never inspected here.
    #[serde(skip_serializing)]
    pub credentials: Option<Vec<u8>>,
    #[serde(skip_serializing)]
    pub webhook_secret: String,
    #[serde(skip_serializing)]
    pub verify_token: Option<String>,
    pub messages_received: i64,
    pub messages_sent: i64,
    pub active_conversations: i64,
    pub consecutive_failures: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("channel_type", &self.channel_type)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("credentials", &self.credentials.as_ref().map(|_| "[redacted]"))
            .field("webhook_secret", &"[redacted]")
            .field("verify_token", &self.verify_token.as_ref().map(|_| "[redacted]"))
            .field("messages_received", &self.messages_received)
            .field("messages_sent", &self.messages_sent)
            .field("active_conversations", &self.active_conversations)
            .finish()
    }
}

impl Channel {
    /// Builds a new channel in `configuring` status with zeroed counters.
    pub fn new(
        tenant_id: TenantId,
        channel_type: ChannelType,
        name: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        let now = now_ts();
        Self {
            id: ChannelId::generate(),
            tenant_id,
            channel_type,
            name: name.into(),
            status: ChannelStatus::Configuring,
            phone_number_id: None,
            page_id: None,
            mailbox: None,
            credentials: None,
            webhook_secret: webhook_secret.into(),
            verify_token: None,
            messages_received: 0,
            messages_sent: 0,
            active_conversations: 0,
            consecutive_failures: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Commercial lifecycle of a contact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContactStatus {
    Lead,
    Qualified,
    Customer,
    Inactive,
    Blocked,
}

/// Unified identity of one person within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Digits-only phone number, the cross-channel merge signal.
    pub phone: Option<String>,
    /// Lowercased email address, the other merge signal.
    pub email: Option<String>,
    pub status: ContactStatus,
    pub lead_score: Option<f64>,
    pub total_conversations: i64,
    pub total_purchases: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// One channel-specific alias of a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactIdentity {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub channel_type: ChannelType,
    pub external_id: String,
    pub created_at: String,
}

/// Routing status of a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    WaitingBot,
    WaitingHuman,
    InAttendance,
    Closed,
    Archived,
}

impl ConversationStatus {
    /// Conversations that still route messages (not closed or archived).
    pub fn is_live(&self) -> bool {
        !matches!(self, ConversationStatus::Closed | ConversationStatus::Archived)
    }
}

/// The unit of routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub tenant_id: TenantId,
    pub channel_id: ChannelId,
    pub contact_id: ContactId,
    pub status: ConversationStatus,
    pub assigned_agent: Option<OperatorId>,
    pub message_count: i64,
    /// Last value of the conversation-scoped append sequence.
    pub last_seq: i64,
    pub last_message_at: Option<String>,
    /// Start of the current idle window (last inbound or pickup).
    pub idle_since: Option<String>,
    /// Consecutive automated replies the bot flagged as fallbacks.
    pub bot_failures: i64,
    /// Incremented every time a closed conversation is re-opened.
    pub cycle: i64,
    pub created_at: String,
    pub updated_at: String,
    pub closed_at: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SenderKind {
    Contact,
    Bot,
    Agent,
    System,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentType {
    Text,
    Media,
    SystemEvent,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Received,
    Processed,
    Delivered,
    Failed,
}

/// Immutable, sequence-ordered unit of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub channel_id: ChannelId,
    /// Conversation-scoped append sequence, strictly increasing.
    pub seq: i64,
    pub direction: Direction,
    pub sender_kind: SenderKind,
    pub sender_id: Option<String>,
    pub content_type: ContentType,
    pub content: String,
    pub media_url: Option<String>,
    pub delivery_status: DeliveryStatus,
    /// Provider message id, the idempotency key for inbound messages.
    pub external_id: Option<String>,
    pub provider_timestamp: Option<String>,
    pub created_at: String,
}

/// Status of an attendance queue item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Waiting,
    Assigned,
    InProgress,
    Transferred,
    Resolved,
    Abandoned,
}

impl AttendanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttendanceStatus::Resolved | AttendanceStatus::Abandoned)
    }

    /// Statuses in which an operator holds the item.
    pub fn is_held(&self) -> bool {
        matches!(
            self,
            AttendanceStatus::Assigned | AttendanceStatus::InProgress | AttendanceStatus::Transferred
        )
    }
}

/// Why a conversation moved from automated to human handling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HandoffReason {
    Keyword,
    BotFailures,
    BotDisabled,
    AfterHours,
    ResponderRequested,
    ResponderUnavailable,
    Manual,
}

/// Queue-facing wrapper around a conversation awaiting or under human handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceItem {
    pub id: ItemId,
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    /// Channel of the wrapped conversation; used as the routing skill.
    pub channel_type: ChannelType,
    pub priority: i64,
    pub status: AttendanceStatus,
    pub assigned_agent: Option<OperatorId>,
    pub handoff_reason: HandoffReason,
    /// Original enqueue time. Preserved across transfers.
    pub enqueued_at: String,
    pub sla_deadline: String,
    pub sla_breached: bool,
    pub updated_at: String,
    pub resolved_at: Option<String>,
}

/// Why a conversation was closed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CloseReason {
    AgentClosed,
    IdleTimeout,
    Admin,
}

/// Channel-agnostic inbound message produced by a webhook adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalInbound {
    pub tenant_id: TenantId,
    pub channel_id: ChannelId,
    pub channel_type: ChannelType,
    pub external_contact_id: String,
    /// Display name reported by the provider, if any.
    pub contact_name: Option<String>,
    /// Phone number reported alongside the sender, used as a merge signal.
    pub contact_phone: Option<String>,
    /// Email address reported alongside the sender, used as a merge signal.
    pub contact_email: Option<String>,
    pub external_message_id: String,
    pub content: String,
    pub content_type: ContentType,
    pub media_url: Option<String>,
    pub provider_timestamp: Option<String>,
}

/// Per-tenant queue counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub waiting: i64,
    pub assigned: i64,
    pub in_progress: i64,
    pub transferred: i64,
    pub breached: i64,
    pub oldest_waiting_since: Option<String>,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Responder,
    Scorer,
    Auth,
    Dispatcher,
}
