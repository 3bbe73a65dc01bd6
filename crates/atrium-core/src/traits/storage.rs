// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait: the conversation and message store.
//!
//! The store is the single source of truth for channels, contacts,
//! conversations, messages and attendance items. Every status transition is
//! committed in the same transaction as the message (or queue mutation) that
//! caused it, so callers never observe one without the other.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AtriumError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AttendanceItem, AttendanceStatus, CanonicalInbound, Channel, ChannelId, ChannelStatus,
    ChannelType, CloseReason, Contact, ContactId, ContactIdentity, ContentType, Conversation,
    ConversationId, ConversationStatus, DeliveryStatus, HandoffReason, ItemId, Message,
    MessageId, OperatorId, QueueSnapshot, SenderKind, TenantId,
};

/// Input to the contact create-or-get operation.
#[derive(Debug, Clone)]
pub struct ResolveContact {
    pub tenant_id: TenantId,
    pub channel_type: ChannelType,
    pub external_id: String,
    pub display_name: Option<String>,
    /// Normalized (digits only) phone number, if known.
    pub phone: Option<String>,
    /// Normalized (lowercase) email, if known.
    pub email: Option<String>,
    pub now: String,
}

/// How a contact was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMatch {
    /// Exact hit on the channel-specific external id.
    Identity,
    /// Matched an existing contact by phone or email; a new alias was added.
    Merged,
    /// No match, a new contact was created.
    Created,
}

#[derive(Debug, Clone)]
pub struct ResolvedContact {
    pub contact: Contact,
    pub matched: ContactMatch,
}

/// Result of persisting a verified webhook event into the inbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted(i64),
    /// The `(channel_id, external_message_id)` pair was already accepted.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A claimed inbound queue entry.
#[derive(Debug, Clone)]
pub struct InboundEntry {
    pub id: i64,
    pub record: CanonicalInbound,
    /// Attempts including the current claim.
    pub attempts: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
}

/// A handoff decided before the transaction that applies it.
#[derive(Debug, Clone)]
pub struct HandoffPlan {
    pub reason: HandoffReason,
    pub priority: i64,
    pub sla_deadline: String,
}

/// Append of a canonical inbound message, with an optional handoff that is
/// applied atomically if the conversation is still under bot handling.
#[derive(Debug, Clone)]
pub struct InboundAppend {
    pub record: CanonicalInbound,
    pub contact_id: ContactId,
    pub handoff: Option<HandoffPlan>,
    pub now: String,
}

#[derive(Debug, Clone)]
pub struct InboundRecord {
    pub conversation: Conversation,
    pub message: Message,
    /// The conversation row was created by this append.
    pub created: bool,
    /// A closed conversation was re-opened by this append.
    pub reopened: bool,
    /// Attendance item enqueued by the handoff, if one was applied.
    pub handoff_item: Option<AttendanceItem>,
}

#[derive(Debug, Clone)]
pub enum InboundOutcome {
    /// A message with this external id already exists on the channel.
    Duplicate,
    Recorded(Box<InboundRecord>),
}

/// Append of an outbound (bot, agent or system) message.
#[derive(Debug, Clone)]
pub struct OutboundAppend {
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub sender_kind: SenderKind,
    pub sender_id: Option<String>,
    pub content_type: ContentType,
    pub content: String,
    pub media_url: Option<String>,
    /// Bot reply flagged as "did not understand".
    pub fallback: bool,
    /// Handoff to apply with this message (bot failure threshold).
    pub handoff: Option<HandoffPlan>,
    pub now: String,
}

#[derive(Debug, Clone)]
pub struct OutboundRecord {
    pub conversation: Conversation,
    pub message: Message,
    /// Attendance item created or moved by this append.
    pub item: Option<AttendanceItem>,
}

/// Explicit move of a conversation to the human queue.
#[derive(Debug, Clone)]
pub struct HandoffRequest {
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub plan: HandoffPlan,
    pub now: String,
}

#[derive(Debug, Clone)]
pub struct HandoffRecord {
    pub conversation: Conversation,
    pub item: AttendanceItem,
    /// System-event message recording the handoff.
    pub message: Message,
}

#[derive(Debug, Clone)]
pub enum AssignOutcome {
    Assigned {
        item: AttendanceItem,
        conversation: Conversation,
    },
    /// The compare-and-set lost: the item was no longer `waiting`.
    Conflict,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    /// Operator expected to currently hold the item. `None` skips the check.
    pub from: Option<OperatorId>,
    /// Target operator, or `None` to return the item to `waiting`.
    pub to: Option<OperatorId>,
    pub now: String,
}

#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub item: AttendanceItem,
    pub conversation: Conversation,
    pub previous_agent: Option<OperatorId>,
}

#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub reason: CloseReason,
    /// Idle guard: close only if still `in_attendance` and idle since at
    /// or before this instant.
    pub idle_before: Option<String>,
    pub now: String,
}

#[derive(Debug, Clone)]
pub struct CloseRecord {
    pub conversation: Conversation,
    pub item: Option<AttendanceItem>,
    pub message: Message,
}

/// One entry of the conversation transition journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTransition {
    pub conversation_id: ConversationId,
    pub from_status: Option<ConversationStatus>,
    pub to_status: ConversationStatus,
    pub reason: String,
    pub message_id: Option<MessageId>,
    pub at: String,
}

/// Adapter for the persistent conversation and message store.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), AtriumError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), AtriumError>;

    // --- Channel registry ---

    async fn create_channel(&self, channel: &Channel) -> Result<(), AtriumError>;

    /// Looks up a channel by id alone. Used by webhook routing, where the
    /// channel id is the tenant routing hint.
    async fn find_channel(&self, channel_id: &ChannelId) -> Result<Option<Channel>, AtriumError>;

    async fn get_channel(
        &self,
        tenant_id: &TenantId,
        channel_id: &ChannelId,
    ) -> Result<Channel, AtriumError>;

    async fn list_channels(&self, tenant_id: &TenantId) -> Result<Vec<Channel>, AtriumError>;

    /// Applies a validated lifecycle transition.
    async fn set_channel_status(
        &self,
        tenant_id: &TenantId,
        channel_id: &ChannelId,
        status: ChannelStatus,
    ) -> Result<Channel, AtriumError>;

    /// Increments the consecutive-failure counter; flips an active channel to
    /// `error` once `threshold` is reached. Returns the resulting status.
    async fn record_delivery_failure(
        &self,
        channel_id: &ChannelId,
        threshold: i64,
    ) -> Result<ChannelStatus, AtriumError>;

    /// Resets the failure counter and promotes `configuring` to `active`.
    async fn record_delivery_success(&self, channel_id: &ChannelId) -> Result<(), AtriumError>;

    // --- Contacts ---

    /// Create-or-get under the `(tenant, channel type, external id)` unique
    /// constraint.
    async fn resolve_contact(&self, req: ResolveContact) -> Result<ResolvedContact, AtriumError>;

    async fn get_contact(
        &self,
        tenant_id: &TenantId,
        contact_id: &ContactId,
    ) -> Result<Contact, AtriumError>;

    async fn list_contacts(
        &self,
        tenant_id: &TenantId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Contact>, AtriumError>;

    async fn contact_identities(
        &self,
        tenant_id: &TenantId,
        contact_id: &ContactId,
    ) -> Result<Vec<ContactIdentity>, AtriumError>;

    /// Stores a lead score; a `lead` at or above `qualify_threshold` becomes
    /// `qualified`.
    async fn update_lead_score(
        &self,
        tenant_id: &TenantId,
        contact_id: &ContactId,
        score: f64,
        qualify_threshold: Option<f64>,
    ) -> Result<Contact, AtriumError>;

    // --- Durable inbound queue ---

    async fn accept_inbound(
        &self,
        record: &CanonicalInbound,
        max_attempts: i64,
        now: &str,
    ) -> Result<AcceptOutcome, AtriumError>;

    /// Claims up to `limit` due entries (pending, or processing with an
    /// expired lock), locking them until `lock_until`.
    async fn claim_inbound(
        &self,
        now: &str,
        lock_until: &str,
        limit: i64,
    ) -> Result<Vec<InboundEntry>, AtriumError>;

    async fn complete_inbound(&self, id: i64, now: &str) -> Result<(), AtriumError>;

    /// Records a failed attempt. The entry becomes due again at `retry_at`,
    /// or `failed` once its attempts are exhausted.
    async fn fail_inbound(
        &self,
        id: i64,
        error: &str,
        retry_at: &str,
        now: &str,
    ) -> Result<InboundStatus, AtriumError>;

    async fn inbound_status(&self, id: i64) -> Result<Option<InboundStatus>, AtriumError>;

    /// Entry counts per inbound queue status.
    async fn inbound_depth(&self) -> Result<Vec<(InboundStatus, i64)>, AtriumError>;

    // --- Conversations and messages ---

    async fn record_inbound(&self, append: InboundAppend) -> Result<InboundOutcome, AtriumError>;

    async fn append_outbound(&self, append: OutboundAppend) -> Result<OutboundRecord, AtriumError>;

    async fn update_delivery_status(
        &self,
        tenant_id: &TenantId,
        message_id: &MessageId,
        status: DeliveryStatus,
        external_id: Option<String>,
    ) -> Result<(), AtriumError>;

    async fn handoff(&self, req: HandoffRequest) -> Result<HandoffRecord, AtriumError>;

    /// Closes a conversation and settles its active attendance item.
    /// Returns `None` when the idle guard no longer holds.
    async fn close_conversation(&self, req: CloseRequest)
    -> Result<Option<CloseRecord>, AtriumError>;

    async fn get_conversation(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Conversation, AtriumError>;

    async fn list_conversations(
        &self,
        tenant_id: &TenantId,
        status: Option<ConversationStatus>,
        limit: i64,
    ) -> Result<Vec<Conversation>, AtriumError>;

    /// All `in_attendance` conversations across tenants, for the idle sweep.
    async fn in_attendance_conversations(&self) -> Result<Vec<Conversation>, AtriumError>;

    /// Messages ordered by sequence, starting after `after_seq`.
    async fn list_messages(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        after_seq: i64,
        limit: i64,
    ) -> Result<Vec<Message>, AtriumError>;

    async fn list_transitions(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ConversationTransition>, AtriumError>;

    // --- Attendance items ---

    /// Atomic compare-and-set from `waiting` to `assigned`.
    async fn try_assign(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
        operator_id: &OperatorId,
        now: &str,
    ) -> Result<AssignOutcome, AtriumError>;

    async fn transfer(&self, req: TransferRequest) -> Result<TransferRecord, AtriumError>;

    /// Waiting items ordered by priority descending then enqueue time,
    /// filtered to the given channel types.
    async fn next_waiting(
        &self,
        tenant_id: &TenantId,
        skills: &[ChannelType],
        limit: i64,
    ) -> Result<Vec<AttendanceItem>, AtriumError>;

    async fn get_item(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
    ) -> Result<AttendanceItem, AtriumError>;

    async fn active_item(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<AttendanceItem>, AtriumError>;

    async fn list_items(
        &self,
        tenant_id: &TenantId,
        status: Option<AttendanceStatus>,
    ) -> Result<Vec<AttendanceItem>, AtriumError>;

    /// Flags waiting items whose SLA deadline is at or before `now`.
    /// Returns only the newly breached items.
    async fn breach_overdue(&self, now: &str) -> Result<Vec<AttendanceItem>, AtriumError>;

    async fn queue_snapshot(&self, tenant_id: &TenantId) -> Result<QueueSnapshot, AtriumError>;
}
