// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Atrium routing engine.

use thiserror::Error;

/// The primary error type used across all Atrium components and adapter traits.
#[derive(Debug, Error)]
pub enum AtriumError {
    /// Webhook signature or shared secret did not match. The event is dropped.
    #[error("authenticity check failed for channel {channel_id}: {reason}")]
    Authenticity { channel_id: String, reason: String },

    /// The provider's external message id was already accepted for this channel.
    #[error("duplicate event {external_id} on channel {channel_id}")]
    DuplicateEvent {
        channel_id: String,
        external_id: String,
    },

    /// Contact resolution could not complete. The inbound entry is retried.
    #[error("contact resolution failed for {external_id}: {message}")]
    UnresolvedContact {
        external_id: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The bot responder timed out or failed. Treated as a handoff trigger.
    #[error("bot responder unavailable: {message}")]
    ResponderUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Another operator won the compare-and-set on this attendance item.
    #[error("attendance item {item_id} is no longer available")]
    AssignmentConflict { item_id: String },

    /// A status change that the state machine does not allow.
    #[error("invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// Entity does not exist within the caller's tenant.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An entity was addressed through a tenant that does not own it.
    #[error("{entity} {id} does not belong to tenant {tenant_id}")]
    TenantMismatch {
        entity: &'static str,
        id: String,
        tenant_id: String,
    },

    /// Provider payload could not be translated into a canonical message.
    #[error("failed to normalize {channel_type} payload: {message}")]
    Normalization {
        channel_type: String,
        message: String,
    },

    /// Channel is not accepting deliveries (suspended, error, inactive).
    #[error("channel {channel_id} is not accepting deliveries (status {status})")]
    ChannelUnavailable { channel_id: String, status: String },

    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Outbound dispatch or realtime transport errors.
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operator authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AtriumError {
    /// Shorthand for a tenant-scoped lookup miss.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AtriumError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether the failure is worth re-driving later (inbound retry queue).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AtriumError::UnresolvedContact { .. }
                | AtriumError::Storage { .. }
                | AtriumError::Timeout { .. }
                | AtriumError::Channel { .. }
        )
    }
}
