// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook adapter trait: one implementation per channel type.

use std::collections::HashMap;

use crate::error::AtriumError;
use crate::types::{CanonicalInbound, Channel, ChannelType};

/// A raw provider delivery plus its transport metadata.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl WebhookRequest {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Translates one provider's payloads into canonical inbound records.
///
/// Adapters are pure and synchronous: no I/O, no persistence. Idempotency
/// and persistence are handled by the ingestion gateway.
pub trait WebhookAdapter: Send + Sync + 'static {
    fn channel_type(&self) -> ChannelType;

    /// Verifies authenticity against the channel's stored secret.
    fn verify(&self, channel: &Channel, request: &WebhookRequest) -> Result<(), AtriumError>;

    /// Extracts every message carried by the payload. Status callbacks and
    /// other non-message events yield an empty vector.
    fn normalize(
        &self,
        channel: &Channel,
        request: &WebhookRequest,
    ) -> Result<Vec<CanonicalInbound>, AtriumError>;

    /// Answers a subscription handshake (`GET` with query parameters).
    /// Returns the body to echo back, or `None` if rejected or unsupported.
    fn handshake(&self, _channel: &Channel, _query: &HashMap<String, String>) -> Option<String> {
        None
    }
}
