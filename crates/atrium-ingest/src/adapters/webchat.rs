// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embeddable web widget. The widget backend posts one message per call,
//! keyed by the browser session id.

use atrium_core::types::{CanonicalInbound, Channel, ChannelType, ContentType};
use atrium_core::{AtriumError, WebhookAdapter, WebhookRequest};
use serde::Deserialize;

use crate::normalize::{malformed, normalize_email, normalize_phone, parse_json, rfc3339};
use crate::signature::{SHARED_SECRET_HEADER, verify_shared_secret};

#[derive(Debug, Deserialize)]
struct Payload {
    session_id: String,
    message_id: String,
    text: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    sent_at: Option<String>,
}

pub struct WebchatAdapter;

impl WebhookAdapter for WebchatAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Webchat
    }

    fn verify(&self, channel: &Channel, request: &WebhookRequest) -> Result<(), AtriumError> {
        verify_shared_secret(&channel.webhook_secret, request.header(SHARED_SECRET_HEADER)).map_err(
            |reason| AtriumError::Authenticity {
                channel_id: channel.id.to_string(),
                reason: reason.to_string(),
            },
        )
    }

    fn normalize(
        &self,
        channel: &Channel,
        request: &WebhookRequest,
    ) -> Result<Vec<CanonicalInbound>, AtriumError> {
        let payload: Payload = parse_json(ChannelType::Webchat, &request.body)?;
        if payload.session_id.trim().is_empty() || payload.message_id.trim().is_empty() {
            return Err(malformed(ChannelType::Webchat, "missing session or message id"));
        }
        let text = payload.text.trim();
        if text.is_empty() {
            return Err(malformed(ChannelType::Webchat, "empty message"));
        }
        Ok(vec![CanonicalInbound {
            tenant_id: channel.tenant_id.clone(),
            channel_id: channel.id.clone(),
            channel_type: ChannelType::Webchat,
            external_contact_id: payload.session_id,
            contact_name: payload.name.filter(|n| !n.trim().is_empty()),
            contact_phone: payload.phone.as_deref().and_then(normalize_phone),
            contact_email: payload.email.as_deref().and_then(normalize_email),
            external_message_id: payload.message_id,
            content: text.to_string(),
            content_type: ContentType::Text,
            media_url: None,
            provider_timestamp: payload.sent_at.as_deref().and_then(rfc3339),
        }])
    }
}
