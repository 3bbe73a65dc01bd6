// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound email relayed as JSON by an inbound-parse service.

use atrium_core::types::{CanonicalInbound, Channel, ChannelType, ContentType};
use atrium_core::{AtriumError, WebhookAdapter, WebhookRequest};
use serde::Deserialize;

use crate::normalize::{mailbox_address, malformed, normalize_email, parse_json, rfc3339};
use crate::signature::{SHARED_SECRET_HEADER, verify_shared_secret};

#[derive(Debug, Deserialize)]
struct Payload {
    message_id: String,
    from: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    url: String,
}

pub struct EmailAdapter;

impl WebhookAdapter for EmailAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
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
        let payload: Payload = parse_json(ChannelType::Email, &request.body)?;
        let (name, address) = mailbox_address(&payload.from);
        let email = normalize_email(address)
            .ok_or_else(|| malformed(ChannelType::Email, format!("invalid sender {:?}", payload.from)))?;

        let body = payload
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or(payload.subject.as_deref().map(str::trim).filter(|s| !s.is_empty()));
        let attachment = payload.attachments.first().map(|a| a.url.clone());
        let (content_type, content) = match (body, &attachment) {
            (Some(text), _) => (ContentType::Text, text.to_string()),
            (None, Some(_)) => (ContentType::Media, "[attachment]".to_string()),
            (None, None) => return Err(malformed(ChannelType::Email, "empty message")),
        };

        Ok(vec![CanonicalInbound {
            tenant_id: channel.tenant_id.clone(),
            channel_id: channel.id.clone(),
            channel_type: ChannelType::Email,
            external_contact_id: email.clone(),
            contact_name: name,
            contact_phone: None,
            contact_email: Some(email),
            external_message_id: payload.message_id,
            content,
            content_type,
            media_url: attachment,
            provider_timestamp: payload.date.as_deref().and_then(rfc3339),
        }])
    }
}

#[cfg(test)]
mod tests {
    use atrium_core::types::TenantId;

    use super::*;

    fn channel() -> Channel {
        Channel::new(TenantId::from("t1"), ChannelType::Email, "inbox", "mail-secret")
    }

    fn request(body: serde_json::Value) -> WebhookRequest {
        WebhookRequest::new(serde_json::to_vec(&body).unwrap())
            .with_header(SHARED_SECRET_HEADER, "mail-secret")
    }

    #[test]
    fn normalizes_sender_and_body() {
        let req = request(serde_json::json!({
            "message_id": "<abc@mail.example>",
            "from": "Ana Souza <Ana@Example.com>",
            "subject": "Consulta",
            "text": "  Gostaria de marcar  ",
            "date": "2026-02-01T12:00:00Z"
        }));
        EmailAdapter.verify(&channel(), &req).unwrap();
        let record = EmailAdapter.normalize(&channel(), &req).unwrap().remove(0);
        assert_eq!(record.external_contact_id, "ana@example.com");
        assert_eq!(record.contact_email.as_deref(), Some("ana@example.com"));
        assert_eq!(record.contact_name.as_deref(), Some("Ana Souza"));
        assert_eq!(record.content, "Gostaria de marcar");
        assert_eq!(record.provider_timestamp.as_deref(), Some("2026-02-01T12:00:00.000Z"));
    }

    #[test]
    fn subject_is_used_when_body_is_empty() {
        let req = request(serde_json::json!({
            "message_id": "1", "from": "a@b.io", "subject": "Oi", "text": ""
        }));
        assert_eq!(EmailAdapter.normalize(&channel(), &req).unwrap()[0].content, "Oi");
    }

    #[test]
    fn rejects_bad_sender_and_wrong_secret() {
        let req = request(serde_json::json!({"message_id": "1", "from": "nobody", "text": "x"}));
        assert!(matches!(
            EmailAdapter.normalize(&channel(), &req),
            Err(AtriumError::Normalization { .. })
        ));
        let forged = WebhookRequest::new("{}").with_header(SHARED_SECRET_HEADER, "guess");
        assert!(matches!(
            EmailAdapter.verify(&channel(), &forged),
            Err(AtriumError::Authenticity { .. })
        ));
    }
}
