// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMS gateway webhooks.

use atrium_core::types::{CanonicalInbound, Channel, ChannelType, ContentType};
use atrium_core::{AtriumError, WebhookAdapter, WebhookRequest};
use serde::Deserialize;

use crate::normalize::{malformed, normalize_phone, parse_json, rfc3339};
use crate::signature::{SHARED_SECRET_HEADER, verify_shared_secret};

#[derive(Debug, Deserialize)]
struct Payload {
    message_sid: String,
    from: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    media_urls: Vec<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

pub struct SmsAdapter;

impl WebhookAdapter for SmsAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Sms
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
        let payload: Payload = parse_json(ChannelType::Sms, &request.body)?;
        let phone = normalize_phone(&payload.from)
            .ok_or_else(|| malformed(ChannelType::Sms, format!("invalid sender {:?}", payload.from)))?;
        let media_url = payload.media_urls.into_iter().next();
        let (content_type, content) = match (payload.body.trim(), &media_url) {
            ("", Some(_)) => (ContentType::Media, "[media]".to_string()),
            ("", None) => return Err(malformed(ChannelType::Sms, "empty message")),
            (text, _) => (ContentType::Text, text.to_string()),
        };
        Ok(vec![CanonicalInbound {
            tenant_id: channel.tenant_id.clone(),
            channel_id: channel.id.clone(),
            channel_type: ChannelType::Sms,
            external_contact_id: phone.clone(),
            contact_name: None,
            contact_phone: Some(phone),
            contact_email: None,
            external_message_id: payload.message_sid,
            content,
            content_type,
            media_url,
            provider_timestamp: payload.timestamp.as_deref().and_then(rfc3339),
        }])
    }
}

#[cfg(test)]
mod tests {
    use atrium_core::types::TenantId;

    use super::*;

    fn channel() -> Channel {
        Channel::new(TenantId::from("t1"), ChannelType::Sms, "sms", "sms-secret")
    }

    #[test]
    fn sender_is_normalized_to_digits() {
        let req = WebhookRequest::new(
            serde_json::to_vec(&serde_json::json!({
                "message_sid": "SM123", "from": "+55 (11) 98888-7777", "body": "oi"
            }))
            .unwrap(),
        )
        .with_header(SHARED_SECRET_HEADER, "sms-secret");
        SmsAdapter.verify(&channel(), &req).unwrap();
        let record = SmsAdapter.normalize(&channel(), &req).unwrap().remove(0);
        assert_eq!(record.external_contact_id, "5511988887777");
        assert_eq!(record.contact_phone.as_deref(), Some("5511988887777"));
        assert_eq!(record.external_message_id, "SM123");
    }

    #[test]
    fn media_only_and_empty_messages() {
        let media = WebhookRequest::new(
            r#"{"message_sid":"SM1","from":"+5511988887777","media_urls":["https://m/1"]}"#,
        );
        let record = SmsAdapter.normalize(&channel(), &media).unwrap().remove(0);
        assert_eq!(record.content_type, ContentType::Media);

        let empty = WebhookRequest::new(r#"{"message_sid":"SM2","from":"+5511988887777"}"#);
        assert!(SmsAdapter.normalize(&channel(), &empty).is_err());
    }
}
