// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messenger platform webhooks, shared by Instagram Direct and Facebook
//! Messenger. The two differ only in the `object` field.

use std::collections::HashMap;

use atrium_core::types::{CanonicalInbound, Channel, ChannelType, ContentType};
use atrium_core::{AtriumError, WebhookAdapter, WebhookRequest};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::normalize::{malformed, parse_json, unix_seconds};
use crate::signature::{HUB_SIGNATURE_HEADER, verify_hub_signature};

#[derive(Debug, Deserialize)]
struct Payload {
    object: String,
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    messaging: Vec<Messaging>,
}

#[derive(Debug, Deserialize)]
struct Messaging {
    sender: Party,
    recipient: Party,
    #[serde(default)]
    timestamp: serde_json::Value,
    message: Option<Msg>,
    postback: Option<Postback>,
}

#[derive(Debug, Deserialize)]
struct Party {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Msg {
    mid: String,
    text: Option<String>,
    #[serde(default)]
    is_echo: bool,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    #[serde(rename = "type")]
    kind: String,
    payload: Option<AttachmentPayload>,
}

#[derive(Debug, Deserialize)]
struct AttachmentPayload {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Postback {
    mid: Option<String>,
    title: String,
}

pub struct MessengerAdapter {
    channel_type: ChannelType,
    object: &'static str,
}

impl MessengerAdapter {
    pub fn instagram() -> Self {
        Self {
            channel_type: ChannelType::Instagram,
            object: "instagram",
        }
    }

    pub fn facebook() -> Self {
        Self {
            channel_type: ChannelType::Facebook,
            object: "page",
        }
    }

    fn record(&self, channel: &Channel, event: &Messaging) -> Option<CanonicalInbound> {
        let (external_id, content_type, content, media_url) = match (&event.message, &event.postback) {
            (Some(msg), _) if msg.is_echo => return None,
            (Some(msg), _) => match (&msg.text, msg.attachments.first()) {
                (Some(text), _) => (msg.mid.clone(), ContentType::Text, text.clone(), None),
                (None, Some(att)) => (
                    msg.mid.clone(),
                    ContentType::Media,
                    format!("[{}]", att.kind),
                    att.payload.as_ref().and_then(|p| p.url.clone()),
                ),
                (None, None) => return None,
            },
            (None, Some(postback)) => (
                postback.mid.clone()?,
                ContentType::Text,
                postback.title.clone(),
                None,
            ),
            (None, None) => return None,
        };
        Some(CanonicalInbound {
            tenant_id: channel.tenant_id.clone(),
            channel_id: channel.id.clone(),
            channel_type: self.channel_type,
            external_contact_id: event.sender.id.clone(),
            contact_name: None,
            contact_phone: None,
            contact_email: None,
            external_message_id: external_id,
            content,
            content_type,
            media_url,
            provider_timestamp: unix_seconds(&event.timestamp),
        })
    }
}

impl WebhookAdapter for MessengerAdapter {
    fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    fn verify(&self, channel: &Channel, request: &WebhookRequest) -> Result<(), AtriumError> {
        verify_hub_signature(
            &channel.webhook_secret,
            &request.body,
            request.header(HUB_SIGNATURE_HEADER),
        )
        .map_err(|reason| AtriumError::Authenticity {
            channel_id: channel.id.to_string(),
            reason: reason.to_string(),
        })
    }

    fn normalize(
        &self,
        channel: &Channel,
        request: &WebhookRequest,
    ) -> Result<Vec<CanonicalInbound>, AtriumError> {
        let payload: Payload = parse_json(self.channel_type, &request.body)?;
        if payload.object != self.object {
            return Err(malformed(
                self.channel_type,
                format!("unexpected object {:?}", payload.object),
            ));
        }
        let mut records = Vec::new();
        for event in payload.entry.iter().flat_map(|e| &e.messaging) {
            if let Some(page_id) = &channel.page_id {
                if &event.recipient.id != page_id {
                    warn!(channel_id = %channel.id, recipient = %event.recipient.id, "skipping event for another page");
                    continue;
                }
            }
            match self.record(channel, event) {
                Some(record) => records.push(record),
                None => debug!(channel_id = %channel.id, "ignoring non-message messenger event"),
            }
        }
        Ok(records)
    }

    fn handshake(&self, channel: &Channel, query: &HashMap<String, String>) -> Option<String> {
        super::meta_handshake(channel, query)
    }
}

#[cfg(test)]
mod tests {
    use atrium_core::types::TenantId;

    use super::*;
    use crate::signature::sign_hub;

    fn channel(channel_type: ChannelType) -> Channel {
        let mut channel = Channel::new(TenantId::from("t1"), channel_type, "page", "app-secret");
        channel.page_id = Some("PAGE".into());
        channel
    }

    fn request(body: serde_json::Value) -> WebhookRequest {
        let bytes = serde_json::to_vec(&body).unwrap();
        let sig = sign_hub("app-secret", &bytes);
        WebhookRequest::new(bytes).with_header(HUB_SIGNATURE_HEADER, sig)
    }

    fn events(object: &str) -> serde_json::Value {
        serde_json::json!({
            "object": object,
            "entry": [{"id": "PAGE", "time": 1700000000000i64, "messaging": [
                {"sender": {"id": "IGSID1"}, "recipient": {"id": "PAGE"}, "timestamp": 1700000000000i64,
                 "message": {"mid": "m_1", "text": "oi"}},
                {"sender": {"id": "PAGE"}, "recipient": {"id": "IGSID1"}, "timestamp": 1700000000001i64,
                 "message": {"mid": "m_2", "text": "echo", "is_echo": true}},
                {"sender": {"id": "IGSID1"}, "recipient": {"id": "PAGE"}, "timestamp": 1700000000002i64,
                 "message": {"mid": "m_3", "attachments": [{"type": "image", "payload": {"url": "https://cdn/x.jpg"}}]}},
                {"sender": {"id": "IGSID1"}, "recipient": {"id": "PAGE"}, "timestamp": 1700000000003i64,
                 "postback": {"mid": "m_4", "title": "Agendar", "payload": "BOOK"}},
                {"sender": {"id": "IGSID2"}, "recipient": {"id": "OTHER"}, "timestamp": 1700000000004i64,
                 "message": {"mid": "m_5", "text": "wrong page"}}
            ]}]
        })
    }

    #[test]
    fn instagram_events_are_normalized() {
        let adapter = MessengerAdapter::instagram();
        let ch = channel(ChannelType::Instagram);
        let req = request(events("instagram"));
        adapter.verify(&ch, &req).unwrap();
        let records = adapter.normalize(&ch, &req).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.external_message_id.as_str()).collect();
        assert_eq!(ids, vec!["m_1", "m_3", "m_4"]);
        assert_eq!(records[0].channel_type, ChannelType::Instagram);
        assert_eq!(records[1].media_url.as_deref(), Some("https://cdn/x.jpg"));
        assert_eq!(records[2].content, "Agendar");
        assert_eq!(records[0].provider_timestamp.as_deref(), Some("2023-11-14T22:13:20.000Z"));
    }

    #[test]
    fn object_must_match_channel_type() {
        let adapter = MessengerAdapter::facebook();
        let ch = channel(ChannelType::Facebook);
        assert!(adapter.normalize(&ch, &request(events("page"))).is_ok());
        let err = adapter.normalize(&ch, &request(events("instagram"))).unwrap_err();
        assert!(matches!(err, AtriumError::Normalization { .. }));
    }
}
