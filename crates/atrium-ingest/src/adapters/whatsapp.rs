// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Business Cloud API webhooks.

use std::collections::HashMap;

use atrium_core::types::{CanonicalInbound, Channel, ChannelType, ContentType};
use atrium_core::{AtriumError, WebhookAdapter, WebhookRequest};
use serde::Deserialize;
use tracing::warn;

use crate::normalize::{malformed, normalize_phone, parse_json, unix_seconds};
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
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    field: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct Value {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    messages: Vec<WaMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    phone_number_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    wa_id: String,
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WaMessage {
    id: String,
    from: String,
    #[serde(default)]
    timestamp: serde_json::Value,
    #[serde(rename = "type")]
    kind: String,
    text: Option<Text>,
    image: Option<Media>,
    audio: Option<Media>,
    video: Option<Media>,
    document: Option<Media>,
    sticker: Option<Media>,
    location: Option<Location>,
    interactive: Option<Interactive>,
    button: Option<Button>,
}

#[derive(Debug, Deserialize)]
struct Text {
    body: String,
}

#[derive(Debug, Deserialize)]
struct Media {
    id: String,
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    latitude: f64,
    longitude: f64,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Interactive {
    button_reply: Option<Reply>,
    list_reply: Option<Reply>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    title: String,
}

#[derive(Debug, Deserialize)]
struct Button {
    text: String,
}

/// Verifies `X-Hub-Signature-256` with the channel's app secret and reads
/// `messages` changes. Delivery status callbacks produce no records.
pub struct WhatsAppAdapter;

impl WhatsAppAdapter {
    fn content(message: &WaMessage) -> (ContentType, String, Option<String>) {
        let media = [
            &message.image,
            &message.audio,
            &message.video,
            &message.document,
            &message.sticker,
        ]
        .into_iter()
        .flatten()
        .next();

        if let Some(text) = &message.text {
            return (ContentType::Text, text.body.clone(), None);
        }
        if let Some(media) = media {
            let caption = media
                .caption
                .clone()
                .unwrap_or_else(|| format!("[{}]", message.kind));
            return (ContentType::Media, caption, Some(format!("whatsapp-media:{}", media.id)));
        }
        if let Some(interactive) = &message.interactive {
            if let Some(reply) = interactive.button_reply.as_ref().or(interactive.list_reply.as_ref()) {
                return (ContentType::Text, reply.title.clone(), None);
            }
        }
        if let Some(button) = &message.button {
            return (ContentType::Text, button.text.clone(), None);
        }
        if let Some(location) = &message.location {
            let label = location.name.as_deref().unwrap_or("location");
            return (
                ContentType::Text,
                format!("{label} ({}, {})", location.latitude, location.longitude),
                None,
            );
        }
        (ContentType::SystemEvent, format!("unsupported:{}", message.kind), None)
    }
}

impl WebhookAdapter for WhatsAppAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Whatsapp
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
        let payload: Payload = parse_json(ChannelType::Whatsapp, &request.body)?;
        if payload.object != "whatsapp_business_account" {
            return Err(malformed(
                ChannelType::Whatsapp,
                format!("unexpected object {:?}", payload.object),
            ));
        }

        let mut records = Vec::new();
        for change in payload.entry.into_iter().flat_map(|e| e.changes) {
            if change.field != "messages" {
                continue;
            }
            let value = change.value;
            if let (Some(expected), Some(actual)) =
                (&channel.phone_number_id, &value.metadata.phone_number_id)
            {
                if expected != actual {
                    warn!(channel_id = %channel.id, phone_number_id = %actual, "skipping change for another phone number");
                    continue;
                }
            }
            let names: HashMap<&str, &str> = value
                .contacts
                .iter()
                .filter_map(|c| Some((c.wa_id.as_str(), c.profile.as_ref()?.name.as_deref()?)))
                .collect();

            for message in &value.messages {
                let (content_type, content, media_url) = Self::content(message);
                records.push(CanonicalInbound {
                    tenant_id: channel.tenant_id.clone(),
                    channel_id: channel.id.clone(),
                    channel_type: ChannelType::Whatsapp,
                    external_contact_id: message.from.clone(),
                    contact_name: names.get(message.from.as_str()).map(|n| n.to_string()),
                    contact_phone: normalize_phone(&message.from),
                    contact_email: None,
                    external_message_id: message.id.clone(),
                    content,
                    content_type,
                    media_url,
                    provider_timestamp: unix_seconds(&message.timestamp),
                });
            }
        }
        Ok(records)
    }

    fn handshake(&self, channel: &Channel, query: &HashMap<String, String>) -> Option<String> {
        super::meta_handshake(channel, query)
    }
}
