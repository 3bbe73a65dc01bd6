// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel webhook adapters.
//!
//! Each adapter owns one provider's payload shape and authenticity scheme
//! and produces [`CanonicalInbound`](atrium_core::types::CanonicalInbound)
//! records. New channels are added by implementing
//! [`WebhookAdapter`] and registering it here.

pub mod email;
pub mod messenger;
pub mod sms;
pub mod webchat;
pub mod whatsapp;

use std::collections::HashMap;
use std::sync::Arc;

use atrium_core::WebhookAdapter;
use atrium_core::types::{Channel, ChannelType};

pub use email::EmailAdapter;
pub use messenger::MessengerAdapter;
pub use sms::SmsAdapter;
pub use webchat::WebchatAdapter;
pub use whatsapp::WhatsAppAdapter;

/// Adapters keyed by the channel type they serve.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ChannelType, Arc<dyn WebhookAdapter>>,
}

impl AdapterRegistry {
    /// Registry with one adapter for every supported channel type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(WhatsAppAdapter));
        registry.register(Arc::new(MessengerAdapter::instagram()));
        registry.register(Arc::new(MessengerAdapter::facebook()));
        registry.register(Arc::new(EmailAdapter));
        registry.register(Arc::new(SmsAdapter));
        registry.register(Arc::new(WebchatAdapter));
        registry
    }

    /// Registers an adapter, replacing any previous one for its type.
    pub fn register(&mut self, adapter: Arc<dyn WebhookAdapter>) {
        self.adapters.insert(adapter.channel_type(), adapter);
    }

    pub fn get(&self, channel_type: ChannelType) -> Option<Arc<dyn WebhookAdapter>> {
        self.adapters.get(&channel_type).cloned()
    }
}

/// Meta subscription handshake shared by WhatsApp, Instagram and Facebook:
/// echo `hub.challenge` when `hub.verify_token` matches the channel's token.
pub(crate) fn meta_handshake(channel: &Channel, query: &HashMap<String, String>) -> Option<String> {
    let expected = channel.verify_token.as_deref()?;
    if query.get("hub.mode").map(String::as_str) != Some("subscribe") {
        return None;
    }
    let provided = query.get("hub.verify_token")?;
    crate::signature::verify_shared_secret(expected, Some(provided)).ok()?;
    query.get("hub.challenge").cloned()
}
