// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot responder trait: the black-box reply generation capability.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::error::AtriumError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelType, ContactId, ConversationId, Message, TenantId};

/// Input to one reply generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotRequest {
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub contact_id: ContactId,
    pub channel_type: ChannelType,
    pub text: String,
    /// Recent messages, oldest first.
    pub history: Vec<Message>,
}

/// One event of a streamed reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponderEvent {
    /// Incremental text.
    Delta(String),
    /// Tool or source metadata gathered during generation.
    Source(serde_json::Value),
    /// The reply is a "did not understand" fallback.
    Fallback,
    /// The responder asks for a human to take over.
    Handoff { reason: Option<String> },
}

pub type ResponderStream =
    Pin<Box<dyn Stream<Item = Result<ResponderEvent, AtriumError>> + Send>>;

#[async_trait]
pub trait BotResponder: PluginAdapter {
    /// Starts generation and returns the event stream.
    async fn respond(&self, request: BotRequest) -> Result<ResponderStream, AtriumError>;
}
