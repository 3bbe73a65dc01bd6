// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-user reply streaming seam between the orchestrator and the realtime
//! gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, ConversationId, TenantId};

/// A frame on the end-user stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// Incremental reply text.
    ChatChunk {
        conversation_id: ConversationId,
        text: String,
    },
    /// Final text and any source metadata gathered during generation.
    ChatComplete {
        conversation_id: ConversationId,
        text: String,
        sources: Vec<serde_json::Value>,
        handoff: bool,
    },
    /// Human-readable failure.
    Error {
        conversation_id: ConversationId,
        message: String,
    },
}

impl StreamFrame {
    /// SSE event name for this frame.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamFrame::ChatChunk { .. } => "chat_chunk",
            StreamFrame::ChatComplete { .. } => "chat_complete",
            StreamFrame::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamFrame::ChatChunk { .. })
    }
}

/// Producer half of one end-user stream.
#[async_trait]
pub trait ReplySink: Send {
    /// Delivers a frame. Returns `false` once the client is gone; callers
    /// must not send further chunks after that.
    async fn send(&mut self, frame: StreamFrame) -> bool;
}

/// Looks up the live stream for an end-user session.
pub trait ReplyStreams: Send + Sync + 'static {
    /// Returns a sink for `(channel, session)` if a client is connected.
    /// `session` is the contact's external id on the channel.
    fn open(
        &self,
        tenant_id: &TenantId,
        channel_id: &ChannelId,
        session: &str,
    ) -> Option<Box<dyn ReplySink>>;
}

/// A stream registry with no connected clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReplyStreams;

impl ReplyStreams for NoReplyStreams {
    fn open(&self, _: &TenantId, _: &ChannelId, _: &str) -> Option<Box<dyn ReplySink>> {
        None
    }
}
