// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-user reply streams over Server-Sent Events.
//!
//! A web client opens `GET /v1/chat/{channel_id}?session=<id>&token=<hex>`,
//! where the session is the id the widget also posts messages with and the
//! token is [`session_token`](atrium_ingest::signature::session_token) of
//! that id under the channel's webhook secret. Only web chat channels
//! stream. Bot replies for that session arrive as:
//!
//! ```text
//! event: chat_chunk
//! data: {"type":"chat_chunk","conversation_id":"...","text":"Abri"}
//!
//! event: chat_complete
//! data: {"type":"chat_complete","conversation_id":"...","text":"Abrimos às 8h.","sources":[],"handoff":false}
//! ```
//!
//! Each session has a bounded buffer. The producer waits for space up to
//! the configured send timeout; past that, or once the client is gone, the
//! session is dropped and no further chunks are delivered.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use dashmap::DashMap;
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, warn};

use atrium_config::model::RealtimeConfig;
use atrium_core::AtriumError;
use atrium_core::traits::stream::{ReplySink, ReplyStreams, StreamFrame};
use atrium_core::types::{ChannelId, ChannelType, TenantId};
use atrium_ingest::signature::verify_session_token;

use crate::error::ApiError;
use crate::server::GatewayState;

type SessionKey = (TenantId, ChannelId, String);
type Sessions = Arc<DashMap<SessionKey, mpsc::Sender<StreamFrame>>>;

/// Registry of connected end-user sessions.
pub struct SessionStreams {
    sessions: Sessions,
    buffer: usize,
    send_timeout: Duration,
}

impl SessionStreams {
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            buffer: config.stream_buffer.max(1),
            send_timeout: Duration::from_millis(config.stream_send_timeout_ms),
        }
    }

    /// Registers a client for a session. A newer connection for the same
    /// session replaces the older one.
    pub fn connect(
        &self,
        tenant_id: &TenantId,
        channel_id: &ChannelId,
        session: &str,
    ) -> mpsc::Receiver<StreamFrame> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let key = (tenant_id.clone(), channel_id.clone(), session.to_string());
        if self.sessions.insert(key, tx).is_some() {
            debug!(channel_id = %channel_id, "replaced earlier stream for session");
        }
        rx
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl ReplyStreams for SessionStreams {
    fn open(
        &self,
        tenant_id: &TenantId,
        channel_id: &ChannelId,
        session: &str,
    ) -> Option<Box<dyn ReplySink>> {
        let key = (tenant_id.clone(), channel_id.clone(), session.to_string());
        let tx = self.sessions.get(&key).map(|entry| entry.value().clone())?;
        if tx.is_closed() {
            self.sessions.remove_if(&key, |_, current| current.same_channel(&tx));
            return None;
        }
        Some(Box::new(SessionSink {
            key,
            tx: Some(tx),
            sessions: self.sessions.clone(),
            send_timeout: self.send_timeout,
        }))
    }
}

struct SessionSink {
    key: SessionKey,
    tx: Option<mpsc::Sender<StreamFrame>>,
    sessions: Sessions,
    send_timeout: Duration,
}

impl SessionSink {
    fn disconnect(&mut self, reason: &'static str) {
        if let Some(tx) = self.tx.take() {
            self.sessions
                .remove_if(&self.key, |_, current| current.same_channel(&tx));
            debug!(channel_id = %self.key.1, reason, "end-user stream disconnected");
            metrics::counter!("atrium_stream_disconnects_total", "reason" => reason).increment(1);
        }
    }
}

#[async_trait]
impl ReplySink for SessionSink {
    async fn send(&mut self, frame: StreamFrame) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        match tx.send_timeout(frame, self.send_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(channel_id = %self.key.1, "end-user stream too slow, dropping session");
                self.disconnect("slow");
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                self.disconnect("closed");
                false
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub session: String,
    #[serde(default)]
    pub token: Option<String>,
}

fn to_event(frame: &StreamFrame) -> Event {
    Event::default()
        .event(frame.event_name())
        .json_data(frame)
        .unwrap_or_else(|_| Event::default().event("error").data("{}"))
}

/// GET /v1/chat/{channel_id}?session=&token=
///
/// The stream ends after `stream_timeout_secs` without frames; heartbeat
/// comments keep idle connections open in between.
pub async fn chat_stream(
    State(state): State<GatewayState>,
    Path(channel_id): Path<String>,
    Query(query): Query<ChatQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = query.session.trim();
    if session.is_empty() {
        return Err(AtriumError::Unauthorized("missing session".into()).into());
    }
    let channel = state
        .storage
        .find_channel(&ChannelId::from(channel_id.as_str()))
        .await?
        .ok_or_else(|| AtriumError::not_found("channel", channel_id.as_str()))?;
    if channel.channel_type != ChannelType::Webchat {
        return Err(AtriumError::not_found("channel", channel_id.as_str()).into());
    }
    if let Err(reason) = verify_session_token(&channel.webhook_secret, session, query.token.as_deref()) {
        debug!(channel_id = %channel.id, reason, "rejected end-user stream");
        return Err(AtriumError::Unauthorized(reason.into()).into());
    }

    let rx = state.streams.connect(&channel.tenant_id, &channel.id, session);
    let realtime = &state.config.realtime;
    let idle = Duration::from_secs(realtime.stream_timeout_secs);
    let events = stream::unfold(rx, move |mut rx| async move {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(frame)) => Some((Ok(to_event(&frame)), rx)),
            _ => None,
        }
    });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(realtime.heartbeat_secs))
            .text("heartbeat"),
    ))
}
