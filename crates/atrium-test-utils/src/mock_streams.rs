// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory end-user streams.
//!
//! A session is "connected" once [`RecordingReplyStreams::connect`] is
//! called for it. Frames sent to it are recorded; a session can be
//! configured to disconnect after a number of frames.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use atrium_core::traits::stream::{ReplySink, ReplyStreams, StreamFrame};
use atrium_core::types::{ChannelId, TenantId};

type Key = (TenantId, ChannelId, String);

#[derive(Default)]
struct Session {
    frames: Vec<StreamFrame>,
    /// Frames accepted before the client goes away.
    capacity: Option<usize>,
}

#[derive(Clone, Default)]
pub struct RecordingReplyStreams {
    sessions: Arc<Mutex<HashMap<Key, Session>>>,
}

impl RecordingReplyStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, tenant_id: &TenantId, channel_id: &ChannelId, session: &str) {
        self.connect_with_capacity(tenant_id, channel_id, session, None);
    }

    /// Connects a client that disconnects after accepting `capacity` frames.
    pub fn connect_with_capacity(
        &self,
        tenant_id: &TenantId,
        channel_id: &ChannelId,
        session: &str,
        capacity: Option<usize>,
    ) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(
                (tenant_id.clone(), channel_id.clone(), session.to_string()),
                Session {
                    frames: Vec::new(),
                    capacity,
                },
            );
        }
    }

    /// Frames delivered to a session so far.
    pub fn frames(&self, tenant_id: &TenantId, channel_id: &ChannelId, session: &str) -> Vec<StreamFrame> {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| {
                s.get(&(tenant_id.clone(), channel_id.clone(), session.to_string()))
                    .map(|s| s.frames.clone())
            })
            .unwrap_or_default()
    }
}

struct RecordingSink {
    sessions: Arc<Mutex<HashMap<Key, Session>>>,
    key: Key,
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send(&mut self, frame: StreamFrame) -> bool {
        let Ok(mut sessions) = self.sessions.lock() else {
            return false;
        };
        let Some(session) = sessions.get_mut(&self.key) else {
            return false;
        };
        if session.capacity.is_some_and(|c| session.frames.len() >= c) {
            return false;
        }
        session.frames.push(frame);
        true
    }
}

impl ReplyStreams for RecordingReplyStreams {
    fn open(
        &self,
        tenant_id: &TenantId,
        channel_id: &ChannelId,
        session: &str,
    ) -> Option<Box<dyn ReplySink>> {
        let key = (tenant_id.clone(), channel_id.clone(), session.to_string());
        let connected = self.sessions.lock().ok()?.contains_key(&key);
        connected.then(|| {
            Box::new(RecordingSink {
                sessions: self.sessions.clone(),
                key,
            }) as Box<dyn ReplySink>
        })
    }
}
