// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock bot responder with scripted replies.
//!
//! Replies are popped from a FIFO queue. When the queue is empty, a default
//! "mock reply" text is returned.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;

use atrium_core::traits::adapter::PluginAdapter;
use atrium_core::traits::responder::{BotRequest, BotResponder, ResponderEvent, ResponderStream};
use atrium_core::types::{AdapterType, HealthStatus};
use atrium_core::AtriumError;

/// One scripted responder behaviour.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    /// Reply text flagged as "did not understand".
    Fallback(String),
    /// Optional text followed by a handoff request.
    Handoff(String),
    /// `respond` itself fails.
    Fail(String),
    /// The stream never yields.
    Hang,
}

pub struct MockResponder {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<BotRequest>>>,
}

impl MockResponder {
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<Scripted>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(script))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn push(&self, step: Scripted) {
        self.script.lock().await.push_back(step);
    }

    /// Requests received so far.
    pub async fn requests(&self) -> Vec<BotRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_step(&self) -> Scripted {
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Scripted::Reply("mock reply".to_string()))
    }
}

impl Default for MockResponder {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits text into word deltas, keeping the separating spaces.
fn deltas(text: &str) -> Vec<Result<ResponderEvent, AtriumError>> {
    text.split_inclusive(' ')
        .map(|w| Ok(ResponderEvent::Delta(w.to_string())))
        .collect()
}

#[async_trait]
impl PluginAdapter for MockResponder {
    fn name(&self) -> &str {
        "mock-responder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Responder
    }

    async fn health_check(&self) -> Result<HealthStatus, AtriumError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), AtriumError> {
        Ok(())
    }
}

#[async_trait]
impl BotResponder for MockResponder {
    async fn respond(&self, request: BotRequest) -> Result<ResponderStream, AtriumError> {
        self.requests.lock().await.push(request);
        let events = match self.next_step().await {
            Scripted::Reply(text) => deltas(&text),
            Scripted::Fallback(text) => {
                let mut events = vec![Ok(ResponderEvent::Fallback)];
                events.extend(deltas(&text));
                events
            }
            Scripted::Handoff(text) => {
                let mut events = deltas(&text);
                events.push(Ok(ResponderEvent::Handoff {
                    reason: Some("scripted".to_string()),
                }));
                events
            }
            Scripted::Fail(message) => {
                return Err(AtriumError::ResponderUnavailable {
                    message,
                    source: None,
                });
            }
            Scripted::Hang => {
                return Ok(Box::pin(stream::pending::<Result<ResponderEvent, AtriumError>>()));
            }
        };
        Ok(Box::pin(stream::iter(events)))
    }
}
