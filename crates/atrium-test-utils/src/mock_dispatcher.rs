// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock outbound dispatcher that captures every send.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use atrium_core::traits::adapter::PluginAdapter;
use atrium_core::traits::dispatch::OutboundDispatcher;
use atrium_core::types::{AdapterType, Channel, ChannelId, HealthStatus, Message};
use atrium_core::AtriumError;

/// One captured send.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub channel_id: ChannelId,
    pub recipient: String,
    pub message: Message,
}

#[derive(Default)]
pub struct MockDispatcher {
    sent: Mutex<Vec<Dispatched>>,
    failing: AtomicBool,
    counter: AtomicUsize,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following dispatch fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Dispatched> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PluginAdapter for MockDispatcher {
    fn name(&self) -> &str {
        "mock-dispatcher"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Dispatcher
    }

    async fn health_check(&self) -> Result<HealthStatus, AtriumError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), AtriumError> {
        Ok(())
    }
}

#[async_trait]
impl OutboundDispatcher for MockDispatcher {
    async fn dispatch(
        &self,
        channel: &Channel,
        recipient: &str,
        message: &Message,
    ) -> Result<Option<String>, AtriumError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AtriumError::Channel {
                message: "mock provider rejected the message".into(),
                source: None,
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(Dispatched {
                channel_id: channel.id.clone(),
                recipient: recipient.to_string(),
                message: message.clone(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("mock-out-{n}")))
    }
}
