// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound dispatcher used by the binary.
//!
//! Provider send APIs are outside this crate; outbound messages are
//! logged and reported as handed off without a provider id.

use async_trait::async_trait;
use tracing::info;

use atrium_core::types::{AdapterType, Channel, HealthStatus, Message};
use atrium_core::{AtriumError, OutboundDispatcher, PluginAdapter};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl PluginAdapter for LogDispatcher {
    fn name(&self) -> &str {
        "log"
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
impl OutboundDispatcher for LogDispatcher {
    async fn dispatch(
        &self,
        channel: &Channel,
        recipient: &str,
        message: &Message,
    ) -> Result<Option<String>, AtriumError> {
        info!(
            tenant_id = %channel.tenant_id,
            channel_id = %channel.id,
            channel_type = %channel.channel_type,
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            recipient,
            "outbound message"
        );
        Ok(None)
    }
}
