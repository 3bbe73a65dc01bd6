// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use atrium_core::traits::adapter::PluginAdapter;
use atrium_core::traits::responder::{BotRequest, BotResponder, ResponderStream};
use atrium_core::types::{AdapterType, HealthStatus};
use atrium_core::AtriumError;

/// Responder used when no generation service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledResponder;

#[async_trait]
impl PluginAdapter for DisabledResponder {
    fn name(&self) -> &str {
        "disabled"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Responder
    }

    async fn health_check(&self) -> Result<HealthStatus, AtriumError> {
        Ok(HealthStatus::Degraded("no bot responder configured".into()))
    }

    async fn shutdown(&self) -> Result<(), AtriumError> {
        Ok(())
    }
}

#[async_trait]
impl BotResponder for DisabledResponder {
    async fn respond(&self, _request: BotRequest) -> Result<ResponderStream, AtriumError> {
        Err(AtriumError::ResponderUnavailable {
            message: "no bot responder configured".into(),
            source: None,
        })
    }
}
