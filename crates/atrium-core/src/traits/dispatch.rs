// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound dispatch trait: hands outbound messages to the provider.

use async_trait::async_trait;

use crate::error::AtriumError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Channel, Message};

#[async_trait]
pub trait OutboundDispatcher: PluginAdapter {
    /// Sends `message` to `recipient` (the contact's external id on the
    /// channel). Returns the provider message id when one is assigned.
    async fn dispatch(
        &self,
        channel: &Channel,
        recipient: &str,
        message: &Message,
    ) -> Result<Option<String>, AtriumError>;
}
