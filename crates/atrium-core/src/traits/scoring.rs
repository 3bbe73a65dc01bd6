// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead scoring trait: signals in, score out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AtriumError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelType, ContactId, ContactStatus, TenantId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSignals {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub contact_status: ContactStatus,
    pub channel_type: ChannelType,
    pub message_count: i64,
    pub total_conversations: i64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    /// Normalized to `0.0..=100.0`.
    pub score: f64,
}

#[async_trait]
pub trait LeadScorer: PluginAdapter {
    async fn score(&self, signals: LeadSignals) -> Result<LeadScore, AtriumError>;
}
