// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator authentication trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AtriumError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelType, OperatorId, TenantId};

/// An authenticated operator. Every operator call carries its tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub tenant_id: TenantId,
    pub operator_id: OperatorId,
    pub name: String,
    /// Channel types this operator can attend. Empty means all.
    pub skills: Vec<ChannelType>,
}

impl Principal {
    /// Skill set expanded to explicit channel types.
    pub fn effective_skills(&self) -> Vec<ChannelType> {
        if self.skills.is_empty() {
            ChannelType::ALL.to_vec()
        } else {
            self.skills.clone()
        }
    }
}

#[async_trait]
pub trait AuthAdapter: PluginAdapter {
    /// Resolves a bearer token to a principal.
    async fn authenticate(&self, token: &str) -> Result<Principal, AtriumError>;
}
