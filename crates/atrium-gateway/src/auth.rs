// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator authentication.
//!
//! Operators present a bearer token (`Authorization: Bearer <token>` on
//! REST calls, `?token=` on the WebSocket handshake). Tokens come from the
//! `[[operators]]` config section. An empty operator list rejects every
//! request (fail-closed).

use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use atrium_config::model::OperatorConfig;
use atrium_core::traits::auth::Principal;
use atrium_core::types::{AdapterType, HealthStatus, OperatorId, TenantId};
use atrium_core::{AtriumError, AuthAdapter, PluginAdapter};

use crate::error::ApiError;
use crate::server::GatewayState;

/// Token table built from configuration.
pub struct StaticTokenAuth {
    tokens: HashMap<String, Principal>,
}

impl std::fmt::Debug for StaticTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenAuth")
            .field("operators", &self.tokens.len())
            .finish()
    }
}

impl StaticTokenAuth {
    pub fn from_config(operators: &[OperatorConfig]) -> Self {
        let tokens = operators
            .iter()
            .map(|op| {
                let principal = Principal {
                    tenant_id: TenantId::from(op.tenant_id.as_str()),
                    operator_id: OperatorId::from(op.operator_id.as_str()),
                    name: if op.name.is_empty() {
                        op.operator_id.clone()
                    } else {
                        op.name.clone()
                    },
                    skills: op.skills.clone(),
                };
                (op.token.clone(), principal)
            })
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl PluginAdapter for StaticTokenAuth {
    fn name(&self) -> &str {
        "static-token"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Auth
    }

    async fn health_check(&self) -> Result<HealthStatus, AtriumError> {
        if self.tokens.is_empty() {
            Ok(HealthStatus::Degraded("no operators configured".into()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    async fn shutdown(&self) -> Result<(), AtriumError> {
        Ok(())
    }
}

#[async_trait]
impl AuthAdapter for StaticTokenAuth {
    async fn authenticate(&self, token: &str) -> Result<Principal, AtriumError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AtriumError::Unauthorized("invalid operator token".into()))
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the bearer token and stores the [`Principal`] in the request
/// extensions.
pub async fn auth_middleware(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return ApiError(AtriumError::Unauthorized("missing bearer token".into())).into_response();
    };
    match state.auth.authenticate(token).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}
