// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming HTTP responder.
//!
//! POSTs the message with recent history as JSON and reads the reply as
//! server-sent events (see [`crate::sse`]). There is no retry: the
//! orchestrator bounds generation time and hands off on failure.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::debug;

use atrium_core::traits::adapter::PluginAdapter;
use atrium_core::traits::responder::{BotRequest, BotResponder, ResponderStream};
use atrium_core::types::{AdapterType, Direction, HealthStatus, Message, SenderKind};
use atrium_core::AtriumError;

use crate::sse::parse_reply_stream;

#[derive(Debug, Serialize)]
struct WireTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    tenant_id: &'a str,
    conversation_id: &'a str,
    contact_id: &'a str,
    channel: String,
    message: &'a str,
    history: Vec<WireTurn<'a>>,
}

fn role(message: &Message) -> &'static str {
    match (message.direction, message.sender_kind) {
        (Direction::Inbound, _) | (_, SenderKind::Contact) => "user",
        (_, SenderKind::Bot) => "assistant",
        (_, SenderKind::Agent) => "agent",
        (_, SenderKind::System) => "system",
    }
}

impl<'a> WireRequest<'a> {
    fn from_request(request: &'a BotRequest) -> Self {
        Self {
            tenant_id: request.tenant_id.as_str(),
            conversation_id: request.conversation_id.as_str(),
            contact_id: request.contact_id.as_str(),
            channel: request.channel_type.to_string(),
            message: &request.text,
            history: request
                .history
                .iter()
                .map(|m| WireTurn {
                    role: role(m),
                    content: &m.content,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponder {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpResponder {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, AtriumError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| AtriumError::Config(format!("invalid responder API key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AtriumError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl PluginAdapter for HttpResponder {
    fn name(&self) -> &str {
        "http"
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
impl BotResponder for HttpResponder {
    async fn respond(&self, request: BotRequest) -> Result<ResponderStream, AtriumError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&WireRequest::from_request(&request))
            .send()
            .await
            .map_err(|e| AtriumError::ResponderUnavailable {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, conversation_id = %request.conversation_id, "responder answered");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AtriumError::ResponderUnavailable {
                message: format!("responder returned {status}: {body}"),
                source: None,
            });
        }
        Ok(parse_reply_stream(response))
    }
}
