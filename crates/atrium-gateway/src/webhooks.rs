// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider webhook endpoints.
//!
//! `POST /webhooks/{channel_type}/{channel_id}` verifies, normalizes and
//! durably accepts a delivery before acknowledging it; processing happens
//! on the inbound workers. An authentic delivery that cannot be normalized
//! is still acknowledged, with status `dropped`. `GET` on the same path
//! answers the Meta subscription handshake.

use std::collections::HashMap;
use std::str::FromStr;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::Serialize;

use atrium_core::types::{ChannelId, ChannelType};
use atrium_core::{AtriumError, WebhookRequest};

use crate::error::ApiError;
use crate::server::GatewayState;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub accepted: usize,
    pub duplicates: usize,
}

fn parse_target(channel_type: &str, channel_id: &str) -> Result<(ChannelType, ChannelId), AtriumError> {
    let channel_type = ChannelType::from_str(channel_type)
        .map_err(|_| AtriumError::not_found("channel type", channel_type))?;
    Ok((channel_type, ChannelId::from(channel_id)))
}

fn to_request(headers: &HeaderMap, body: Bytes) -> WebhookRequest {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .fold(WebhookRequest::new(body.to_vec()), |req, (name, value)| {
            req.with_header(name, value)
        })
}

pub async fn receive(
    State(state): State<GatewayState>,
    Path((channel_type, channel_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let (channel_type, channel_id) = parse_target(&channel_type, &channel_id)?;
    let report = state
        .ingest
        .ingest(channel_type, &channel_id, to_request(&headers, body))
        .await?;
    Ok(Json(WebhookAck {
        status: if report.dropped { "dropped" } else { "ok" },
        accepted: report.accepted.len(),
        duplicates: report.duplicates,
    }))
}

pub async fn handshake(
    State(state): State<GatewayState>,
    Path((channel_type, channel_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<String, ApiError> {
    let (channel_type, channel_id) = parse_target(&channel_type, &channel_id)?;
    Ok(state.ingest.handshake(channel_type, &channel_id, &query).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_carried_lowercased() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Hub-Signature-256", "sha256=abc".parse().unwrap());
        let request = to_request(&headers, Bytes::from_static(b"{}"));
        assert_eq!(request.header("x-hub-signature-256"), Some("sha256=abc"));
        assert_eq!(request.body, b"{}");
    }

    #[test]
    fn unknown_channel_type_is_not_found() {
        assert!(matches!(
            parse_target("telegram", "ch"),
            Err(AtriumError::NotFound { .. })
        ));
        let (channel_type, id) = parse_target("whatsapp", "ch-1").unwrap();
        assert_eq!(channel_type, ChannelType::Whatsapp);
        assert_eq!(id.as_str(), "ch-1");
    }
}
