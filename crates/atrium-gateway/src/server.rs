// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Router, middleware as axum_middleware};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use atrium_agent::Orchestrator;
use atrium_config::AtriumConfig;
use atrium_config::model::ServerConfig;
use atrium_core::{AtriumError, AuthAdapter, StorageAdapter};
use atrium_ingest::IngestionGateway;
use atrium_queue::AttendanceQueue;

use crate::auth::auth_middleware;
use crate::registry::ConnectionRegistry;
use crate::sse::SessionStreams;
use crate::{handlers, sse, webhooks, ws};

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl HealthState {
    pub fn new(prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>) -> Self {
        Self {
            start_time: std::time::Instant::now(),
            prometheus_render,
        }
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub storage: Arc<dyn StorageAdapter>,
    pub ingest: Arc<IngestionGateway>,
    pub queue: Arc<AttendanceQueue>,
    pub orchestrator: Arc<Orchestrator>,
    pub auth: Arc<dyn AuthAdapter>,
    pub registry: Arc<ConnectionRegistry>,
    pub streams: Arc<SessionStreams>,
    pub config: Arc<AtriumConfig>,
    pub health: HealthState,
}

/// Builds the full route table.
///
/// - `GET /health`, `GET /metrics` (public)
/// - `GET|POST /webhooks/{channel_type}/{channel_id}` (provider-verified)
/// - `GET /v1/chat/{channel_id}?session=&token=` (end-user SSE, web chat only)
/// - `GET /v1/operator/ws` (token checked during handshake)
/// - `/v1/queue*`, `/v1/conversations*`, `/v1/channels*`, `/v1/contacts*`
///   (bearer auth)
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .route(
            "/webhooks/{channel_type}/{channel_id}",
            get(webhooks::handshake).post(webhooks::receive),
        )
        .route("/v1/chat/{channel_id}", get(sse::chat_stream))
        .route("/v1/operator/ws", get(ws::ws_handler))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/queue", get(handlers::get_queue))
        .route("/v1/queue/pull", post(handlers::post_pull))
        .route("/v1/queue/items/{item_id}/assign", post(handlers::post_assign))
        .route("/v1/queue/items/{item_id}/transfer", post(handlers::post_transfer))
        .route("/v1/conversations", get(handlers::get_conversations))
        .route("/v1/conversations/{conversation_id}", get(handlers::get_conversation))
        .route(
            "/v1/conversations/{conversation_id}/messages",
            get(handlers::get_messages).post(handlers::post_message),
        )
        .route(
            "/v1/conversations/{conversation_id}/transitions",
            get(handlers::get_transitions),
        )
        .route("/v1/conversations/{conversation_id}/handoff", post(handlers::post_handoff))
        .route("/v1/conversations/{conversation_id}/close", post(handlers::post_close))
        .route("/v1/channels", get(handlers::get_channels).post(handlers::post_channel))
        .route("/v1/channels/{channel_id}", get(handlers::get_channel))
        .route("/v1/channels/{channel_id}/status", post(handlers::post_channel_status))
        .route("/v1/contacts", get(handlers::get_contacts))
        .route("/v1/contacts/{contact_id}", get(handlers::get_contact))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds the configured address and serves until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), AtriumError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AtriumError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| AtriumError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server stopped");
    Ok(())
}
