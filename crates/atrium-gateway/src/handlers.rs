// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST handlers for operator consoles.
//!
//! Every route here sits behind [`crate::auth::auth_middleware`] and is
//! scoped to the authenticated principal's tenant.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use atrium_core::traits::auth::Principal;
use atrium_core::traits::storage::ConversationTransition;
use atrium_core::types::{
    AttendanceItem, Channel, ChannelId, ChannelStatus, ChannelType, Contact, ContactId,
    ContactIdentity, Conversation, ConversationId, ConversationStatus, HandoffReason, ItemId,
    Message, OperatorId, QueueSnapshot,
};
use atrium_core::{AtriumError, HealthStatus};
use atrium_queue::AssignResult;

use crate::error::{ApiError, ErrorResponse};
use crate::server::GatewayState;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 500;

fn page(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
}

fn bad_request(error: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// -- Queue --

#[derive(Debug, Serialize)]
pub struct QueueView {
    pub snapshot: QueueSnapshot,
    pub waiting: Vec<AttendanceItem>,
}

/// GET /v1/queue
pub async fn get_queue(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<QueueView>, ApiError> {
    let snapshot = state.queue.snapshot(&principal.tenant_id).await?;
    let waiting = state
        .storage
        .next_waiting(&principal.tenant_id, &principal.effective_skills(), MAX_PAGE)
        .await?;
    Ok(Json(QueueView { snapshot, waiting }))
}

/// POST /v1/queue/pull
///
/// Assigns the best waiting item matching the operator's skills, or
/// answers 204 when there is none.
pub async fn post_pull(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, ApiError> {
    Ok(match state.queue.pull_next(&principal, Utc::now()).await? {
        Some(item) => Json(item).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

#[derive(Debug, Serialize)]
pub struct ConflictResponse {
    pub error: String,
    /// The next item the operator could take instead.
    pub next: Option<AttendanceItem>,
}

/// POST /v1/queue/items/{item_id}/assign
pub async fn post_assign(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(item_id): Path<String>,
) -> Result<Response, ApiError> {
    let item_id = ItemId::from(item_id.as_str());
    Ok(match state.queue.assign(&principal, &item_id, Utc::now()).await? {
        AssignResult::Assigned(item) => Json(item).into_response(),
        AssignResult::Conflict { next } => (
            StatusCode::CONFLICT,
            Json(ConflictResponse {
                error: AtriumError::AssignmentConflict {
                    item_id: item_id.to_string(),
                }
                .to_string(),
                next,
            }),
        )
            .into_response(),
    })
}

#[derive(Debug, Deserialize)]
pub struct TransferBody {
    /// Target operator; absent returns the item to the queue.
    #[serde(default)]
    pub to: Option<String>,
}

/// POST /v1/queue/items/{item_id}/transfer
pub async fn post_transfer(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(item_id): Path<String>,
    Json(body): Json<TransferBody>,
) -> Result<Json<AttendanceItem>, ApiError> {
    let to = body
        .to
        .filter(|t| !t.trim().is_empty())
        .map(|t| OperatorId::from(t.as_str()));
    let record = state
        .queue
        .transfer(&principal, &ItemId::from(item_id.as_str()), to, Utc::now())
        .await?;
    Ok(Json(record.item))
}

// -- Conversations --

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    #[serde(default)]
    pub status: Option<ConversationStatus>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// GET /v1/conversations
pub async fn get_conversations(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state
        .storage
        .list_conversations(&principal.tenant_id, query.status, page(query.limit))
        .await?;
    Ok(Json(conversations))
}

/// GET /v1/conversations/{conversation_id}
pub async fn get_conversation(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = state
        .storage
        .get_conversation(&principal.tenant_id, &ConversationId::from(conversation_id.as_str()))
        .await?;
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default)]
    pub after: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// GET /v1/conversations/{conversation_id}/messages
pub async fn get_messages(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(conversation_id): Path<String>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state
        .storage
        .list_messages(
            &principal.tenant_id,
            &ConversationId::from(conversation_id.as_str()),
            query.after.unwrap_or(0),
            page(query.limit),
        )
        .await?;
    Ok(Json(messages))
}

/// GET /v1/conversations/{conversation_id}/transitions
pub async fn get_transitions(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<ConversationTransition>>, ApiError> {
    let transitions = state
        .storage
        .list_transitions(&principal.tenant_id, &ConversationId::from(conversation_id.as_str()))
        .await?;
    Ok(Json(transitions))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    pub text: String,
}

/// POST /v1/conversations/{conversation_id}/messages
pub async fn post_message(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(conversation_id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Result<Response, ApiError> {
    let text = body.text.trim();
    if text.is_empty() {
        return Ok(bad_request("message text is empty"));
    }
    let message = state
        .orchestrator
        .send_agent_message(
            &principal,
            &ConversationId::from(conversation_id.as_str()),
            text,
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(message)).into_response())
}

/// POST /v1/conversations/{conversation_id}/handoff
///
/// Manual escalation of a bot-handled conversation.
pub async fn post_handoff(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(conversation_id): Path<String>,
) -> Result<Json<AttendanceItem>, ApiError> {
    let record = state
        .queue
        .enqueue(
            &principal.tenant_id,
            &ConversationId::from(conversation_id.as_str()),
            HandoffReason::Manual,
            Utc::now(),
        )
        .await?;
    Ok(Json(record.item))
}

/// POST /v1/conversations/{conversation_id}/close
pub async fn post_close(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    let record = state
        .queue
        .close_by_operator(
            &principal,
            &ConversationId::from(conversation_id.as_str()),
            Utc::now(),
        )
        .await?;
    Ok(Json(record.conversation))
}

// -- Channels --

/// GET /v1/channels
pub async fn get_channels(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Channel>>, ApiError> {
    Ok(Json(state.storage.list_channels(&principal.tenant_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelBody {
    pub channel_type: ChannelType,
    pub name: String,
    pub webhook_secret: String,
    #[serde(default)]
    pub verify_token: Option<String>,
    #[serde(default)]
    pub phone_number_id: Option<String>,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub mailbox: Option<String>,
}

/// POST /v1/channels
///
/// New channels start in `configuring` and become `active` on their first
/// verified delivery.
pub async fn post_channel(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateChannelBody>,
) -> Result<Response, ApiError> {
    if body.name.trim().is_empty() || body.webhook_secret.trim().is_empty() {
        return Ok(bad_request("name and webhook_secret are required"));
    }
    let mut channel = Channel::new(
        principal.tenant_id.clone(),
        body.channel_type,
        body.name.trim(),
        body.webhook_secret,
    );
    channel.verify_token = body.verify_token;
    channel.phone_number_id = body.phone_number_id;
    channel.page_id = body.page_id;
    channel.mailbox = body.mailbox;
    state.storage.create_channel(&channel).await?;
    tracing::info!(tenant_id = %channel.tenant_id, channel_id = %channel.id, channel_type = %channel.channel_type, "channel created");
    Ok((StatusCode::CREATED, Json(channel)).into_response())
}

/// GET /v1/channels/{channel_id}
pub async fn get_channel(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(channel_id): Path<String>,
) -> Result<Json<Channel>, ApiError> {
    let channel = state
        .storage
        .get_channel(&principal.tenant_id, &ChannelId::from(channel_id.as_str()))
        .await?;
    Ok(Json(channel))
}

#[derive(Debug, Deserialize)]
pub struct ChannelStatusBody {
    pub status: ChannelStatus,
}

/// POST /v1/channels/{channel_id}/status
pub async fn post_channel_status(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(channel_id): Path<String>,
    Json(body): Json<ChannelStatusBody>,
) -> Result<Json<Channel>, ApiError> {
    let channel = state
        .storage
        .set_channel_status(
            &principal.tenant_id,
            &ChannelId::from(channel_id.as_str()),
            body.status,
        )
        .await?;
    Ok(Json(channel))
}

// -- Contacts --

#[derive(Debug, Deserialize)]
pub struct ContactQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// GET /v1/contacts
pub async fn get_contacts(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ContactQuery>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    let contacts = state
        .storage
        .list_contacts(
            &principal.tenant_id,
            page(query.limit),
            query.offset.unwrap_or(0).max(0),
        )
        .await?;
    Ok(Json(contacts))
}

#[derive(Debug, Serialize)]
pub struct ContactView {
    pub contact: Contact,
    pub identities: Vec<ContactIdentity>,
}

/// GET /v1/contacts/{contact_id}
pub async fn get_contact(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(contact_id): Path<String>,
) -> Result<Json<ContactView>, ApiError> {
    let contact_id = ContactId::from(contact_id.as_str());
    let contact = state.storage.get_contact(&principal.tenant_id, &contact_id).await?;
    let identities = state
        .storage
        .contact_identities(&principal.tenant_id, &contact_id)
        .await?;
    Ok(Json(ContactView {
        contact,
        identities,
    }))
}

// -- Public --

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub operators_connected: usize,
}

/// GET /health
pub async fn get_public_health(State(state): State<GatewayState>) -> Response {
    let storage = state.storage.health_check().await;
    let (code, status) = match storage {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "healthy".to_string()),
        Ok(HealthStatus::Degraded(reason)) => (StatusCode::OK, format!("degraded: {reason}")),
        Ok(HealthStatus::Unhealthy(reason)) => {
            (StatusCode::SERVICE_UNAVAILABLE, format!("unhealthy: {reason}"))
        }
        Err(e) => {
            tracing::warn!(error = %e, "storage health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy".to_string())
        }
    };
    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        operators_connected: state.registry.len(),
    };
    (code, Json(body)).into_response()
}

/// GET /metrics
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
