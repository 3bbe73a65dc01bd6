// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator WebSocket.
//!
//! Client -> Server (JSON):
//! ```json
//! {"type": "join_conversation", "conversation_id": "..."}
//! {"type": "leave_conversation", "conversation_id": "..."}
//! {"type": "send_message", "conversation_id": "...", "text": "Oi, sou a Ana"}
//! ```
//!
//! Server -> Client: operator events (`new_conversation`, `queue_update`,
//! `message_appended`, `assignment_changed`) plus `joined`, `left` and
//! `rejected` acknowledgements. Rejections never carry internal detail.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use atrium_core::AtriumError;
use atrium_core::traits::auth::Principal;
use atrium_core::types::ConversationId;

use crate::auth::bearer_token;
use crate::error::ApiError;
use crate::registry::ConnectionId;
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinConversation {
        conversation_id: ConversationId,
    },
    LeaveConversation {
        conversation_id: ConversationId,
    },
    SendMessage {
        conversation_id: ConversationId,
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Ack<'a> {
    Joined {
        conversation_id: &'a ConversationId,
    },
    Left {
        conversation_id: &'a ConversationId,
    },
    Rejected {
        request: &'static str,
        conversation_id: &'a ConversationId,
    },
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /v1/operator/ws
///
/// Authenticates with `?token=` (or a bearer header) before upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .unwrap_or_default()
        .to_string();
    if token.is_empty() {
        return ApiError(AtriumError::Unauthorized("missing operator token".into())).into_response();
    }
    match state.auth.authenticate(&token).await {
        Ok(principal) => ws.on_upgrade(move |socket| handle_socket(socket, state, principal)),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: GatewayState, principal: Principal) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (id, mut outbound) = state.registry.register(&principal);

    let sender_task = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if ws_sender
                .send(Message::Text(payload.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                let frame: ClientFrame = match serde_json::from_str(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(connection_id = id, "invalid operator frame: {e}");
                        continue;
                    }
                };
                handle_frame(&state, &principal, id, frame).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.registry.unregister(id);
    sender_task.abort();
}

pub(crate) async fn handle_frame(
    state: &GatewayState,
    principal: &Principal,
    id: ConnectionId,
    frame: ClientFrame,
) {
    match frame {
        ClientFrame::JoinConversation { conversation_id } => {
            match state
                .storage
                .get_conversation(&principal.tenant_id, &conversation_id)
                .await
            {
                Ok(_) => {
                    state.registry.join(id, conversation_id.clone());
                    state.registry.send_to(
                        id,
                        &Ack::Joined {
                            conversation_id: &conversation_id,
                        },
                    );
                }
                Err(e) => {
                    debug!(connection_id = id, error = %e, "join rejected");
                    reject(state, id, "join_conversation", &conversation_id);
                }
            }
        }
        ClientFrame::LeaveConversation { conversation_id } => {
            state.registry.leave(id, &conversation_id);
            state.registry.send_to(
                id,
                &Ack::Left {
                    conversation_id: &conversation_id,
                },
            );
        }
        ClientFrame::SendMessage {
            conversation_id,
            text,
        } => {
            let text = text.trim();
            if text.is_empty() {
                reject(state, id, "send_message", &conversation_id);
                return;
            }
            if let Err(e) = state
                .orchestrator
                .send_agent_message(principal, &conversation_id, text, Utc::now())
                .await
            {
                debug!(connection_id = id, conversation_id = %conversation_id, error = %e, "send_message rejected");
                reject(state, id, "send_message", &conversation_id);
            }
        }
    }
}

fn reject(state: &GatewayState, id: ConnectionId, request: &'static str, conversation_id: &ConversationId) {
    state.registry.send_to(
        id,
        &Ack::Rejected {
            request,
            conversation_id,
        },
    );
}
