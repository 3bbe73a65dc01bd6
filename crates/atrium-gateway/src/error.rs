// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`AtriumError`] to HTTP responses.

use atrium_core::AtriumError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error. Server-side failures are logged and answered with a
/// generic message.
#[derive(Debug)]
pub struct ApiError(pub AtriumError);

impl From<AtriumError> for ApiError {
    fn from(err: AtriumError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &AtriumError) -> StatusCode {
    match err {
        AtriumError::Authenticity { .. } | AtriumError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AtriumError::Normalization { .. } | AtriumError::Config(_) => StatusCode::BAD_REQUEST,
        AtriumError::NotFound { .. } | AtriumError::TenantMismatch { .. } => StatusCode::NOT_FOUND,
        AtriumError::AssignmentConflict { .. } | AtriumError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        AtriumError::ChannelUnavailable { .. } => StatusCode::FORBIDDEN,
        AtriumError::DuplicateEvent { .. } => StatusCode::OK,
        AtriumError::Timeout { .. } | AtriumError::ResponderUnavailable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AtriumError::UnresolvedContact { .. }
        | AtriumError::Storage { .. }
        | AtriumError::Channel { .. }
        | AtriumError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let error = if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "request failed");
            status
                .canonical_reason()
                .unwrap_or("server error")
                .to_ascii_lowercase()
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
            self.0.to_string()
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
