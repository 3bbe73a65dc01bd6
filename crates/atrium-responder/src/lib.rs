// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot responder adapters.
//!
//! [`HttpResponder`] streams replies from an external generation service
//! over server-sent events. [`DisabledResponder`] refuses every request so
//! each conversation degrades to the human queue.

pub mod disabled;
pub mod http;
pub mod sse;

use std::sync::Arc;

use atrium_config::model::{ResponderConfig, ResponderKind};
use atrium_core::{AtriumError, BotResponder};

pub use disabled::DisabledResponder;
pub use http::HttpResponder;

/// Builds the responder selected by `[responder] kind`.
pub fn from_config(config: &ResponderConfig) -> Result<Arc<dyn BotResponder>, AtriumError> {
    match config.kind {
        ResponderKind::Disabled => Ok(Arc::new(DisabledResponder)),
        ResponderKind::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                AtriumError::Config("responder.endpoint is required when kind = \"http\"".into())
            })?;
            Ok(Arc::new(HttpResponder::new(endpoint, config.api_key.clone())?))
        }
    }
}
