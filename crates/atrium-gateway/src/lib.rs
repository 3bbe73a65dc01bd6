// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface of the Atrium routing engine.
//!
//! Serves the per-channel webhook endpoints, the operator WebSocket, the
//! end-user reply stream and a thin REST surface over the queue, channels
//! and contacts. Committed state transitions reach operator consoles
//! through the [`ConnectionRegistry`], fed from the event bus by
//! [`run_fanout`].

pub mod auth;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod registry;
pub mod server;
pub mod sse;
pub mod webhooks;
pub mod ws;

pub use auth::StaticTokenAuth;
pub use fanout::run_fanout;
pub use registry::ConnectionRegistry;
pub use server::{GatewayState, HealthState, build_router, start_server};
pub use sse::SessionStreams;
