// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Async adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod auth;
pub mod channel;
pub mod dispatch;
pub mod responder;
pub mod scoring;
pub mod storage;
pub mod stream;

pub use adapter::PluginAdapter;
pub use auth::{AuthAdapter, Principal};
pub use channel::{WebhookAdapter, WebhookRequest};
pub use dispatch::OutboundDispatcher;
pub use responder::{BotRequest, BotResponder, ResponderEvent, ResponderStream};
pub use scoring::{LeadScore, LeadScorer, LeadSignals};
pub use storage::StorageAdapter;
pub use stream::{NoReplyStreams, ReplySink, ReplyStreams, StreamFrame};
