// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Atrium omnichannel routing engine.
//!
//! This crate provides the canonical domain model, the error taxonomy, the
//! committed-event types and the adapter traits that every other Atrium
//! crate builds on.

pub mod error;
pub mod events;
pub mod traits;
pub mod types;

pub use error::AtriumError;
pub use events::{BusEvent, OperatorEvent};
pub use types::{AdapterType, HealthStatus};

pub use traits::{
    AuthAdapter, BotResponder, LeadScorer, OutboundDispatcher, PluginAdapter, ReplyStreams,
    StorageAdapter, WebhookAdapter, WebhookRequest,
};
