// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message orchestration for the Atrium routing engine.
//!
//! The [`Orchestrator`] is the central coordinator that:
//! - Resolves the sender to a canonical contact
//! - Appends the inbound message and applies the handoff policy atomically
//! - Streams bot replies to the end user and the provider
//! - Degrades to the human queue when the bot cannot answer
//! - Scores leads without affecting routing
//!
//! [`worker`] drains the durable inbound queue with retry and backoff;
//! [`sweeper`] drives the SLA and idle timers.

pub mod orchestrator;
pub mod policy;
pub mod scoring;
pub mod shutdown;
pub mod sweeper;
pub mod unifier;
pub mod worker;

pub use orchestrator::{Orchestrator, ProcessOutcome};
pub use policy::{HandoffPolicy, KeywordMatcher};
pub use scoring::HeuristicScorer;
pub use unifier::ContactUnifier;
