// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Atrium integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without external services.
//!
//! # Components
//!
//! - [`MockResponder`] - Scripted bot responder
//! - [`MockDispatcher`] - Outbound dispatcher that records what it sends
//! - [`RecordingReplyStreams`] - End-user streams captured in memory
//! - [`TestHarness`] - The full routing stack over a temp SQLite database

pub mod harness;
pub mod mock_dispatcher;
pub mod mock_responder;
pub mod mock_streams;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_dispatcher::{Dispatched, MockDispatcher};
pub use mock_responder::{MockResponder, Scripted};
pub use mock_streams::RecordingReplyStreams;
