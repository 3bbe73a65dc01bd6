// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingestion for the Atrium routing engine.
//!
//! Per-channel adapters verify and normalize provider payloads; the
//! [`IngestionGateway`] applies channel status and failure tracking and
//! persists canonical records idempotently into the durable inbound queue.

pub mod adapters;
pub mod gateway;
pub mod normalize;
pub mod signature;

pub use adapters::AdapterRegistry;
pub use gateway::{IngestReport, IngestionGateway};
