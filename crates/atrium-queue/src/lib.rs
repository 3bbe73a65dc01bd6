// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attendance queue and routing service.
//!
//! Items are served by priority (descending) then enqueue time (ascending).
//! Skill-based routing is a filter over the one per-tenant queue. The only
//! mutual exclusion is the storage compare-and-set on the item status.

pub mod queue;
pub mod sweep;

pub use queue::{AssignResult, AttendanceQueue};
pub use sweep::SweepReport;
