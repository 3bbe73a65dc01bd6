// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic driver for the SLA and idle sweeps.

use std::sync::Arc;
use std::time::Duration;

use atrium_queue::AttendanceQueue;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs [`AttendanceQueue::sweep`] every `interval` until cancelled.
/// Timers are cooperative: a slow pass delays the next tick instead of
/// overlapping it.
pub async fn run_sweeper(queue: Arc<AttendanceQueue>, interval: Duration, cancel: CancellationToken) {
    info!(interval_secs = interval.as_secs(), "sweeper started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match queue.sweep(Utc::now()).await {
                    Ok(report) if report.breached > 0 || report.idle_closed > 0 => {
                        info!(breached = report.breached, idle_closed = report.idle_closed, "sweep applied");
                    }
                    Ok(_) => debug!("sweep found nothing to do"),
                    Err(e) => warn!(error = %e, "sweep failed"),
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    info!("sweeper stopped");
}
