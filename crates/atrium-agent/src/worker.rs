// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound queue workers.
//!
//! Each worker claims due entries under a processing lock, runs them
//! through the [`Orchestrator`] and completes or reschedules them. Entries
//! of one route (channel plus sender) are never claimed concurrently, so
//! per-conversation arrival order holds with any number of workers. A lock
//! left behind by a crashed worker expires and the entry is claimed again.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use atrium_config::model::IngestionConfig;
use atrium_core::traits::storage::{InboundEntry, InboundStatus};
use atrium_core::types::format_ts;
use atrium_core::{AtriumError, StorageAdapter};
use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::orchestrator::{Orchestrator, ProcessOutcome};

/// Exponential backoff for the given attempt number (1-based), capped.
pub fn retry_delay(config: &IngestionConfig, attempts: i64) -> Duration {
    let exponent = u32::try_from(attempts.saturating_sub(1).clamp(0, 20)).unwrap_or(20);
    let secs = config
        .retry_base_secs
        .saturating_mul(1u64 << exponent)
        .min(config.retry_max_secs);
    Duration::seconds(secs as i64)
}

pub struct InboundWorker {
    id: usize,
    storage: Arc<dyn StorageAdapter>,
    orchestrator: Arc<Orchestrator>,
    config: IngestionConfig,
}

impl InboundWorker {
    pub fn new(
        id: usize,
        storage: Arc<dyn StorageAdapter>,
        orchestrator: Arc<Orchestrator>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            id,
            storage,
            orchestrator,
            config,
        }
    }

    /// Polls until cancelled. An empty claim sleeps for the poll interval.
    pub async fn run(self, cancel: CancellationToken) {
        info!(worker = self.id, "inbound worker started");
        let idle = StdDuration::from_millis(self.config.poll_interval_ms);
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let handled = match self.drain_once(Utc::now()).await {
                Ok(n) => n,
                Err(e) => {
                    error!(worker = self.id, error = %e, "failed to claim inbound entries");
                    0
                }
            };
            if handled == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(idle) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }
        info!(worker = self.id, "inbound worker stopped");
    }

    /// Claims and processes one batch. Returns the number of entries handled.
    ///
    /// `now` is the claim time. Each entry runs at `now` plus the time the
    /// batch has spent so far.
    pub async fn drain_once(&self, now: DateTime<Utc>) -> Result<usize, AtriumError> {
        let lock_until = now + Duration::seconds(self.config.lock_secs as i64);
        let entries = self
            .storage
            .claim_inbound(
                &format_ts(now),
                &format_ts(lock_until),
                i64::from(self.config.batch_size),
            )
            .await?;
        let count = entries.len();
        let started = Instant::now();
        for entry in entries {
            self.handle(entry, entry_time(now, started.elapsed())).await;
        }
        Ok(count)
    }

    async fn handle(&self, entry: InboundEntry, now: DateTime<Utc>) {
        match self.orchestrator.process(&entry.record, now).await {
            Ok(outcome) => {
                let label = match outcome {
                    ProcessOutcome::Duplicate => "duplicate",
                    ProcessOutcome::Recorded { .. } => "processed",
                };
                metrics::counter!("atrium_inbound_processed_total", "outcome" => label).increment(1);
                if let Err(e) = self.storage.complete_inbound(entry.id, &format_ts(now)).await {
                    // The lock expires and the entry is re-run; the append is idempotent.
                    warn!(entry_id = entry.id, error = %e, "failed to complete inbound entry");
                }
            }
            Err(e) => self.reschedule(&entry, &e, now).await,
        }
    }

    async fn reschedule(&self, entry: &InboundEntry, cause: &AtriumError, now: DateTime<Utc>) {
        let retry_at = now + retry_delay(&self.config, entry.attempts);
        let status = self
            .storage
            .fail_inbound(entry.id, &cause.to_string(), &format_ts(retry_at), &format_ts(now))
            .await;
        match status {
            Ok(InboundStatus::Failed) => {
                metrics::counter!("atrium_inbound_processed_total", "outcome" => "failed").increment(1);
                error!(
                    entry_id = entry.id,
                    attempts = entry.attempts,
                    external_message_id = %entry.record.external_message_id,
                    error = %cause,
                    "inbound entry exhausted its attempts"
                );
            }
            Ok(_) => {
                metrics::counter!("atrium_inbound_processed_total", "outcome" => "retried").increment(1);
                if cause.is_retryable() {
                    debug!(entry_id = entry.id, attempts = entry.attempts, error = %cause, "inbound entry rescheduled");
                } else {
                    warn!(entry_id = entry.id, attempts = entry.attempts, error = %cause, "inbound entry rescheduled after non-transient error");
                }
            }
            Err(e) => warn!(entry_id = entry.id, error = %e, "failed to reschedule inbound entry"),
        }
    }
}

/// Claim time advanced by the whole seconds the batch has run.
fn entry_time(claimed_at: DateTime<Utc>, elapsed: StdDuration) -> DateTime<Utc> {
    let secs = i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX);
    Duration::try_seconds(secs)
        .and_then(|d| claimed_at.checked_add_signed(d))
        .unwrap_or(claimed_at)
}

/// Spawns `config.workers` workers sharing one orchestrator.
pub fn spawn_workers(
    storage: Arc<dyn StorageAdapter>,
    orchestrator: Arc<Orchestrator>,
    config: &IngestionConfig,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..config.workers.max(1))
        .map(|id| {
            let worker = InboundWorker::new(id, storage.clone(), orchestrator.clone(), config.clone());
            tokio::spawn(worker.run(cancel.child_token()))
        })
        .collect()
}
