// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic SLA and idle sweeps.

use atrium_core::types::{CloseReason, format_ts, parse_ts};
use atrium_core::{AtriumError, BusEvent, OperatorEvent};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::queue::AttendanceQueue;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub breached: usize,
    pub idle_closed: usize,
}

impl AttendanceQueue {
    /// Flags waiting items past their SLA deadline. Each item is reported
    /// once; it stays in the queue with its original position.
    pub async fn sweep_sla(&self, now: DateTime<Utc>) -> Result<usize, AtriumError> {
        let breached = self.storage().breach_overdue(&format_ts(now)).await?;
        for item in &breached {
            warn!(
                tenant_id = %item.tenant_id,
                item_id = %item.id,
                enqueued_at = %item.enqueued_at,
                "attendance item breached its SLA"
            );
            metrics::counter!("atrium_sla_breaches_total").increment(1);
            self.publish_raw(BusEvent::SlaBreached {
                tenant_id: item.tenant_id.clone(),
                item: item.clone(),
            });
            self.publish(
                &item.tenant_id,
                OperatorEvent::QueueUpdate {
                    item: item.clone(),
                    escalated: true,
                },
            );
        }
        Ok(breached.len())
    }

    /// Closes conversations in attendance with no activity for the tenant's
    /// idle timeout. A message that lands between the scan and the close
    /// resets the idle window and the close is skipped.
    pub async fn sweep_idle(&self, now: DateTime<Utc>) -> Result<usize, AtriumError> {
        let mut closed = 0;
        for conversation in self.storage().in_attendance_conversations().await? {
            let policy = self.config().routing_for(&conversation.tenant_id);
            if policy.idle_timeout_mins == 0 {
                continue;
            }
            let cutoff = now - Duration::minutes(policy.idle_timeout_mins as i64);
            let Some(idle_since) = conversation.idle_since.as_deref().and_then(parse_ts) else {
                continue;
            };
            if idle_since > cutoff {
                continue;
            }
            let outcome = self
                .close_with(
                    &conversation.tenant_id,
                    &conversation.id,
                    CloseReason::IdleTimeout,
                    Some(format_ts(cutoff)),
                    now,
                )
                .await;
            match outcome {
                Ok(Some(_)) => closed += 1,
                Ok(None) => debug!(conversation_id = %conversation.id, "activity resumed, idle close skipped"),
                Err(e) => warn!(conversation_id = %conversation.id, error = %e, "idle close failed"),
            }
        }
        if closed > 0 {
            metrics::counter!("atrium_idle_closes_total").increment(closed as u64);
        }
        Ok(closed)
    }

    /// Runs both sweeps.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, AtriumError> {
        Ok(SweepReport {
            breached: self.sweep_sla(now).await?,
            idle_closed: self.sweep_idle(now).await?,
        })
    }
}
