// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable inbound queue.
//!
//! Verified webhook events land here before the gateway acknowledges the
//! provider. Entries sharing a route key (channel plus external contact) are
//! claimed strictly in insertion order: an entry is not due while an earlier
//! entry of the same route is still pending or processing.

use atrium_core::AtriumError;
use atrium_core::traits::storage::{AcceptOutcome, InboundEntry, InboundStatus};
use atrium_core::types::CanonicalInbound;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use crate::database::{Database, TxResult};

fn status_str(status: InboundStatus) -> &'static str {
    match status {
        InboundStatus::Pending => "pending",
        InboundStatus::Processing => "processing",
        InboundStatus::Completed => "completed",
        InboundStatus::Failed => "failed",
    }
}

fn parse_status(raw: &str) -> Option<InboundStatus> {
    match raw {
        "pending" => Some(InboundStatus::Pending),
        "processing" => Some(InboundStatus::Processing),
        "completed" => Some(InboundStatus::Completed),
        "failed" => Some(InboundStatus::Failed),
        _ => None,
    }
}

fn route_key(record: &CanonicalInbound) -> String {
    format!("{}:{}", record.channel_id, record.external_contact_id)
}

fn mark_failed(conn: &Connection, id: i64, error: &str, now: &str) -> TxResult<()> {
    conn.execute(
        "UPDATE inbound_queue SET status = ?4, locked_until = NULL, last_error = ?2,
             updated_at = ?3
         WHERE id = ?1",
        params![id, error, now, status_str(InboundStatus::Failed)],
    )?;
    Ok(())
}

pub async fn accept(
    db: &Database,
    record: &CanonicalInbound,
    max_attempts: i64,
    now: &str,
) -> Result<AcceptOutcome, AtriumError> {
    let payload = serde_json::to_string(record)
        .map_err(|e| AtriumError::Internal(format!("inbound payload encoding failed: {e}")))?;
    let key = route_key(record);
    let tenant = record.tenant_id.0.clone();
    let channel = record.channel_id.0.clone();
    let external = record.external_message_id.clone();
    let now = now.to_string();
    db.transact(move |tx| {
        let changed = tx.execute(
            "INSERT OR IGNORE INTO inbound_queue (tenant_id, channel_id, external_message_id,
                 route_key, payload, max_attempts, available_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)",
            params![tenant, channel, external, key, payload, max_attempts, now],
        )?;
        if changed == 0 {
            return Ok(AcceptOutcome::Duplicate);
        }
        Ok(AcceptOutcome::Accepted(tx.last_insert_rowid()))
    })
    .await
}

/// Claims due entries in id order, respecting per-route ordering.
pub async fn claim(
    db: &Database,
    now: &str,
    lock_until: &str,
    limit: i64,
) -> Result<Vec<InboundEntry>, AtriumError> {
    let now = now.to_string();
    let lock_until = lock_until.to_string();
    db.transact(move |tx| {
        let candidates = {
            let mut stmt = tx.prepare(
                "SELECT q.id, q.payload, q.attempts, q.max_attempts, q.last_error
                 FROM inbound_queue q
                 WHERE ((q.status = 'pending' AND q.available_at <= ?1)
                        OR (q.status = 'processing' AND q.locked_until <= ?1))
                   AND NOT EXISTS (
                       SELECT 1 FROM inbound_queue e
                       WHERE e.route_key = q.route_key AND e.id < q.id
                         AND e.status IN ('pending', 'processing'))
                 ORDER BY q.id ASC
                 LIMIT ?2",
            )?;
            stmt.query_map(params![now, limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?
        };

        let mut claimed = Vec::with_capacity(candidates.len());
        for (id, payload, attempts, max_attempts, last_error) in candidates {
            if attempts >= max_attempts {
                warn!(id, attempts, "inbound entry lock expired with no attempts left");
                mark_failed(tx, id, "attempts exhausted", &now)?;
                continue;
            }
            let record: CanonicalInbound = match serde_json::from_str(&payload) {
                Ok(record) => record,
                Err(e) => {
                    warn!(id, error = %e, "undecodable inbound payload");
                    mark_failed(tx, id, &format!("undecodable payload: {e}"), &now)?;
                    continue;
                }
            };
            tx.execute(
                "UPDATE inbound_queue SET status = 'processing', attempts = attempts + 1,
                     locked_until = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![id, lock_until, now],
            )?;
            claimed.push(InboundEntry {
                id,
                record,
                attempts: attempts + 1,
                max_attempts,
                last_error,
            });
        }
        Ok(claimed)
    })
    .await
}

pub async fn complete(db: &Database, id: i64, now: &str) -> Result<(), AtriumError> {
    let now = now.to_string();
    db.transact(move |tx| {
        tx.execute(
            "UPDATE inbound_queue SET status = 'completed', locked_until = NULL, updated_at = ?2
             WHERE id = ?1",
            params![id, now],
        )?;
        Ok(())
    })
    .await
}

/// Records a failed attempt: back to `pending` until `retry_at`, or
/// `failed` once attempts are exhausted.
pub async fn fail(
    db: &Database,
    id: i64,
    error: &str,
    retry_at: &str,
    now: &str,
) -> Result<InboundStatus, AtriumError> {
    let error = error.to_string();
    let retry_at = retry_at.to_string();
    let now = now.to_string();
    db.transact(move |tx| {
        let Some((attempts, max_attempts)) = tx
            .query_row(
                "SELECT attempts, max_attempts FROM inbound_queue WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?
        else {
            return Err(AtriumError::not_found("inbound entry", id.to_string()).into());
        };
        if attempts >= max_attempts {
            mark_failed(tx, id, &error, &now)?;
            return Ok(InboundStatus::Failed);
        }
        tx.execute(
            "UPDATE inbound_queue SET status = 'pending', locked_until = NULL, last_error = ?2,
                 available_at = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, error, retry_at, now],
        )?;
        Ok(InboundStatus::Pending)
    })
    .await
}

pub async fn status(db: &Database, id: i64) -> Result<Option<InboundStatus>, AtriumError> {
    db.read(move |conn| {
        let raw: Option<String> = conn
            .query_row(
                "SELECT status FROM inbound_queue WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.as_deref().and_then(parse_status))
    })
    .await
}

/// Counts entries per status, for the health endpoint.
pub async fn depth(db: &Database) -> Result<Vec<(InboundStatus, i64)>, AtriumError> {
    db.read(|conn| {
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM inbound_queue GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(raw, count)| parse_status(&raw).map(|s| (s, count)))
            .collect())
    })
    .await
}
