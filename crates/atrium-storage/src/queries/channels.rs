// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel registry queries.

use atrium_core::AtriumError;
use atrium_core::types::{Channel, ChannelId, ChannelStatus, TenantId, now_ts};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::enum_col;
use crate::database::{Database, TxResult};

const COLUMNS: &str = "id, tenant_id, channel_type, name, status, phone_number_id, page_id,
     mailbox, credentials, webhook_secret, verify_token, messages_received, messages_sent,
     active_conversations, consecutive_failures, created_at, updated_at";

fn row_to_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: ChannelId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        channel_type: enum_col(row, 2)?,
        name: row.get(3)?,
        status: enum_col(row, 4)?,
        phone_number_id: row.get(5)?,
        page_id: row.get(6)?,
        mailbox: row.get(7)?,
        credentials: row.get(8)?,
        webhook_secret: row.get(9)?,
        verify_token: row.get(10)?,
        messages_received: row.get(11)?,
        messages_sent: row.get(12)?,
        active_conversations: row.get(13)?,
        consecutive_failures: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

pub(crate) fn find(conn: &Connection, channel_id: &str) -> TxResult<Option<Channel>> {
    let sql = format!("SELECT {COLUMNS} FROM channels WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![channel_id], row_to_channel)
        .optional()?)
}

/// Loads a channel and checks it belongs to `tenant_id`.
pub(crate) fn load(conn: &Connection, tenant_id: &str, channel_id: &str) -> TxResult<Channel> {
    match find(conn, channel_id)? {
        Some(channel) if channel.tenant_id.as_str() == tenant_id => Ok(channel),
        Some(_) => Err(AtriumError::TenantMismatch {
            entity: "channel",
            id: channel_id.to_string(),
            tenant_id: tenant_id.to_string(),
        }
        .into()),
        None => Err(AtriumError::not_found("channel", channel_id).into()),
    }
}

/// Adjusts the running counters of a channel.
pub(crate) fn bump_counters(
    conn: &Connection,
    channel_id: &str,
    received: i64,
    sent: i64,
    active: i64,
) -> TxResult<()> {
    conn.execute(
        "UPDATE channels SET
             messages_received = messages_received + ?2,
             messages_sent = messages_sent + ?3,
             active_conversations = MAX(active_conversations + ?4, 0)
         WHERE id = ?1",
        params![channel_id, received, sent, active],
    )?;
    Ok(())
}

pub async fn insert(db: &Database, channel: &Channel) -> Result<(), AtriumError> {
    let c = channel.clone();
    db.transact(move |tx| {
        tx.execute(
            "INSERT INTO channels (id, tenant_id, channel_type, name, status, phone_number_id,
                 page_id, mailbox, credentials, webhook_secret, verify_token, messages_received,
                 messages_sent, active_conversations, consecutive_failures, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                c.id.as_str(),
                c.tenant_id.as_str(),
                c.channel_type.to_string(),
                c.name,
                c.status.to_string(),
                c.phone_number_id,
                c.page_id,
                c.mailbox,
                c.credentials,
                c.webhook_secret,
                c.verify_token,
                c.messages_received,
                c.messages_sent,
                c.active_conversations,
                c.consecutive_failures,
                c.created_at,
                c.updated_at,
            ],
        )?;
        Ok(())
    })
    .await
}

pub async fn find_by_id(db: &Database, channel_id: &ChannelId) -> Result<Option<Channel>, AtriumError> {
    let id = channel_id.0.clone();
    db.read(move |conn| find(conn, &id)).await
}

pub async fn get(
    db: &Database,
    tenant_id: &TenantId,
    channel_id: &ChannelId,
) -> Result<Channel, AtriumError> {
    let tenant = tenant_id.0.clone();
    let id = channel_id.0.clone();
    db.read(move |conn| load(conn, &tenant, &id)).await
}

pub async fn list(db: &Database, tenant_id: &TenantId) -> Result<Vec<Channel>, AtriumError> {
    let tenant = tenant_id.0.clone();
    db.read(move |conn| {
        let sql = format!("SELECT {COLUMNS} FROM channels WHERE tenant_id = ?1 ORDER BY created_at, id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![tenant], row_to_channel)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

/// Applies a lifecycle transition after validating it.
pub async fn set_status(
    db: &Database,
    tenant_id: &TenantId,
    channel_id: &ChannelId,
    status: ChannelStatus,
) -> Result<Channel, AtriumError> {
    let tenant = tenant_id.0.clone();
    let id = channel_id.0.clone();
    db.transact(move |tx| {
        let current = load(tx, &tenant, &id)?;
        if current.status == status {
            return Ok(current);
        }
        if !current.status.can_transition_to(status) {
            return Err(AtriumError::InvalidTransition {
                entity: "channel",
                id,
                from: current.status.to_string(),
                to: status.to_string(),
            }
            .into());
        }
        tx.execute(
            "UPDATE channels SET status = ?2, consecutive_failures = 0, updated_at = ?3
             WHERE id = ?1",
            params![id, status.to_string(), now_ts()],
        )?;
        load(tx, &tenant, &id)
    })
    .await
}

/// Counts a rejected delivery. An `active` channel reaching `threshold`
/// consecutive failures moves to `error`.
pub async fn record_failure(
    db: &Database,
    channel_id: &ChannelId,
    threshold: i64,
) -> Result<ChannelStatus, AtriumError> {
    let id = channel_id.0.clone();
    db.transact(move |tx| {
        let Some(current) = find(tx, &id)? else {
            return Err(AtriumError::not_found("channel", id).into());
        };
        let failures = current.consecutive_failures + 1;
        let status = if failures >= threshold && current.status.can_transition_to(ChannelStatus::Error)
        {
            ChannelStatus::Error
        } else {
            current.status
        };
        tx.execute(
            "UPDATE channels SET consecutive_failures = ?2, status = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, failures, status.to_string(), now_ts()],
        )?;
        if status != current.status {
            tracing::warn!(channel_id = %id, failures, "channel moved to error after repeated delivery failures");
        }
        Ok(status)
    })
    .await
}

/// Resets the failure counter; the first verified delivery activates a
/// `configuring` channel.
pub async fn record_success(db: &Database, channel_id: &ChannelId) -> Result<(), AtriumError> {
    let id = channel_id.0.clone();
    db.transact(move |tx| {
        tx.execute(
            "UPDATE channels SET
                 consecutive_failures = 0,
                 status = CASE WHEN status = 'configuring' THEN 'active' ELSE status END,
                 updated_at = CASE WHEN consecutive_failures > 0 OR status = 'configuring'
                                   THEN ?2 ELSE updated_at END
             WHERE id = ?1",
            params![id, now_ts()],
        )?;
        Ok(())
    })
    .await
}
