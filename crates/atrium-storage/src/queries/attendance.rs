// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attendance item queries.
//!
//! The item's `status` column is the only point of mutual exclusion for
//! assignment: every move out of `waiting` is a conditional `UPDATE` whose
//! affected-row count decides the winner.

use atrium_core::AtriumError;
use atrium_core::traits::storage::{
    AssignOutcome, HandoffPlan, TransferRecord, TransferRequest,
};
use atrium_core::types::{
    AttendanceItem, AttendanceStatus, ChannelType, ConversationId, ConversationStatus, ItemId,
    OperatorId, QueueSnapshot, TenantId,
};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::{conversations, enum_col};
use crate::database::{Database, TxResult};

const COLUMNS: &str = "id, tenant_id, conversation_id, channel_type, priority, status,
     assigned_agent, handoff_reason, enqueued_at, sla_deadline, sla_breached, updated_at,
     resolved_at";

const ACTIVE_STATUSES: &str = "('waiting', 'assigned', 'in_progress', 'transferred')";

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<AttendanceItem> {
    Ok(AttendanceItem {
        id: ItemId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        conversation_id: ConversationId(row.get(2)?),
        channel_type: enum_col(row, 3)?,
        priority: row.get(4)?,
        status: enum_col(row, 5)?,
        assigned_agent: row.get::<_, Option<String>>(6)?.map(OperatorId),
        handoff_reason: enum_col(row, 7)?,
        enqueued_at: row.get(8)?,
        sla_deadline: row.get(9)?,
        sla_breached: row.get(10)?,
        updated_at: row.get(11)?,
        resolved_at: row.get(12)?,
    })
}

pub(crate) fn load(conn: &Connection, tenant_id: &str, item_id: &str) -> TxResult<AttendanceItem> {
    let sql = format!("SELECT {COLUMNS} FROM attendance_items WHERE id = ?1 AND tenant_id = ?2");
    conn.query_row(&sql, params![item_id, tenant_id], row_to_item)
        .optional()?
        .ok_or_else(|| AtriumError::not_found("attendance item", item_id).into())
}

/// The non-terminal item of a conversation, if any.
pub(crate) fn active_for(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
) -> TxResult<Option<AttendanceItem>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM attendance_items
         WHERE tenant_id = ?1 AND conversation_id = ?2 AND status IN {ACTIVE_STATUSES}"
    );
    Ok(conn
        .query_row(&sql, params![tenant_id, conversation_id], row_to_item)
        .optional()?)
}

/// Creates a `waiting` item. The partial unique index rejects a second
/// active item for the same conversation.
pub(crate) fn enqueue(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    channel_type: ChannelType,
    plan: &HandoffPlan,
    now: &str,
) -> TxResult<AttendanceItem> {
    if let Some(existing) = active_for(conn, tenant_id, conversation_id)? {
        return Ok(existing);
    }
    let id = ItemId::generate();
    conn.execute(
        "INSERT INTO attendance_items (id, tenant_id, conversation_id, channel_type, priority,
             status, handoff_reason, enqueued_at, sla_deadline, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'waiting', ?6, ?7, ?8, ?7)",
        params![
            id.as_str(),
            tenant_id,
            conversation_id,
            channel_type.to_string(),
            plan.priority,
            plan.reason.to_string(),
            now,
            plan.sla_deadline,
        ],
    )?;
    load(conn, tenant_id, id.as_str())
}

/// Moves an `assigned` or `transferred` item to `in_progress` once its
/// operator starts replying.
pub(crate) fn mark_in_progress(
    conn: &Connection,
    item: &AttendanceItem,
    now: &str,
) -> TxResult<Option<AttendanceItem>> {
    let changed = conn.execute(
        "UPDATE attendance_items SET status = 'in_progress', updated_at = ?2
         WHERE id = ?1 AND status IN ('assigned', 'transferred')",
        params![item.id.as_str(), now],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    Ok(Some(load(conn, item.tenant_id.as_str(), item.id.as_str())?))
}

/// Settles the active item when its conversation closes: `waiting` becomes
/// `abandoned`, anything held becomes `resolved`.
pub(crate) fn settle(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    now: &str,
) -> TxResult<Option<AttendanceItem>> {
    let Some(item) = active_for(conn, tenant_id, conversation_id)? else {
        return Ok(None);
    };
    let terminal = if item.status == AttendanceStatus::Waiting {
        AttendanceStatus::Abandoned
    } else {
        AttendanceStatus::Resolved
    };
    conn.execute(
        "UPDATE attendance_items SET status = ?2, resolved_at = ?3, updated_at = ?3 WHERE id = ?1",
        params![item.id.as_str(), terminal.to_string(), now],
    )?;
    Ok(Some(load(conn, tenant_id, item.id.as_str())?))
}

/// Compare-and-set `waiting -> assigned`, moving the conversation to
/// `in_attendance` in the same transaction.
pub async fn try_assign(
    db: &Database,
    tenant_id: &TenantId,
    item_id: &ItemId,
    operator_id: &OperatorId,
    now: &str,
) -> Result<AssignOutcome, AtriumError> {
    let tenant = tenant_id.0.clone();
    let id = item_id.0.clone();
    let operator = operator_id.0.clone();
    let now = now.to_string();
    db.transact(move |tx| {
        let changed = tx.execute(
            "UPDATE attendance_items SET status = 'assigned', assigned_agent = ?3, updated_at = ?4
             WHERE id = ?1 AND tenant_id = ?2 AND status = 'waiting'",
            params![id, tenant, operator, now],
        )?;
        if changed == 0 {
            // Distinguish a lost race from an unknown item.
            load(tx, &tenant, &id)?;
            return Ok(AssignOutcome::Conflict);
        }
        let item = load(tx, &tenant, &id)?;
        let conversation = conversations::assign_agent(
            tx,
            &tenant,
            item.conversation_id.as_str(),
            Some(&operator),
            ConversationStatus::InAttendance,
            "assigned",
            &now,
        )?;
        Ok(AssignOutcome::Assigned { item, conversation })
    })
    .await
}

/// Moves a held item to another operator, or back to `waiting`. The
/// original `enqueued_at` is preserved.
pub async fn transfer(db: &Database, req: TransferRequest) -> Result<TransferRecord, AtriumError> {
    db.transact(move |tx| {
        let tenant = req.tenant_id.as_str();
        let item = load(tx, tenant, req.item_id.as_str())?;
        if !item.status.is_held() {
            return Err(AtriumError::InvalidTransition {
                entity: "attendance item",
                id: item.id.0.clone(),
                from: item.status.to_string(),
                to: (if req.to.is_some() { "transferred" } else { "waiting" }).to_string(),
            }
            .into());
        }
        if let Some(from) = &req.from {
            if item.assigned_agent.as_ref() != Some(from) {
                return Err(AtriumError::AssignmentConflict {
                    item_id: item.id.0.clone(),
                }
                .into());
            }
        }

        let previous = item.assigned_agent.clone();
        let (status, conv_status, reason) = match &req.to {
            Some(_) => (
                AttendanceStatus::Transferred,
                ConversationStatus::InAttendance,
                "transferred",
            ),
            None => (
                AttendanceStatus::Waiting,
                ConversationStatus::WaitingHuman,
                "returned_to_queue",
            ),
        };
        let target = req.to.as_ref().map(|o| o.0.clone());
        let changed = tx.execute(
            "UPDATE attendance_items SET status = ?3, assigned_agent = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?2 AND assigned_agent IS ?6",
            params![
                item.id.as_str(),
                item.status.to_string(),
                status.to_string(),
                target,
                req.now,
                previous.as_ref().map(|o| o.0.clone()),
            ],
        )?;
        if changed == 0 {
            return Err(AtriumError::AssignmentConflict {
                item_id: item.id.0.clone(),
            }
            .into());
        }

        let conversation = conversations::assign_agent(
            tx,
            tenant,
            item.conversation_id.as_str(),
            target.as_deref(),
            conv_status,
            reason,
            &req.now,
        )?;
        Ok(TransferRecord {
            item: load(tx, tenant, item.id.as_str())?,
            conversation,
            previous_agent: previous,
        })
    })
    .await
}

/// Waiting items in service order (priority desc, enqueue time asc),
/// restricted to the given channel types.
pub async fn next_waiting(
    db: &Database,
    tenant_id: &TenantId,
    skills: &[ChannelType],
    limit: i64,
) -> Result<Vec<AttendanceItem>, AtriumError> {
    if skills.is_empty() {
        return Ok(Vec::new());
    }
    let mut values: Vec<Value> = vec![Value::Text(tenant_id.0.clone()), Value::Integer(limit)];
    values.extend(skills.iter().map(|s| Value::Text(s.to_string())));
    let placeholders = (3..3 + skills.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {COLUMNS} FROM attendance_items
         WHERE tenant_id = ?1 AND status = 'waiting' AND channel_type IN ({placeholders})
         ORDER BY priority DESC, enqueued_at ASC, id ASC
         LIMIT ?2"
    );
    db.read(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

pub async fn get(
    db: &Database,
    tenant_id: &TenantId,
    item_id: &ItemId,
) -> Result<AttendanceItem, AtriumError> {
    let tenant = tenant_id.0.clone();
    let id = item_id.0.clone();
    db.read(move |conn| load(conn, &tenant, &id)).await
}

pub async fn active(
    db: &Database,
    tenant_id: &TenantId,
    conversation_id: &ConversationId,
) -> Result<Option<AttendanceItem>, AtriumError> {
    let tenant = tenant_id.0.clone();
    let conv = conversation_id.0.clone();
    db.read(move |conn| active_for(conn, &tenant, &conv)).await
}

pub async fn list(
    db: &Database,
    tenant_id: &TenantId,
    status: Option<AttendanceStatus>,
) -> Result<Vec<AttendanceItem>, AtriumError> {
    let tenant = tenant_id.0.clone();
    let status = status.map(|s| s.to_string());
    db.read(move |conn| {
        let sql = format!(
            "SELECT {COLUMNS} FROM attendance_items
             WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY priority DESC, enqueued_at ASC, id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![tenant, status], row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

/// Flags overdue waiting items. Conversation status is left untouched.
pub async fn breach_overdue(db: &Database, now: &str) -> Result<Vec<AttendanceItem>, AtriumError> {
    let now = now.to_string();
    db.transact(move |tx| {
        let sql = format!(
            "UPDATE attendance_items SET sla_breached = 1, updated_at = ?1
             WHERE status = 'waiting' AND sla_breached = 0 AND sla_deadline <= ?1
             RETURNING {COLUMNS}"
        );
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt
            .query_map(params![now], row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

pub async fn snapshot(db: &Database, tenant_id: &TenantId) -> Result<QueueSnapshot, AtriumError> {
    let tenant = tenant_id.0.clone();
    db.read(move |conn| {
        let mut snapshot = QueueSnapshot::default();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM attendance_items
             WHERE tenant_id = ?1 GROUP BY status",
        )?;
        let counts = stmt
            .query_map(params![tenant], |row| {
                Ok((enum_col::<AttendanceStatus>(row, 0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (status, count) in counts {
            match status {
                AttendanceStatus::Waiting => snapshot.waiting = count,
                AttendanceStatus::Assigned => snapshot.assigned = count,
                AttendanceStatus::InProgress => snapshot.in_progress = count,
                AttendanceStatus::Transferred => snapshot.transferred = count,
                AttendanceStatus::Resolved | AttendanceStatus::Abandoned => {}
            }
        }
        let (breached, oldest): (i64, Option<String>) = conn.query_row(
            "SELECT COALESCE(SUM(sla_breached), 0), MIN(enqueued_at) FROM attendance_items
             WHERE tenant_id = ?1 AND status = 'waiting'",
            params![tenant],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        snapshot.breached = breached;
        snapshot.oldest_waiting_since = oldest;
        Ok(snapshot)
    })
    .await
}
