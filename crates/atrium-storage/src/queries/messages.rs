// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message queries. Messages are append-only; only the delivery status and
//! provider id of outbound messages change after insert.

use atrium_core::AtriumError;
use atrium_core::types::{
    ChannelId, ContentType, ConversationId, DeliveryStatus, Direction, Message, MessageId,
    SenderKind, TenantId,
};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::enum_col;
use crate::database::{Database, TxResult};

const COLUMNS: &str = "id, tenant_id, conversation_id, channel_id, seq, direction, sender_kind,
     sender_id, content_type, content, media_url, delivery_status, external_id,
     provider_timestamp, created_at";

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        conversation_id: ConversationId(row.get(2)?),
        channel_id: ChannelId(row.get(3)?),
        seq: row.get(4)?,
        direction: enum_col(row, 5)?,
        sender_kind: enum_col(row, 6)?,
        sender_id: row.get(7)?,
        content_type: enum_col(row, 8)?,
        content: row.get(9)?,
        media_url: row.get(10)?,
        delivery_status: enum_col(row, 11)?,
        external_id: row.get(12)?,
        provider_timestamp: row.get(13)?,
        created_at: row.get(14)?,
    })
}

/// Fields of a message about to be appended. The sequence number is
/// assigned by [`append`].
pub(crate) struct NewMessage<'a> {
    pub tenant_id: &'a str,
    pub conversation_id: &'a str,
    pub channel_id: &'a str,
    pub direction: Direction,
    pub sender_kind: SenderKind,
    pub sender_id: Option<&'a str>,
    pub content_type: ContentType,
    pub content: &'a str,
    pub media_url: Option<&'a str>,
    pub delivery_status: DeliveryStatus,
    pub external_id: Option<&'a str>,
    pub provider_timestamp: Option<&'a str>,
    pub now: &'a str,
}

/// Appends a message with the next conversation-scoped sequence number and
/// updates the conversation's denormalized counters. Must run inside the
/// transaction that also applies any status change it triggers.
pub(crate) fn append(conn: &Connection, m: NewMessage<'_>) -> TxResult<Message> {
    let seq: i64 = conn.query_row(
        "UPDATE conversations SET
             last_seq = last_seq + 1,
             message_count = message_count + 1,
             last_message_at = ?2,
             updated_at = ?2
         WHERE id = ?1
         RETURNING last_seq",
        params![m.conversation_id, m.now],
        |row| row.get(0),
    )?;

    let id = MessageId::generate();
    conn.execute(
        "INSERT INTO messages (id, tenant_id, conversation_id, channel_id, seq, direction,
             sender_kind, sender_id, content_type, content, media_url, delivery_status,
             external_id, provider_timestamp, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            id.as_str(),
            m.tenant_id,
            m.conversation_id,
            m.channel_id,
            seq,
            m.direction.to_string(),
            m.sender_kind.to_string(),
            m.sender_id,
            m.content_type.to_string(),
            m.content,
            m.media_url,
            m.delivery_status.to_string(),
            m.external_id,
            m.provider_timestamp,
            m.now,
        ],
    )?;
    load(conn, m.tenant_id, id.as_str())
}

pub(crate) fn load(conn: &Connection, tenant_id: &str, message_id: &str) -> TxResult<Message> {
    let sql = format!("SELECT {COLUMNS} FROM messages WHERE id = ?1 AND tenant_id = ?2");
    conn.query_row(&sql, params![message_id, tenant_id], row_to_message)
        .optional()?
        .ok_or_else(|| AtriumError::not_found("message", message_id).into())
}

/// Whether an inbound message with this provider id already exists.
pub(crate) fn inbound_exists(conn: &Connection, channel_id: &str, external_id: &str) -> TxResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM messages
             WHERE channel_id = ?1 AND external_id = ?2 AND direction = 'inbound'",
            params![channel_id, external_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub async fn list(
    db: &Database,
    tenant_id: &TenantId,
    conversation_id: &ConversationId,
    after_seq: i64,
    limit: i64,
) -> Result<Vec<Message>, AtriumError> {
    let tenant = tenant_id.0.clone();
    let conv = conversation_id.0.clone();
    db.read(move |conn| {
        let sql = format!(
            "SELECT {COLUMNS} FROM messages
             WHERE tenant_id = ?1 AND conversation_id = ?2 AND seq > ?3
             ORDER BY seq ASC LIMIT ?4"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![tenant, conv, after_seq, limit], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

/// Moves an outbound message along `processed -> delivered | failed`.
pub async fn update_delivery_status(
    db: &Database,
    tenant_id: &TenantId,
    message_id: &MessageId,
    status: DeliveryStatus,
    external_id: Option<String>,
) -> Result<(), AtriumError> {
    let tenant = tenant_id.0.clone();
    let id = message_id.0.clone();
    db.transact(move |tx| {
        let message = load(tx, &tenant, &id)?;
        if message.direction != Direction::Outbound {
            return Err(AtriumError::InvalidTransition {
                entity: "message",
                id,
                from: message.delivery_status.to_string(),
                to: status.to_string(),
            }
            .into());
        }
        tx.execute(
            "UPDATE messages SET delivery_status = ?2, external_id = COALESCE(?3, external_id)
             WHERE id = ?1",
            params![id, status.to_string(), external_id],
        )?;
        if status == DeliveryStatus::Delivered && message.delivery_status != DeliveryStatus::Delivered
        {
            super::channels::bump_counters(tx, message.channel_id.as_str(), 0, 1, 0)?;
        }
        Ok(())
    })
    .await
}
