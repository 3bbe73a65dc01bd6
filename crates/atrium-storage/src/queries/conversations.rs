// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation state machine persistence.
//!
//! Every status change is journaled in `conversation_transitions` inside the
//! same transaction as the message append (or queue mutation) that caused
//! it.

use atrium_core::AtriumError;
use atrium_core::traits::storage::{
    CloseRecord, CloseRequest, ConversationTransition, HandoffPlan, HandoffRecord,
    HandoffRequest, InboundAppend, InboundOutcome, InboundRecord, OutboundAppend,
    OutboundRecord,
};
use atrium_core::types::{
    AttendanceItem, ChannelId, ChannelType, ContactId, ContentType, Conversation,
    ConversationId, ConversationStatus, DeliveryStatus, Direction, MessageId, OperatorId,
    SenderKind, TenantId,
};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::messages::NewMessage;
use super::{attendance, channels, contacts, enum_col, messages, opt_enum_col};
use crate::database::{Database, TxResult};

const COLUMNS: &str = "id, tenant_id, channel_id, contact_id, status, assigned_agent,
     message_count, last_seq, last_message_at, idle_since, bot_failures, cycle, created_at,
     updated_at, closed_at";

fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: ConversationId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        channel_id: ChannelId(row.get(2)?),
        contact_id: ContactId(row.get(3)?),
        status: enum_col(row, 4)?,
        assigned_agent: row.get::<_, Option<String>>(5)?.map(OperatorId),
        message_count: row.get(6)?,
        last_seq: row.get(7)?,
        last_message_at: row.get(8)?,
        idle_since: row.get(9)?,
        bot_failures: row.get(10)?,
        cycle: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        closed_at: row.get(14)?,
    })
}

pub(crate) fn load(conn: &Connection, tenant_id: &str, conversation_id: &str) -> TxResult<Conversation> {
    let sql = format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1 AND tenant_id = ?2");
    conn.query_row(&sql, params![conversation_id, tenant_id], row_to_conversation)
        .optional()?
        .ok_or_else(|| AtriumError::not_found("conversation", conversation_id).into())
}

/// Latest non-archived conversation between a contact and a channel.
fn find_route(
    conn: &Connection,
    tenant_id: &str,
    channel_id: &str,
    contact_id: &str,
) -> TxResult<Option<Conversation>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM conversations
         WHERE tenant_id = ?1 AND channel_id = ?2 AND contact_id = ?3 AND status != 'archived'
         ORDER BY created_at DESC, id DESC LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, params![tenant_id, channel_id, contact_id], row_to_conversation)
        .optional()?)
}

#[allow(clippy::too_many_arguments)]
fn journal(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    from: Option<ConversationStatus>,
    to: ConversationStatus,
    reason: &str,
    message_id: Option<&str>,
    now: &str,
) -> TxResult<()> {
    conn.execute(
        "INSERT INTO conversation_transitions
             (tenant_id, conversation_id, from_status, to_status, reason, message_id, at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            tenant_id,
            conversation_id,
            from.map(|s| s.to_string()),
            to.to_string(),
            reason,
            message_id,
            now
        ],
    )?;
    Ok(())
}

fn set_status(
    conn: &Connection,
    conv: &Conversation,
    to: ConversationStatus,
    reason: &str,
    message_id: Option<&str>,
    now: &str,
) -> TxResult<()> {
    conn.execute(
        "UPDATE conversations SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![conv.id.as_str(), to.to_string(), now],
    )?;
    journal(
        conn,
        conv.tenant_id.as_str(),
        conv.id.as_str(),
        Some(conv.status),
        to,
        reason,
        message_id,
        now,
    )
}

/// Sets the conversation's agent and status in one step. Every move into
/// `in_attendance` restarts the idle timer.
pub(crate) fn assign_agent(
    conn: &Connection,
    tenant_id: &str,
    conversation_id: &str,
    agent: Option<&str>,
    status: ConversationStatus,
    reason: &str,
    now: &str,
) -> TxResult<Conversation> {
    let conv = load(conn, tenant_id, conversation_id)?;
    let idle_since = (status == ConversationStatus::InAttendance).then_some(now);
    conn.execute(
        "UPDATE conversations SET assigned_agent = ?2, idle_since = ?3, updated_at = ?4
         WHERE id = ?1",
        params![conversation_id, agent, idle_since, now],
    )?;
    set_status(conn, &conv, status, reason, None, now)?;
    load(conn, tenant_id, conversation_id)
}

fn apply_handoff(
    conn: &Connection,
    conv: &Conversation,
    channel_type: ChannelType,
    plan: &HandoffPlan,
    message_id: &str,
    now: &str,
) -> TxResult<AttendanceItem> {
    conn.execute(
        "UPDATE conversations SET bot_failures = 0 WHERE id = ?1",
        params![conv.id.as_str()],
    )?;
    set_status(
        conn,
        conv,
        ConversationStatus::WaitingHuman,
        &format!("handoff:{}", plan.reason),
        Some(message_id),
        now,
    )?;
    attendance::enqueue(
        conn,
        conv.tenant_id.as_str(),
        conv.id.as_str(),
        channel_type,
        plan,
        now,
    )
}

fn is_bot_handled(status: ConversationStatus) -> bool {
    matches!(status, ConversationStatus::Open | ConversationStatus::WaitingBot)
}

fn invalid(conv: &Conversation, to: &str) -> AtriumError {
    AtriumError::InvalidTransition {
        entity: "conversation",
        id: conv.id.0.clone(),
        from: conv.status.to_string(),
        to: to.to_string(),
    }
}

/// Appends a canonical inbound message, creating or re-opening the
/// conversation as needed, and applies the pre-computed handoff if the
/// conversation is still under bot handling.
pub async fn record_inbound(db: &Database, append: InboundAppend) -> Result<InboundOutcome, AtriumError> {
    db.transact(move |tx| {
        let rec = &append.record;
        let now = append.now.as_str();
        let tenant = rec.tenant_id.as_str();
        let channel_id = rec.channel_id.as_str();

        if messages::inbound_exists(tx, channel_id, &rec.external_message_id)? {
            return Ok(InboundOutcome::Duplicate);
        }
        channels::load(tx, tenant, channel_id)?;

        let mut created = false;
        let mut reopened = false;
        let conv = match find_route(tx, tenant, channel_id, append.contact_id.as_str())? {
            Some(conv) if conv.status == ConversationStatus::Closed => {
                tx.execute(
                    "UPDATE conversations SET assigned_agent = NULL, bot_failures = 0,
                         idle_since = NULL, closed_at = NULL, cycle = cycle + 1
                     WHERE id = ?1",
                    params![conv.id.as_str()],
                )?;
                set_status(tx, &conv, ConversationStatus::WaitingBot, "reopened", None, now)?;
                contacts::bump_conversations(tx, append.contact_id.as_str(), now)?;
                channels::bump_counters(tx, channel_id, 0, 0, 1)?;
                reopened = true;
                load(tx, tenant, conv.id.as_str())?
            }
            Some(conv) => conv,
            None => {
                let id = ConversationId::generate();
                tx.execute(
                    "INSERT INTO conversations (id, tenant_id, channel_id, contact_id, status,
                         created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, 'open', ?5, ?5)",
                    params![id.as_str(), tenant, channel_id, append.contact_id.as_str(), now],
                )?;
                journal(tx, tenant, id.as_str(), None, ConversationStatus::Open, "created", None, now)?;
                let opened = load(tx, tenant, id.as_str())?;
                set_status(tx, &opened, ConversationStatus::WaitingBot, "bot_routing", None, now)?;
                contacts::bump_conversations(tx, append.contact_id.as_str(), now)?;
                channels::bump_counters(tx, channel_id, 0, 0, 1)?;
                created = true;
                load(tx, tenant, id.as_str())?
            }
        };

        let message = messages::append(
            tx,
            NewMessage {
                tenant_id: tenant,
                conversation_id: conv.id.as_str(),
                channel_id,
                direction: Direction::Inbound,
                sender_kind: SenderKind::Contact,
                sender_id: Some(&rec.external_contact_id),
                content_type: rec.content_type,
                content: &rec.content,
                media_url: rec.media_url.as_deref(),
                delivery_status: DeliveryStatus::Received,
                external_id: Some(&rec.external_message_id),
                provider_timestamp: rec.provider_timestamp.as_deref(),
                now,
            },
        )?;
        channels::bump_counters(tx, channel_id, 1, 0, 0)?;

        if conv.status == ConversationStatus::InAttendance {
            tx.execute(
                "UPDATE conversations SET idle_since = ?2 WHERE id = ?1",
                params![conv.id.as_str(), now],
            )?;
        }

        let handoff_item = match &append.handoff {
            Some(plan) if is_bot_handled(conv.status) => Some(apply_handoff(
                tx,
                &conv,
                rec.channel_type,
                plan,
                message.id.as_str(),
                now,
            )?),
            _ => None,
        };

        Ok(InboundOutcome::Recorded(Box::new(InboundRecord {
            conversation: load(tx, tenant, conv.id.as_str())?,
            message,
            created,
            reopened,
            handoff_item,
        })))
    })
    .await
}

/// Appends a bot, agent or system message.
///
/// Bot replies are accepted only while the conversation is under bot
/// handling; agent replies only from the assigned operator while
/// `in_attendance`.
pub async fn append_outbound(db: &Database, append: OutboundAppend) -> Result<OutboundRecord, AtriumError> {
    db.transact(move |tx| {
        let tenant = append.tenant_id.as_str();
        let now = append.now.as_str();
        let conv = load(tx, tenant, append.conversation_id.as_str())?;
        if !conv.status.is_live() {
            return Err(invalid(&conv, "append").into());
        }

        let mut item = None;
        match append.sender_kind {
            SenderKind::Bot => {
                if !is_bot_handled(conv.status) {
                    return Err(invalid(&conv, "bot_reply").into());
                }
                tx.execute(
                    "UPDATE conversations SET bot_failures = CASE WHEN ?2 THEN bot_failures + 1 ELSE 0 END
                     WHERE id = ?1",
                    params![conv.id.as_str(), append.fallback],
                )?;
            }
            SenderKind::Agent => {
                let sender = append.sender_id.as_deref();
                if conv.status != ConversationStatus::InAttendance
                    || conv.assigned_agent.as_ref().map(|a| a.as_str()) != sender
                {
                    return Err(AtriumError::AssignmentConflict {
                        item_id: conv.id.0.clone(),
                    }
                    .into());
                }
                if let Some(active) = attendance::active_for(tx, tenant, conv.id.as_str())? {
                    item = attendance::mark_in_progress(tx, &active, now)?;
                }
            }
            SenderKind::System => {}
            SenderKind::Contact => {
                return Err(AtriumError::Internal(
                    "contact messages are recorded through record_inbound".into(),
                )
                .into());
            }
        }

        let content_type = if append.sender_kind == SenderKind::System {
            ContentType::SystemEvent
        } else {
            append.content_type
        };
        let message = messages::append(
            tx,
            NewMessage {
                tenant_id: tenant,
                conversation_id: conv.id.as_str(),
                channel_id: conv.channel_id.as_str(),
                direction: Direction::Outbound,
                sender_kind: append.sender_kind,
                sender_id: append.sender_id.as_deref(),
                content_type,
                content: &append.content,
                media_url: append.media_url.as_deref(),
                delivery_status: DeliveryStatus::Processed,
                external_id: None,
                provider_timestamp: None,
                now,
            },
        )?;

        if let Some(plan) = &append.handoff {
            if append.sender_kind == SenderKind::Bot {
                let channel = channels::load(tx, tenant, conv.channel_id.as_str())?;
                item = Some(apply_handoff(
                    tx,
                    &conv,
                    channel.channel_type,
                    plan,
                    message.id.as_str(),
                    now,
                )?);
            }
        }

        Ok(OutboundRecord {
            conversation: load(tx, tenant, conv.id.as_str())?,
            message,
            item,
        })
    })
    .await
}

/// Moves a bot-handled conversation to the human queue, recording a
/// system-event message as the trigger.
pub async fn handoff(db: &Database, req: HandoffRequest) -> Result<HandoffRecord, AtriumError> {
    db.transact(move |tx| {
        let tenant = req.tenant_id.as_str();
        let now = req.now.as_str();
        let conv = load(tx, tenant, req.conversation_id.as_str())?;
        if !is_bot_handled(conv.status) {
            return Err(invalid(&conv, "waiting_human").into());
        }
        let channel = channels::load(tx, tenant, conv.channel_id.as_str())?;
        let message = messages::append(
            tx,
            NewMessage {
                tenant_id: tenant,
                conversation_id: conv.id.as_str(),
                channel_id: conv.channel_id.as_str(),
                direction: Direction::Outbound,
                sender_kind: SenderKind::System,
                sender_id: None,
                content_type: ContentType::SystemEvent,
                content: &format!("handoff:{}", req.plan.reason),
                media_url: None,
                delivery_status: DeliveryStatus::Processed,
                external_id: None,
                provider_timestamp: None,
                now,
            },
        )?;
        let item = apply_handoff(tx, &conv, channel.channel_type, &req.plan, message.id.as_str(), now)?;
        Ok(HandoffRecord {
            conversation: load(tx, tenant, conv.id.as_str())?,
            item,
            message,
        })
    })
    .await
}

/// Closes a conversation, settling its active attendance item.
pub async fn close(db: &Database, req: CloseRequest) -> Result<Option<CloseRecord>, AtriumError> {
    db.transact(move |tx| {
        let tenant = req.tenant_id.as_str();
        let now = req.now.as_str();
        let conv = load(tx, tenant, req.conversation_id.as_str())?;

        if let Some(cutoff) = &req.idle_before {
            let idle = conv.status == ConversationStatus::InAttendance
                && conv.idle_since.as_deref().is_some_and(|since| since <= cutoff.as_str());
            if !idle {
                return Ok(None);
            }
        } else if !conv.status.is_live() {
            return Err(invalid(&conv, "closed").into());
        }

        let message = messages::append(
            tx,
            NewMessage {
                tenant_id: tenant,
                conversation_id: conv.id.as_str(),
                channel_id: conv.channel_id.as_str(),
                direction: Direction::Outbound,
                sender_kind: SenderKind::System,
                sender_id: None,
                content_type: ContentType::SystemEvent,
                content: &format!("closed:{}", req.reason),
                media_url: None,
                delivery_status: DeliveryStatus::Processed,
                external_id: None,
                provider_timestamp: None,
                now,
            },
        )?;
        tx.execute(
            "UPDATE conversations SET closed_at = ?2, idle_since = NULL WHERE id = ?1",
            params![conv.id.as_str(), now],
        )?;
        set_status(
            tx,
            &conv,
            ConversationStatus::Closed,
            &format!("closed:{}", req.reason),
            Some(message.id.as_str()),
            now,
        )?;
        let item = attendance::settle(tx, tenant, conv.id.as_str(), now)?;
        channels::bump_counters(tx, conv.channel_id.as_str(), 0, 0, -1)?;

        Ok(Some(CloseRecord {
            conversation: load(tx, tenant, conv.id.as_str())?,
            item,
            message,
        }))
    })
    .await
}

pub async fn get(
    db: &Database,
    tenant_id: &TenantId,
    conversation_id: &ConversationId,
) -> Result<Conversation, AtriumError> {
    let tenant = tenant_id.0.clone();
    let id = conversation_id.0.clone();
    db.read(move |conn| load(conn, &tenant, &id)).await
}

pub async fn list(
    db: &Database,
    tenant_id: &TenantId,
    status: Option<ConversationStatus>,
    limit: i64,
) -> Result<Vec<Conversation>, AtriumError> {
    let tenant = tenant_id.0.clone();
    let status = status.map(|s| s.to_string());
    db.read(move |conn| {
        let sql = format!(
            "SELECT {COLUMNS} FROM conversations
             WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY updated_at DESC, id LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![tenant, status, limit], row_to_conversation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

pub async fn in_attendance(db: &Database) -> Result<Vec<Conversation>, AtriumError> {
    db.read(|conn| {
        let sql = format!(
            "SELECT {COLUMNS} FROM conversations WHERE status = 'in_attendance'
             ORDER BY idle_since ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], row_to_conversation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

pub async fn transitions(
    db: &Database,
    tenant_id: &TenantId,
    conversation_id: &ConversationId,
) -> Result<Vec<ConversationTransition>, AtriumError> {
    let tenant = tenant_id.0.clone();
    let id = conversation_id.0.clone();
    db.read(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT conversation_id, from_status, to_status, reason, message_id, at
             FROM conversation_transitions
             WHERE tenant_id = ?1 AND conversation_id = ?2 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![tenant, id], |row| {
                Ok(ConversationTransition {
                    conversation_id: ConversationId(row.get(0)?),
                    from_status: opt_enum_col(row, 1)?,
                    to_status: enum_col(row, 2)?,
                    reason: row.get(3)?,
                    message_id: row.get::<_, Option<String>>(4)?.map(MessageId),
                    at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}
