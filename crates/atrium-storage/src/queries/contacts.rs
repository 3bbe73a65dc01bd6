// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact unification queries.
//!
//! Resolution is serialized by the `contact_identities` primary key
//! `(tenant_id, channel_type, external_id)`: aliases are inserted with
//! `ON CONFLICT DO NOTHING` and re-read, so two concurrent first contacts
//! for the same external id always converge on one contact.

use atrium_core::AtriumError;
use atrium_core::traits::storage::{ContactMatch, ResolveContact, ResolvedContact};
use atrium_core::types::{Contact, ContactId, ContactIdentity, ContactStatus, TenantId};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::enum_col;
use crate::database::{Database, TxResult};

const COLUMNS: &str = "id, tenant_id, name, phone, email, status, lead_score,
     total_conversations, total_purchases, created_at, updated_at";

fn row_to_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: ContactId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        name: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        status: enum_col(row, 5)?,
        lead_score: row.get(6)?,
        total_conversations: row.get(7)?,
        total_purchases: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub(crate) fn load(conn: &Connection, tenant_id: &str, contact_id: &str) -> TxResult<Contact> {
    let sql = format!("SELECT {COLUMNS} FROM contacts WHERE id = ?1 AND tenant_id = ?2");
    conn.query_row(&sql, params![contact_id, tenant_id], row_to_contact)
        .optional()?
        .ok_or_else(|| AtriumError::not_found("contact", contact_id).into())
}

pub(crate) fn bump_conversations(conn: &Connection, contact_id: &str, now: &str) -> TxResult<()> {
    conn.execute(
        "UPDATE contacts SET total_conversations = total_conversations + 1, updated_at = ?2
         WHERE id = ?1",
        params![contact_id, now],
    )?;
    Ok(())
}

fn identity_owner(conn: &Connection, req: &ResolveContact) -> TxResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT contact_id FROM contact_identities
             WHERE tenant_id = ?1 AND channel_type = ?2 AND external_id = ?3",
            params![
                req.tenant_id.as_str(),
                req.channel_type.to_string(),
                req.external_id
            ],
            |row| row.get(0),
        )
        .optional()?)
}

/// Secondary lookup by phone, then email.
fn secondary_match(conn: &Connection, req: &ResolveContact) -> TxResult<Option<String>> {
    let tenant = req.tenant_id.as_str();
    if let Some(phone) = &req.phone {
        let hit: Option<String> = conn
            .query_row(
                "SELECT id FROM contacts WHERE tenant_id = ?1 AND phone = ?2
                 ORDER BY created_at, id LIMIT 1",
                params![tenant, phone],
                |row| row.get(0),
            )
            .optional()?;
        if hit.is_some() {
            return Ok(hit);
        }
    }
    if let Some(email) = &req.email {
        return Ok(conn
            .query_row(
                "SELECT id FROM contacts WHERE tenant_id = ?1 AND email = ?2
                 ORDER BY created_at, id LIMIT 1",
                params![tenant, email],
                |row| row.get(0),
            )
            .optional()?);
    }
    Ok(None)
}

/// Inserts the alias. Returns false if another writer already owns it.
fn insert_identity(conn: &Connection, req: &ResolveContact, contact_id: &str) -> TxResult<bool> {
    let changed = conn.execute(
        "INSERT INTO contact_identities (tenant_id, channel_type, external_id, contact_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (tenant_id, channel_type, external_id) DO NOTHING",
        params![
            req.tenant_id.as_str(),
            req.channel_type.to_string(),
            req.external_id,
            contact_id,
            req.now
        ],
    )?;
    Ok(changed == 1)
}

/// Additive enrichment: only fills fields that are still empty.
fn enrich(conn: &Connection, contact_id: &str, req: &ResolveContact) -> TxResult<()> {
    conn.execute(
        "UPDATE contacts SET
             phone = COALESCE(phone, ?2),
             email = COALESCE(email, ?3),
             name = CASE WHEN name = '' AND ?4 IS NOT NULL THEN ?4 ELSE name END,
             updated_at = ?5
         WHERE id = ?1",
        params![contact_id, req.phone, req.email, req.display_name, req.now],
    )?;
    Ok(())
}

pub(crate) fn resolve_in(conn: &Connection, req: &ResolveContact) -> TxResult<ResolvedContact> {
    let tenant = req.tenant_id.as_str();

    if let Some(contact_id) = identity_owner(conn, req)? {
        enrich(conn, &contact_id, req)?;
        return Ok(ResolvedContact {
            contact: load(conn, tenant, &contact_id)?,
            matched: ContactMatch::Identity,
        });
    }

    if let Some(contact_id) = secondary_match(conn, req)? {
        if insert_identity(conn, req, &contact_id)? {
            enrich(conn, &contact_id, req)?;
            return Ok(ResolvedContact {
                contact: load(conn, tenant, &contact_id)?,
                matched: ContactMatch::Merged,
            });
        }
    } else {
        let contact_id = ContactId::generate();
        let name = req
            .display_name
            .clone()
            .unwrap_or_else(|| req.external_id.clone());
        conn.execute(
            "INSERT INTO contacts (id, tenant_id, name, phone, email, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                contact_id.as_str(),
                tenant,
                name,
                req.phone,
                req.email,
                ContactStatus::Lead.to_string(),
                req.now
            ],
        )?;
        if insert_identity(conn, req, contact_id.as_str())? {
            return Ok(ResolvedContact {
                contact: load(conn, tenant, contact_id.as_str())?,
                matched: ContactMatch::Created,
            });
        }
        conn.execute("DELETE FROM contacts WHERE id = ?1", params![contact_id.as_str()])?;
    }

    // Lost the alias to a concurrent writer: the stored owner wins.
    match identity_owner(conn, req)? {
        Some(contact_id) => Ok(ResolvedContact {
            contact: load(conn, tenant, &contact_id)?,
            matched: ContactMatch::Identity,
        }),
        None => Err(AtriumError::UnresolvedContact {
            external_id: req.external_id.clone(),
            message: "alias vanished during resolution".into(),
            source: None,
        }
        .into()),
    }
}

pub async fn resolve(db: &Database, req: ResolveContact) -> Result<ResolvedContact, AtriumError> {
    db.transact(move |tx| resolve_in(tx, &req)).await
}

pub async fn get(
    db: &Database,
    tenant_id: &TenantId,
    contact_id: &ContactId,
) -> Result<Contact, AtriumError> {
    let tenant = tenant_id.0.clone();
    let id = contact_id.0.clone();
    db.read(move |conn| load(conn, &tenant, &id)).await
}

pub async fn list(
    db: &Database,
    tenant_id: &TenantId,
    limit: i64,
    offset: i64,
) -> Result<Vec<Contact>, AtriumError> {
    let tenant = tenant_id.0.clone();
    db.read(move |conn| {
        let sql = format!(
            "SELECT {COLUMNS} FROM contacts WHERE tenant_id = ?1
             ORDER BY updated_at DESC, id LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![tenant, limit, offset], row_to_contact)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

pub async fn identities(
    db: &Database,
    tenant_id: &TenantId,
    contact_id: &ContactId,
) -> Result<Vec<ContactIdentity>, AtriumError> {
    let tenant = tenant_id.0.clone();
    let id = contact_id.0.clone();
    db.read(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT tenant_id, contact_id, channel_type, external_id, created_at
             FROM contact_identities WHERE tenant_id = ?1 AND contact_id = ?2
             ORDER BY created_at, channel_type",
        )?;
        let rows = stmt
            .query_map(params![tenant, id], |row| {
                Ok(ContactIdentity {
                    tenant_id: TenantId(row.get(0)?),
                    contact_id: ContactId(row.get(1)?),
                    channel_type: enum_col(row, 2)?,
                    external_id: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

pub async fn update_lead_score(
    db: &Database,
    tenant_id: &TenantId,
    contact_id: &ContactId,
    score: f64,
    qualify_threshold: Option<f64>,
) -> Result<Contact, AtriumError> {
    let tenant = tenant_id.0.clone();
    let id = contact_id.0.clone();
    db.transact(move |tx| {
        let changed = tx.execute(
            "UPDATE contacts SET
                 lead_score = ?3,
                 status = CASE WHEN status = 'lead' AND ?4 IS NOT NULL AND ?3 >= ?4
                               THEN 'qualified' ELSE status END,
                 updated_at = ?5
             WHERE id = ?1 AND tenant_id = ?2",
            params![id, tenant, score, qualify_threshold, atrium_core::types::now_ts()],
        )?;
        if changed == 0 {
            return Err(AtriumError::not_found("contact", id).into());
        }
        load(tx, &tenant, &id)
    })
    .await
}
