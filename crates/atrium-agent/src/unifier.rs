// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact unifier: maps a channel-specific sender to one canonical contact.
//!
//! Lookup order is exact identity, then a shared phone or email, then
//! create. Serialization per `(tenant, channel type, external id)` comes from
//! the storage unique constraint, never from an in-process lock.

use std::sync::Arc;

use atrium_core::traits::storage::{ContactMatch, ResolveContact, ResolvedContact};
use atrium_core::types::{CanonicalInbound, ChannelType};
use atrium_core::{AtriumError, StorageAdapter};
use atrium_ingest::normalize::{normalize_email, normalize_phone};
use tracing::debug;

pub struct ContactUnifier {
    storage: Arc<dyn StorageAdapter>,
}

impl ContactUnifier {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Resolves the sender of `record`. Any storage failure surfaces as
    /// [`AtriumError::UnresolvedContact`] so the inbound entry is retried.
    pub async fn resolve(
        &self,
        record: &CanonicalInbound,
        now: &str,
    ) -> Result<ResolvedContact, AtriumError> {
        let (phone, email) = identity_signals(record);
        let resolved = self
            .storage
            .resolve_contact(ResolveContact {
                tenant_id: record.tenant_id.clone(),
                channel_type: record.channel_type,
                external_id: record.external_contact_id.clone(),
                display_name: record.contact_name.clone(),
                phone,
                email,
                now: now.to_string(),
            })
            .await
            .map_err(|e| AtriumError::UnresolvedContact {
                external_id: record.external_contact_id.clone(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            })?;

        if resolved.matched == ContactMatch::Merged {
            metrics::counter!("atrium_contacts_merged_total").increment(1);
        }
        debug!(
            contact_id = %resolved.contact.id,
            matched = ?resolved.matched,
            "contact resolved"
        );
        Ok(resolved)
    }
}

/// Secondary identity signals used to merge contacts across channels.
/// Phone-based channels use the sender id itself when no phone is reported,
/// and email senders are their own address.
fn identity_signals(record: &CanonicalInbound) -> (Option<String>, Option<String>) {
    let phone = record
        .contact_phone
        .as_deref()
        .and_then(normalize_phone)
        .or_else(|| {
            record
                .channel_type
                .is_phone_based()
                .then(|| normalize_phone(&record.external_contact_id))
                .flatten()
        });
    let email = record
        .contact_email
        .as_deref()
        .and_then(normalize_email)
        .or_else(|| {
            (record.channel_type == ChannelType::Email)
                .then(|| normalize_email(&record.external_contact_id))
                .flatten()
        });
    (phone, email)
}
