// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ingestion gateway: locate channel, verify, normalize, accept.
//!
//! Nothing past [`IngestionGateway::ingest`] runs on the provider's request
//! path. Accepted records sit in the durable inbound queue until a worker
//! hands them to the orchestrator, so downstream failures never surface in
//! the webhook response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use atrium_config::model::IngestionConfig;
use atrium_core::traits::storage::AcceptOutcome;
use atrium_core::types::{CanonicalInbound, Channel, ChannelId, ChannelStatus, ChannelType, now_ts};
use atrium_core::{AtriumError, StorageAdapter, WebhookAdapter, WebhookRequest};
use tracing::{debug, info, instrument, warn};

use crate::adapters::AdapterRegistry;

/// What a webhook delivery produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Inbound queue ids of newly accepted records.
    pub accepted: Vec<i64>,
    /// Records whose external message id was already accepted.
    pub duplicates: usize,
    /// The delivery was authentic but could not be normalized. It is
    /// acknowledged so the provider does not redeliver it.
    pub dropped: bool,
}

pub struct IngestionGateway {
    storage: Arc<dyn StorageAdapter>,
    adapters: AdapterRegistry,
    config: IngestionConfig,
}

impl IngestionGateway {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        adapters: AdapterRegistry,
        config: IngestionConfig,
    ) -> Self {
        Self {
            storage,
            adapters,
            config,
        }
    }

    async fn locate(
        &self,
        channel_type: ChannelType,
        channel_id: &ChannelId,
    ) -> Result<(Channel, Arc<dyn WebhookAdapter>), AtriumError> {
        let channel = self
            .storage
            .find_channel(channel_id)
            .await?
            .filter(|c| c.channel_type == channel_type)
            .ok_or_else(|| AtriumError::not_found("channel", channel_id.as_str()))?;
        let adapter = self
            .adapters
            .get(channel_type)
            .ok_or_else(|| AtriumError::not_found("webhook adapter", channel_type.to_string()))?;
        Ok((channel, adapter))
    }

    /// Handles one provider delivery. The caller acknowledges with 2xx on
    /// `Ok`, including when every record was a duplicate.
    #[instrument(skip_all, fields(channel_type = %channel_type, channel_id = %channel_id))]
    pub async fn ingest(
        &self,
        channel_type: ChannelType,
        channel_id: &ChannelId,
        request: WebhookRequest,
    ) -> Result<IngestReport, AtriumError> {
        let (channel, adapter) = self.locate(channel_type, channel_id).await?;
        if !channel.status.accepts_deliveries() {
            record_outcome(channel_type, "unavailable");
            return Err(AtriumError::ChannelUnavailable {
                channel_id: channel.id.to_string(),
                status: channel.status.to_string(),
            });
        }

        let normalized = match self.verify_and_normalize(channel.clone(), adapter, request).await {
            Ok(normalized) => normalized,
            Err(e) => {
                let outcome = match &e {
                    AtriumError::Authenticity { .. } => "rejected",
                    AtriumError::Timeout { .. } => "timeout",
                    _ => "error",
                };
                record_outcome(channel_type, outcome);
                if matches!(e, AtriumError::Authenticity { .. }) {
                    self.note_failure(&channel).await;
                }
                return Err(e);
            }
        };

        if channel.consecutive_failures > 0 || channel.status == ChannelStatus::Configuring {
            self.storage.record_delivery_success(&channel.id).await?;
        }

        let records = match normalized {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "authentic delivery could not be normalized, dropping it");
                record_outcome(channel_type, "malformed");
                return Ok(IngestReport {
                    dropped: true,
                    ..IngestReport::default()
                });
            }
        };

        let now = now_ts();
        let mut report = IngestReport::default();
        for record in &records {
            match self
                .storage
                .accept_inbound(record, i64::from(self.config.max_attempts), &now)
                .await?
            {
                AcceptOutcome::Accepted(id) => report.accepted.push(id),
                AcceptOutcome::Duplicate => {
                    debug!(external_id = %record.external_message_id, "duplicate delivery acknowledged");
                    report.duplicates += 1;
                }
            }
        }

        record_outcome(channel_type, if report.accepted.is_empty() { "noop" } else { "accepted" });
        if report.duplicates > 0 {
            metrics::counter!("atrium_webhook_duplicates_total", "channel" => channel_type.to_string())
                .increment(report.duplicates as u64);
        }
        debug!(accepted = report.accepted.len(), duplicates = report.duplicates, "webhook ingested");
        Ok(report)
    }

    /// Runs verification and normalization off the async workers, bounded
    /// by the verification timeout. The outer error is a failed
    /// verification; the inner one a failed normalization of an authentic
    /// delivery.
    async fn verify_and_normalize(
        &self,
        channel: Channel,
        adapter: Arc<dyn WebhookAdapter>,
        request: WebhookRequest,
    ) -> Result<Result<Vec<CanonicalInbound>, AtriumError>, AtriumError> {
        let duration = Duration::from_millis(self.config.verify_timeout_ms);
        let task = tokio::task::spawn_blocking(move || {
            adapter.verify(&channel, &request)?;
            Ok(adapter.normalize(&channel, &request))
        });
        match tokio::time::timeout(duration, task).await {
            Err(_) => Err(AtriumError::Timeout { duration }),
            Ok(Err(join)) => Err(AtriumError::Internal(format!("webhook verification task failed: {join}"))),
            Ok(Ok(result)) => result,
        }
    }

    async fn note_failure(&self, channel: &Channel) {
        let threshold = i64::from(self.config.max_consecutive_failures);
        match self.storage.record_delivery_failure(&channel.id, threshold).await {
            Ok(ChannelStatus::Error) if channel.status != ChannelStatus::Error => {
                info!(channel_id = %channel.id, "channel disabled after repeated delivery failures");
            }
            Ok(_) => {}
            Err(e) => warn!(channel_id = %channel.id, error = %e, "failed to record delivery failure"),
        }
    }

    /// Answers a provider subscription handshake.
    pub async fn handshake(
        &self,
        channel_type: ChannelType,
        channel_id: &ChannelId,
        query: &HashMap<String, String>,
    ) -> Result<String, AtriumError> {
        let (channel, adapter) = self.locate(channel_type, channel_id).await?;
        adapter
            .handshake(&channel, query)
            .ok_or_else(|| AtriumError::Authenticity {
                channel_id: channel.id.to_string(),
                reason: "handshake rejected".into(),
            })
    }
}

fn record_outcome(channel_type: ChannelType, outcome: &'static str) {
    metrics::counter!(
        "atrium_webhooks_total",
        "channel" => channel_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
