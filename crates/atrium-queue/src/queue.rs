// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations invoked by operators and by the orchestrator.

use std::sync::Arc;

use atrium_bus::EventBus;
use atrium_config::model::AtriumConfig;
use atrium_core::traits::auth::Principal;
use atrium_core::traits::storage::{
    AssignOutcome, CloseRecord, CloseRequest, HandoffPlan, HandoffRecord, HandoffRequest,
    TransferRecord, TransferRequest,
};
use atrium_core::types::{
    AttendanceItem, CloseReason, ConversationId, HandoffReason, ItemId, OperatorId,
    QueueSnapshot, TenantId, format_ts,
};
use atrium_core::{AtriumError, BusEvent, OperatorEvent, StorageAdapter};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

/// Rounds of candidate fetching before `pull_next` gives up on a hot queue.
const PULL_ROUNDS: usize = 3;
const PULL_BATCH: i64 = 5;

/// Result of an explicit assignment request.
#[derive(Debug, Clone)]
pub enum AssignResult {
    Assigned(AttendanceItem),
    /// Another operator won the item. `next` is the item this operator
    /// would be served now, if any; it is not reserved.
    Conflict { next: Option<AttendanceItem> },
}

pub struct AttendanceQueue {
    storage: Arc<dyn StorageAdapter>,
    bus: EventBus,
    config: Arc<AtriumConfig>,
}

impl AttendanceQueue {
    pub fn new(storage: Arc<dyn StorageAdapter>, bus: EventBus, config: Arc<AtriumConfig>) -> Self {
        Self {
            storage,
            bus,
            config,
        }
    }

    pub(crate) fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub(crate) fn config(&self) -> &AtriumConfig {
        &self.config
    }

    pub(crate) fn publish(&self, tenant_id: &TenantId, event: OperatorEvent) {
        self.bus.publish(BusEvent::operator(tenant_id, event));
    }

    pub(crate) fn publish_raw(&self, event: BusEvent) {
        self.bus.publish(event);
    }

    /// Priority and SLA deadline for a new item under the tenant's policy.
    pub fn plan(&self, tenant_id: &TenantId, reason: HandoffReason, now: DateTime<Utc>) -> HandoffPlan {
        let policy = self.config.routing_for(tenant_id);
        let wait = Duration::seconds(policy.sla_max_wait_secs as i64);
        let priority = match reason {
            // Degraded bot service and manual escalations jump ahead of routine handoffs.
            HandoffReason::ResponderUnavailable | HandoffReason::Manual => policy.default_priority + 1,
            _ => policy.default_priority,
        };
        HandoffPlan {
            reason,
            priority,
            sla_deadline: format_ts(now + wait),
        }
    }

    /// Announces an item that entered the queue as part of another
    /// transaction (inbound message or bot reply).
    pub fn announce_enqueued(&self, item: &AttendanceItem) {
        metrics::counter!("atrium_handoffs_total", "reason" => item.handoff_reason.to_string())
            .increment(1);
        info!(
            tenant_id = %item.tenant_id,
            conversation_id = %item.conversation_id,
            item_id = %item.id,
            reason = %item.handoff_reason,
            "conversation queued for human attendance"
        );
        self.publish(
            &item.tenant_id,
            OperatorEvent::QueueUpdate {
                item: item.clone(),
                escalated: false,
            },
        );
    }

    /// Moves a bot-handled conversation into the queue.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, conversation_id = %conversation_id))]
    pub async fn enqueue(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        reason: HandoffReason,
        now: DateTime<Utc>,
    ) -> Result<HandoffRecord, AtriumError> {
        let record = self
            .storage
            .handoff(HandoffRequest {
                tenant_id: tenant_id.clone(),
                conversation_id: conversation_id.clone(),
                plan: self.plan(tenant_id, reason, now),
                now: format_ts(now),
            })
            .await?;
        self.publish(
            tenant_id,
            OperatorEvent::MessageAppended {
                message: record.message.clone(),
            },
        );
        self.announce_enqueued(&record.item);
        Ok(record)
    }

    /// Assigns the best waiting item matching the operator's skills.
    /// Lost races move on to the next candidate.
    #[instrument(skip(self, principal), fields(tenant_id = %principal.tenant_id, operator_id = %principal.operator_id))]
    pub async fn pull_next(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Option<AttendanceItem>, AtriumError> {
        let skills = principal.effective_skills();
        let now = format_ts(now);
        for _ in 0..PULL_ROUNDS {
            let candidates = self
                .storage
                .next_waiting(&principal.tenant_id, &skills, PULL_BATCH)
                .await?;
            if candidates.is_empty() {
                return Ok(None);
            }
            for candidate in candidates {
                if let Some(item) = self.try_assign(principal, &candidate.id, &now).await? {
                    return Ok(Some(item));
                }
            }
        }
        debug!("every candidate was taken by other operators");
        Ok(None)
    }

    /// Assigns a specific item. A lost race reports the item this operator
    /// would be served next.
    #[instrument(skip(self, principal), fields(tenant_id = %principal.tenant_id, operator_id = %principal.operator_id, item_id = %item_id))]
    pub async fn assign(
        &self,
        principal: &Principal,
        item_id: &ItemId,
        now: DateTime<Utc>,
    ) -> Result<AssignResult, AtriumError> {
        let item = self.storage.get_item(&principal.tenant_id, item_id).await?;
        if !principal.effective_skills().contains(&item.channel_type) {
            return Err(AtriumError::Unauthorized(format!(
                "operator {} does not attend {} conversations",
                principal.operator_id, item.channel_type
            )));
        }
        if let Some(item) = self.try_assign(principal, item_id, &format_ts(now)).await? {
            return Ok(AssignResult::Assigned(item));
        }
        let next = self
            .storage
            .next_waiting(&principal.tenant_id, &principal.effective_skills(), 2)
            .await?
            .into_iter()
            .find(|i| &i.id != item_id);
        Ok(AssignResult::Conflict { next })
    }

    async fn try_assign(
        &self,
        principal: &Principal,
        item_id: &ItemId,
        now: &str,
    ) -> Result<Option<AttendanceItem>, AtriumError> {
        match self
            .storage
            .try_assign(&principal.tenant_id, item_id, &principal.operator_id, now)
            .await?
        {
            AssignOutcome::Assigned { item, .. } => {
                metrics::counter!("atrium_assignments_total", "outcome" => "assigned").increment(1);
                info!(item_id = %item.id, operator_id = %principal.operator_id, "attendance item assigned");
                self.publish(
                    &principal.tenant_id,
                    OperatorEvent::AssignmentChanged {
                        item: item.clone(),
                        previous_agent: None,
                    },
                );
                Ok(Some(item))
            }
            AssignOutcome::Conflict => {
                metrics::counter!("atrium_assignments_total", "outcome" => "conflict").increment(1);
                debug!(item_id = %item_id, "assignment lost the race");
                Ok(None)
            }
        }
    }

    /// Hands a held item to another operator, or back to the queue when
    /// `to` is `None`. Only the current holder may transfer.
    #[instrument(skip(self, principal), fields(tenant_id = %principal.tenant_id, item_id = %item_id))]
    pub async fn transfer(
        &self,
        principal: &Principal,
        item_id: &ItemId,
        to: Option<OperatorId>,
        now: DateTime<Utc>,
    ) -> Result<TransferRecord, AtriumError> {
        if let Some(target) = to.as_ref() {
            let item = self.storage.get_item(&principal.tenant_id, item_id).await?;
            self.check_transfer_target(&principal.tenant_id, &item, target)?;
        }
        let record = self
            .storage
            .transfer(TransferRequest {
                tenant_id: principal.tenant_id.clone(),
                item_id: item_id.clone(),
                from: Some(principal.operator_id.clone()),
                to,
                now: format_ts(now),
            })
            .await?;
        info!(
            from = ?record.previous_agent,
            to = ?record.item.assigned_agent,
            "attendance item transferred"
        );
        self.publish(
            &principal.tenant_id,
            OperatorEvent::AssignmentChanged {
                item: record.item.clone(),
                previous_agent: record.previous_agent.clone(),
            },
        );
        Ok(record)
    }

    /// A target must be a configured operator of the same tenant who attends
    /// the item's channel type.
    fn check_transfer_target(
        &self,
        tenant_id: &TenantId,
        item: &AttendanceItem,
        target: &OperatorId,
    ) -> Result<(), AtriumError> {
        let operator = self
            .config
            .operators
            .iter()
            .find(|op| op.tenant_id == tenant_id.as_str() && op.operator_id == target.as_str())
            .ok_or_else(|| AtriumError::not_found("operator", target.as_str()))?;
        if !operator.skills.is_empty() && !operator.skills.contains(&item.channel_type) {
            debug!(to = %target, channel_type = ?item.channel_type, "transfer target lacks the skill");
            return Err(AtriumError::Unauthorized(format!(
                "operator {target} does not attend {:?}",
                item.channel_type
            )));
        }
        Ok(())
    }

    /// Closes a conversation on behalf of its assigned operator.
    pub async fn close_by_operator(
        &self,
        principal: &Principal,
        conversation_id: &ConversationId,
        now: DateTime<Utc>,
    ) -> Result<CloseRecord, AtriumError> {
        let conversation = self
            .storage
            .get_conversation(&principal.tenant_id, conversation_id)
            .await?;
        if conversation.assigned_agent.as_ref() != Some(&principal.operator_id) {
            return Err(AtriumError::AssignmentConflict {
                item_id: conversation_id.to_string(),
            });
        }
        self.close(&principal.tenant_id, conversation_id, CloseReason::AgentClosed, now)
            .await?
            .ok_or_else(|| AtriumError::Internal("close returned no record".into()))
    }

    /// Closes a live conversation, settling its item.
    pub async fn close(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<Option<CloseRecord>, AtriumError> {
        self.close_with(tenant_id, conversation_id, reason, None, now).await
    }

    pub(crate) async fn close_with(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        reason: CloseReason,
        idle_before: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<CloseRecord>, AtriumError> {
        let Some(record) = self
            .storage
            .close_conversation(CloseRequest {
                tenant_id: tenant_id.clone(),
                conversation_id: conversation_id.clone(),
                reason,
                idle_before,
                now: format_ts(now),
            })
            .await?
        else {
            return Ok(None);
        };

        info!(tenant_id = %tenant_id, conversation_id = %conversation_id, reason = %reason, "conversation closed");
        self.publish(
            tenant_id,
            OperatorEvent::MessageAppended {
                message: record.message.clone(),
            },
        );
        if let Some(item) = &record.item {
            self.publish(
                tenant_id,
                OperatorEvent::QueueUpdate {
                    item: item.clone(),
                    escalated: item.sla_breached,
                },
            );
        }
        if self.config.routing_for(tenant_id).survey_on_close {
            self.publish_raw(BusEvent::SurveyRequested {
                tenant_id: tenant_id.clone(),
                conversation_id: conversation_id.clone(),
                contact_id: record.conversation.contact_id.clone(),
                channel_id: record.conversation.channel_id.clone(),
            });
        }
        Ok(Some(record))
    }

    pub async fn snapshot(&self, tenant_id: &TenantId) -> Result<QueueSnapshot, AtriumError> {
        self.storage.queue_snapshot(tenant_id).await
    }
}
