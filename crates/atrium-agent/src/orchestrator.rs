// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message orchestrator: drives a conversation through its routing states.
//!
//! An inbound message is appended together with any handoff it triggers.
//! Bot generation happens after that commit, outside every storage
//! transaction, and its outcome is committed with the reply it produced.
//! A responder that errors, times out or says nothing degrades the
//! conversation to the human queue; an inbound message is never dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use atrium_bus::EventBus;
use atrium_config::model::AtriumConfig;
use atrium_core::traits::auth::Principal;
use atrium_core::traits::responder::{BotRequest, ResponderEvent, ResponderStream};
use atrium_core::traits::scoring::LeadSignals;
use atrium_core::traits::storage::{InboundAppend, InboundOutcome, InboundRecord, OutboundAppend};
use atrium_core::traits::stream::{ReplySink, StreamFrame};
use atrium_core::types::{
    CanonicalInbound, ChannelId, Contact, ContentType, Conversation, ConversationId,
    ConversationStatus, DeliveryStatus, HandoffReason, Message, SenderKind, TenantId, format_ts,
};
use atrium_core::{
    AtriumError, BotResponder, BusEvent, LeadScorer, OperatorEvent, OutboundDispatcher,
    ReplyStreams, StorageAdapter,
};
use atrium_queue::AttendanceQueue;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::policy::HandoffPolicy;
use crate::unifier::ContactUnifier;

/// Shown to the end user when the bot cannot answer.
const HANDOFF_NOTICE: &str = "Our assistant is unavailable right now. An agent will reply shortly.";

/// Result of processing one canonical inbound record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The provider message id was already recorded on the channel.
    Duplicate,
    Recorded {
        conversation_id: ConversationId,
        status: ConversationStatus,
    },
}

/// A fully collected bot reply.
#[derive(Debug, Default)]
struct BotReply {
    text: String,
    sources: Vec<serde_json::Value>,
    fallback: bool,
    handoff: bool,
}

pub struct Orchestrator {
    storage: Arc<dyn StorageAdapter>,
    queue: Arc<AttendanceQueue>,
    bus: EventBus,
    unifier: ContactUnifier,
    policy: HandoffPolicy,
    responder: Arc<dyn BotResponder>,
    dispatcher: Arc<dyn OutboundDispatcher>,
    streams: Arc<dyn ReplyStreams>,
    scorer: Option<Arc<dyn LeadScorer>>,
    config: Arc<AtriumConfig>,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        queue: Arc<AttendanceQueue>,
        bus: EventBus,
        responder: Arc<dyn BotResponder>,
        dispatcher: Arc<dyn OutboundDispatcher>,
        streams: Arc<dyn ReplyStreams>,
        config: Arc<AtriumConfig>,
    ) -> Self {
        info!(
            responder = responder.name(),
            dispatcher = dispatcher.name(),
            "orchestrator initialized"
        );
        Self {
            unifier: ContactUnifier::new(storage.clone()),
            policy: HandoffPolicy::new(config.clone()),
            storage,
            queue,
            bus,
            responder,
            dispatcher,
            streams,
            scorer: None,
            config,
        }
    }

    /// Enables lead scoring after each inbound append.
    pub fn with_scorer(mut self, scorer: Arc<dyn LeadScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn queue(&self) -> &Arc<AttendanceQueue> {
        &self.queue
    }

    fn publish(&self, tenant_id: &TenantId, event: OperatorEvent) {
        self.bus.publish(BusEvent::operator(tenant_id, event));
    }

    /// Routes one inbound message. Errors before the append (contact
    /// resolution, storage) leave nothing behind and are safe to retry.
    /// Once the message is recorded, bot failures degrade to a handoff
    /// instead of surfacing.
    #[instrument(skip_all, fields(
        tenant_id = %record.tenant_id,
        channel_id = %record.channel_id,
        external_message_id = %record.external_message_id,
    ))]
    pub async fn process(
        &self,
        record: &CanonicalInbound,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, AtriumError> {
        let now_ts = format_ts(now);
        let resolved = self.unifier.resolve(record, &now_ts).await?;
        let plan = self
            .policy
            .inbound_reason(&record.tenant_id, &record.content, now)?
            .map(|reason| self.queue.plan(&record.tenant_id, reason, now));

        let outcome = self
            .storage
            .record_inbound(InboundAppend {
                record: record.clone(),
                contact_id: resolved.contact.id.clone(),
                handoff: plan,
                now: now_ts,
            })
            .await?;
        let recorded = match outcome {
            InboundOutcome::Duplicate => {
                debug!("inbound message already recorded");
                return Ok(ProcessOutcome::Duplicate);
            }
            InboundOutcome::Recorded(recorded) => *recorded,
        };
        metrics::counter!("atrium_messages_total", "direction" => "inbound").increment(1);
        self.announce_inbound(&recorded);
        self.score_lead(&resolved.contact, record, &recorded.conversation)
            .await;

        let mut status = recorded.conversation.status;
        if matches!(status, ConversationStatus::Open | ConversationStatus::WaitingBot) {
            status = self.run_bot(record, &recorded.conversation, now).await;
        }
        Ok(ProcessOutcome::Recorded {
            conversation_id: recorded.conversation.id,
            status,
        })
    }

    fn announce_inbound(&self, recorded: &InboundRecord) {
        let tenant_id = &recorded.conversation.tenant_id;
        if recorded.created || recorded.reopened {
            info!(
                conversation_id = %recorded.conversation.id,
                cycle = recorded.conversation.cycle,
                reopened = recorded.reopened,
                "conversation opened"
            );
            self.publish(
                tenant_id,
                OperatorEvent::NewConversation {
                    conversation: recorded.conversation.clone(),
                },
            );
        }
        self.publish(
            tenant_id,
            OperatorEvent::MessageAppended {
                message: recorded.message.clone(),
            },
        );
        if let Some(item) = &recorded.handoff_item {
            self.queue.announce_enqueued(item);
        }
    }

    /// Best effort: a scoring failure never affects routing.
    async fn score_lead(&self, contact: &Contact, record: &CanonicalInbound, conversation: &Conversation) {
        let Some(scorer) = &self.scorer else {
            return;
        };
        if !self.config.scoring.enabled {
            return;
        }
        let signals = LeadSignals {
            tenant_id: contact.tenant_id.clone(),
            contact_id: contact.id.clone(),
            contact_status: contact.status,
            channel_type: record.channel_type,
            message_count: conversation.message_count,
            total_conversations: contact.total_conversations.max(1),
            text: record.content.clone(),
        };
        let scored = match scorer.score(signals).await {
            Ok(scored) => scored,
            Err(e) => {
                warn!(contact_id = %contact.id, error = %e, "lead scoring failed");
                return;
            }
        };
        if let Err(e) = self
            .storage
            .update_lead_score(
                &contact.tenant_id,
                &contact.id,
                scored.score,
                Some(self.config.scoring.qualify_threshold),
            )
            .await
        {
            warn!(contact_id = %contact.id, error = %e, "failed to store lead score");
        }
    }

    /// Generates, streams, records and dispatches the bot reply. Returns
    /// the conversation status afterwards.
    async fn run_bot(
        &self,
        record: &CanonicalInbound,
        conversation: &Conversation,
        now: DateTime<Utc>,
    ) -> ConversationStatus {
        let tenant_id = &record.tenant_id;
        let window = i64::from(self.config.responder.history_messages);
        let history = self
            .storage
            .list_messages(
                tenant_id,
                &conversation.id,
                (conversation.last_seq - window).max(0),
                window,
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to load history, replying without it");
                Vec::new()
            });
        let request = BotRequest {
            tenant_id: tenant_id.clone(),
            conversation_id: conversation.id.clone(),
            contact_id: conversation.contact_id.clone(),
            channel_type: record.channel_type,
            text: record.content.clone(),
            history,
        };

        let mut sink = self
            .streams
            .open(tenant_id, &record.channel_id, &record.external_contact_id);
        let limit = Duration::from_secs(self.config.responder.timeout_secs);
        let started = Instant::now();
        let generated = tokio::time::timeout(limit, async {
            let stream = self.responder.respond(request).await?;
            collect_reply(stream, &mut sink, &conversation.id).await
        })
        .await
        .unwrap_or_else(|_| {
            Err(AtriumError::ResponderUnavailable {
                message: format!("no reply within {limit:?}"),
                source: None,
            })
        });
        metrics::histogram!("atrium_responder_latency_seconds")
            .record(started.elapsed().as_secs_f64());

        match generated {
            Ok(reply) if !reply.text.trim().is_empty() => {
                self.deliver_reply(record, conversation, reply, &mut sink, now)
                    .await
            }
            Ok(reply) if reply.handoff => {
                self.degrade(conversation, HandoffReason::ResponderRequested, &mut sink, now)
                    .await
            }
            Ok(_) => {
                warn!(conversation_id = %conversation.id, "responder produced an empty reply");
                self.degrade(conversation, HandoffReason::ResponderUnavailable, &mut sink, now)
                    .await
            }
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "bot responder failed");
                metrics::counter!("atrium_responder_failures_total").increment(1);
                self.degrade(conversation, HandoffReason::ResponderUnavailable, &mut sink, now)
                    .await
            }
        }
    }

    async fn deliver_reply(
        &self,
        record: &CanonicalInbound,
        conversation: &Conversation,
        reply: BotReply,
        sink: &mut Option<Box<dyn ReplySink>>,
        now: DateTime<Utc>,
    ) -> ConversationStatus {
        let tenant_id = &record.tenant_id;
        let reason = if reply.handoff {
            Some(HandoffReason::ResponderRequested)
        } else if reply.fallback && self.policy.fallback_exhausted(tenant_id, conversation.bot_failures) {
            Some(HandoffReason::BotFailures)
        } else {
            None
        };

        let appended = self
            .storage
            .append_outbound(OutboundAppend {
                tenant_id: tenant_id.clone(),
                conversation_id: conversation.id.clone(),
                sender_kind: SenderKind::Bot,
                sender_id: Some(self.responder.name().to_string()),
                content_type: ContentType::Text,
                content: reply.text.clone(),
                media_url: None,
                fallback: reply.fallback,
                handoff: reason.map(|r| self.queue.plan(tenant_id, r, now)),
                now: format_ts(now),
            })
            .await;
        let outbound = match appended {
            Ok(outbound) => outbound,
            Err(AtriumError::InvalidTransition { .. }) => {
                // An operator took over while the bot was generating.
                debug!(conversation_id = %conversation.id, "bot reply discarded, conversation left bot handling");
                return self.current_status(conversation).await;
            }
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "failed to record bot reply");
                return self.current_status(conversation).await;
            }
        };
        metrics::counter!("atrium_messages_total", "direction" => "outbound").increment(1);

        self.publish(
            tenant_id,
            OperatorEvent::MessageAppended {
                message: outbound.message.clone(),
            },
        );
        if let Some(item) = &outbound.item {
            self.queue.announce_enqueued(item);
        }
        send_frame(
            sink,
            StreamFrame::ChatComplete {
                conversation_id: conversation.id.clone(),
                text: reply.text,
                sources: reply.sources,
                handoff: outbound.item.is_some(),
            },
        )
        .await;
        self.dispatch(
            tenant_id,
            &record.channel_id,
            &record.external_contact_id,
            &outbound.message,
        )
        .await;
        outbound.conversation.status
    }

    /// Hands the conversation to the queue and tells the end user. A
    /// responder failure is reported as an `error` frame.
    async fn degrade(
        &self,
        conversation: &Conversation,
        reason: HandoffReason,
        sink: &mut Option<Box<dyn ReplySink>>,
        now: DateTime<Utc>,
    ) -> ConversationStatus {
        let frame = if reason == HandoffReason::ResponderUnavailable {
            StreamFrame::Error {
                conversation_id: conversation.id.clone(),
                message: HANDOFF_NOTICE.to_string(),
            }
        } else {
            StreamFrame::ChatComplete {
                conversation_id: conversation.id.clone(),
                text: String::new(),
                sources: Vec::new(),
                handoff: true,
            }
        };
        send_frame(sink, frame).await;
        match self
            .queue
            .enqueue(&conversation.tenant_id, &conversation.id, reason, now)
            .await
        {
            Ok(record) => record.conversation.status,
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "handoff after bot failure did not apply");
                self.current_status(conversation).await
            }
        }
    }

    async fn current_status(&self, conversation: &Conversation) -> ConversationStatus {
        self.storage
            .get_conversation(&conversation.tenant_id, &conversation.id)
            .await
            .map(|c| c.status)
            .unwrap_or(conversation.status)
    }

    /// Hands an outbound message to the provider and records the result.
    async fn dispatch(
        &self,
        tenant_id: &TenantId,
        channel_id: &ChannelId,
        recipient: &str,
        message: &Message,
    ) {
        let channel = match self.storage.get_channel(tenant_id, channel_id).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "channel lookup failed, message not dispatched");
                return;
            }
        };
        let (status, external_id) = match self.dispatcher.dispatch(&channel, recipient, message).await {
            Ok(external_id) => (DeliveryStatus::Delivered, external_id),
            Err(e) => {
                warn!(message_id = %message.id, channel_type = %channel.channel_type, error = %e, "outbound dispatch failed");
                metrics::counter!("atrium_dispatch_failures_total", "channel" => channel.channel_type.to_string())
                    .increment(1);
                (DeliveryStatus::Failed, None)
            }
        };
        if let Err(e) = self
            .storage
            .update_delivery_status(tenant_id, &message.id, status, external_id)
            .await
        {
            warn!(message_id = %message.id, error = %e, "failed to record delivery status");
        }
    }

    /// Appends an operator reply to a conversation the operator attends,
    /// then delivers it to the contact.
    #[instrument(skip(self, principal, text), fields(tenant_id = %principal.tenant_id, operator_id = %principal.operator_id))]
    pub async fn send_agent_message(
        &self,
        principal: &Principal,
        conversation_id: &ConversationId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Message, AtriumError> {
        let outbound = self
            .storage
            .append_outbound(OutboundAppend {
                tenant_id: principal.tenant_id.clone(),
                conversation_id: conversation_id.clone(),
                sender_kind: SenderKind::Agent,
                sender_id: Some(principal.operator_id.to_string()),
                content_type: ContentType::Text,
                content: text.to_string(),
                media_url: None,
                fallback: false,
                handoff: None,
                now: format_ts(now),
            })
            .await?;
        metrics::counter!("atrium_messages_total", "direction" => "outbound").increment(1);
        self.publish(
            &principal.tenant_id,
            OperatorEvent::MessageAppended {
                message: outbound.message.clone(),
            },
        );

        let conversation = &outbound.conversation;
        let channel = self
            .storage
            .get_channel(&principal.tenant_id, &conversation.channel_id)
            .await?;
        let identity = self
            .storage
            .contact_identities(&principal.tenant_id, &conversation.contact_id)
            .await?
            .into_iter()
            .find(|i| i.channel_type == channel.channel_type);
        let Some(identity) = identity else {
            warn!(conversation_id = %conversation.id, "contact has no identity on the channel, message not dispatched");
            return Ok(outbound.message);
        };

        let mut sink = self
            .streams
            .open(&principal.tenant_id, &channel.id, &identity.external_id);
        send_frame(
            &mut sink,
            StreamFrame::ChatComplete {
                conversation_id: conversation.id.clone(),
                text: text.to_string(),
                sources: Vec::new(),
                handoff: false,
            },
        )
        .await;
        self.dispatch(
            &principal.tenant_id,
            &channel.id,
            &identity.external_id,
            &outbound.message,
        )
        .await;
        Ok(outbound.message)
    }
}

/// Drains the responder stream, forwarding text deltas to the end user
/// while the client is connected.
async fn collect_reply(
    mut stream: ResponderStream,
    sink: &mut Option<Box<dyn ReplySink>>,
    conversation_id: &ConversationId,
) -> Result<BotReply, AtriumError> {
    let mut reply = BotReply::default();
    while let Some(event) = stream.next().await {
        match event? {
            ResponderEvent::Delta(text) => {
                send_frame(
                    sink,
                    StreamFrame::ChatChunk {
                        conversation_id: conversation_id.clone(),
                        text: text.clone(),
                    },
                )
                .await;
                reply.text.push_str(&text);
            }
            ResponderEvent::Source(source) => reply.sources.push(source),
            ResponderEvent::Fallback => reply.fallback = true,
            ResponderEvent::Handoff { reason } => {
                debug!(reason = reason.as_deref().unwrap_or("unspecified"), "responder requested a human");
                reply.handoff = true;
            }
        }
    }
    Ok(reply)
}

/// Sends one frame; a closed client drops the sink so nothing further
/// is delivered.
async fn send_frame(sink: &mut Option<Box<dyn ReplySink>>, frame: StreamFrame) {
    if let Some(active) = sink.as_mut() {
        if !active.send(frame).await {
            debug!("end-user stream closed");
            *sink = None;
        }
    }
}
