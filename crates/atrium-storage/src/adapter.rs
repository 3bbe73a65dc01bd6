// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use atrium_config::model::StorageConfig;
use atrium_core::traits::storage::{
    AcceptOutcome, AssignOutcome, CloseRecord, CloseRequest, ConversationTransition,
    HandoffRecord, HandoffRequest, InboundAppend, InboundEntry, InboundOutcome, InboundStatus,
    OutboundAppend, OutboundRecord, ResolveContact, ResolvedContact, TransferRecord,
    TransferRequest,
};
use atrium_core::types::{
    AttendanceItem, AttendanceStatus, CanonicalInbound, Channel, ChannelId, ChannelStatus,
    ChannelType, Contact, ContactId, ContactIdentity, Conversation, ConversationId,
    ConversationStatus, DeliveryStatus, ItemId, Message, MessageId, OperatorId, QueueSnapshot,
    TenantId,
};
use atrium_core::{AdapterType, AtriumError, HealthStatus, PluginAdapter, StorageAdapter};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates every operation to the typed
/// query modules. The database is opened by
/// [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, AtriumError> {
        self.db.get().ok_or_else(|| AtriumError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, AtriumError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), AtriumError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), AtriumError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| AtriumError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), AtriumError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Channel registry ---

    async fn create_channel(&self, channel: &Channel) -> Result<(), AtriumError> {
        queries::channels::insert(self.db()?, channel).await
    }

    async fn find_channel(&self, channel_id: &ChannelId) -> Result<Option<Channel>, AtriumError> {
        queries::channels::find_by_id(self.db()?, channel_id).await
    }

    async fn get_channel(
        &self,
        tenant_id: &TenantId,
        channel_id: &ChannelId,
    ) -> Result<Channel, AtriumError> {
        queries::channels::get(self.db()?, tenant_id, channel_id).await
    }

    async fn list_channels(&self, tenant_id: &TenantId) -> Result<Vec<Channel>, AtriumError> {
        queries::channels::list(self.db()?, tenant_id).await
    }

    async fn set_channel_status(
        &self,
        tenant_id: &TenantId,
        channel_id: &ChannelId,
        status: ChannelStatus,
    ) -> Result<Channel, AtriumError> {
        queries::channels::set_status(self.db()?, tenant_id, channel_id, status).await
    }

    async fn record_delivery_failure(
        &self,
        channel_id: &ChannelId,
        threshold: i64,
    ) -> Result<ChannelStatus, AtriumError> {
        queries::channels::record_failure(self.db()?, channel_id, threshold).await
    }

    async fn record_delivery_success(&self, channel_id: &ChannelId) -> Result<(), AtriumError> {
        queries::channels::record_success(self.db()?, channel_id).await
    }

    // --- Contacts ---

    async fn resolve_contact(&self, req: ResolveContact) -> Result<ResolvedContact, AtriumError> {
        queries::contacts::resolve(self.db()?, req).await
    }

    async fn get_contact(
        &self,
        tenant_id: &TenantId,
        contact_id: &ContactId,
    ) -> Result<Contact, AtriumError> {
        queries::contacts::get(self.db()?, tenant_id, contact_id).await
    }

    async fn list_contacts(
        &self,
        tenant_id: &TenantId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Contact>, AtriumError> {
        queries::contacts::list(self.db()?, tenant_id, limit, offset).await
    }

    async fn contact_identities(
        &self,
        tenant_id: &TenantId,
        contact_id: &ContactId,
    ) -> Result<Vec<ContactIdentity>, AtriumError> {
        queries::contacts::identities(self.db()?, tenant_id, contact_id).await
    }

    async fn update_lead_score(
        &self,
        tenant_id: &TenantId,
        contact_id: &ContactId,
        score: f64,
        qualify_threshold: Option<f64>,
    ) -> Result<Contact, AtriumError> {
        queries::contacts::update_lead_score(self.db()?, tenant_id, contact_id, score, qualify_threshold)
            .await
    }

    // --- Durable inbound queue ---

    async fn accept_inbound(
        &self,
        record: &CanonicalInbound,
        max_attempts: i64,
        now: &str,
    ) -> Result<AcceptOutcome, AtriumError> {
        queries::inbound::accept(self.db()?, record, max_attempts, now).await
    }

    async fn claim_inbound(
        &self,
        now: &str,
        lock_until: &str,
        limit: i64,
    ) -> Result<Vec<InboundEntry>, AtriumError> {
        queries::inbound::claim(self.db()?, now, lock_until, limit).await
    }

    async fn complete_inbound(&self, id: i64, now: &str) -> Result<(), AtriumError> {
        queries::inbound::complete(self.db()?, id, now).await
    }

    async fn fail_inbound(
        &self,
        id: i64,
        error: &str,
        retry_at: &str,
        now: &str,
    ) -> Result<InboundStatus, AtriumError> {
        queries::inbound::fail(self.db()?, id, error, retry_at, now).await
    }

    async fn inbound_status(&self, id: i64) -> Result<Option<InboundStatus>, AtriumError> {
        queries::inbound::status(self.db()?, id).await
    }

    async fn inbound_depth(&self) -> Result<Vec<(InboundStatus, i64)>, AtriumError> {
        queries::inbound::depth(self.db()?).await
    }

    // --- Conversations and messages ---

    async fn record_inbound(&self, append: InboundAppend) -> Result<InboundOutcome, AtriumError> {
        queries::conversations::record_inbound(self.db()?, append).await
    }

    async fn append_outbound(&self, append: OutboundAppend) -> Result<OutboundRecord, AtriumError> {
        queries::conversations::append_outbound(self.db()?, append).await
    }

    async fn update_delivery_status(
        &self,
        tenant_id: &TenantId,
        message_id: &MessageId,
        status: DeliveryStatus,
        external_id: Option<String>,
    ) -> Result<(), AtriumError> {
        queries::messages::update_delivery_status(self.db()?, tenant_id, message_id, status, external_id)
            .await
    }

    async fn handoff(&self, req: HandoffRequest) -> Result<HandoffRecord, AtriumError> {
        queries::conversations::handoff(self.db()?, req).await
    }

    async fn close_conversation(
        &self,
        req: CloseRequest,
    ) -> Result<Option<CloseRecord>, AtriumError> {
        queries::conversations::close(self.db()?, req).await
    }

    async fn get_conversation(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Conversation, AtriumError> {
        queries::conversations::get(self.db()?, tenant_id, conversation_id).await
    }

    async fn list_conversations(
        &self,
        tenant_id: &TenantId,
        status: Option<ConversationStatus>,
        limit: i64,
    ) -> Result<Vec<Conversation>, AtriumError> {
        queries::conversations::list(self.db()?, tenant_id, status, limit).await
    }

    async fn in_attendance_conversations(&self) -> Result<Vec<Conversation>, AtriumError> {
        queries::conversations::in_attendance(self.db()?).await
    }

    async fn list_messages(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        after_seq: i64,
        limit: i64,
    ) -> Result<Vec<Message>, AtriumError> {
        queries::messages::list(self.db()?, tenant_id, conversation_id, after_seq, limit).await
    }

    async fn list_transitions(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ConversationTransition>, AtriumError> {
        queries::conversations::transitions(self.db()?, tenant_id, conversation_id).await
    }

    // --- Attendance items ---

    async fn try_assign(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
        operator_id: &OperatorId,
        now: &str,
    ) -> Result<AssignOutcome, AtriumError> {
        queries::attendance::try_assign(self.db()?, tenant_id, item_id, operator_id, now).await
    }

    async fn transfer(&self, req: TransferRequest) -> Result<TransferRecord, AtriumError> {
        queries::attendance::transfer(self.db()?, req).await
    }

    async fn next_waiting(
        &self,
        tenant_id: &TenantId,
        skills: &[ChannelType],
        limit: i64,
    ) -> Result<Vec<AttendanceItem>, AtriumError> {
        queries::attendance::next_waiting(self.db()?, tenant_id, skills, limit).await
    }

    async fn get_item(
        &self,
        tenant_id: &TenantId,
        item_id: &ItemId,
    ) -> Result<AttendanceItem, AtriumError> {
        queries::attendance::get(self.db()?, tenant_id, item_id).await
    }

    async fn active_item(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<AttendanceItem>, AtriumError> {
        queries::attendance::active(self.db()?, tenant_id, conversation_id).await
    }

    async fn list_items(
        &self,
        tenant_id: &TenantId,
        status: Option<AttendanceStatus>,
    ) -> Result<Vec<AttendanceItem>, AtriumError> {
        queries::attendance::list(self.db()?, tenant_id, status).await
    }

    async fn breach_overdue(&self, now: &str) -> Result<Vec<AttendanceItem>, AtriumError> {
        queries::attendance::breach_overdue(self.db()?, now).await
    }

    async fn queue_snapshot(&self, tenant_id: &TenantId) -> Result<QueueSnapshot, AtriumError> {
        queries::attendance::snapshot(self.db()?, tenant_id).await
    }
}

#[cfg(test)]
mod tests {
    use atrium_core::traits::storage::{ContactMatch, HandoffPlan, InboundRecord};
    use atrium_core::types::{CloseReason, ContentType, HandoffReason, SenderKind};

    use super::*;

    const T0: &str = "2026-03-01T10:00:00.000Z";
    const T1: &str = "2026-03-01T10:00:05.000Z";
    const T2: &str = "2026-03-01T10:00:10.000Z";
    const T3: &str = "2026-03-01T10:05:00.000Z";

    async fn storage() -> (SqliteStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("atrium.db").to_string_lossy().into_owned(),
            wal_mode: true,
        };
        let storage = SqliteStorage::new(config);
        storage.initialize().await.unwrap();
        (storage, dir)
    }

    async fn channel(storage: &SqliteStorage, channel_type: ChannelType) -> Channel {
        let channel = Channel::new(TenantId::from("t1"), channel_type, "main", "secret");
        storage.create_channel(&channel).await.unwrap();
        channel
    }

    fn inbound(channel: &Channel, contact: &str, external: &str, text: &str) -> CanonicalInbound {
        CanonicalInbound {
            tenant_id: channel.tenant_id.clone(),
            channel_id: channel.id.clone(),
            channel_type: channel.channel_type,
            external_contact_id: contact.into(),
            contact_name: Some("Ana".into()),
            contact_phone: None,
            contact_email: None,
            external_message_id: external.into(),
            content: text.into(),
            content_type: ContentType::Text,
            media_url: None,
            provider_timestamp: None,
        }
    }

    async fn contact_for(storage: &SqliteStorage, record: &CanonicalInbound) -> ContactId {
        storage
            .resolve_contact(ResolveContact {
                tenant_id: record.tenant_id.clone(),
                channel_type: record.channel_type,
                external_id: record.external_contact_id.clone(),
                display_name: record.contact_name.clone(),
                phone: None,
                email: None,
                now: T0.into(),
            })
            .await
            .unwrap()
            .contact
            .id
    }

    async fn record(
        storage: &SqliteStorage,
        record: CanonicalInbound,
        handoff: Option<HandoffPlan>,
        now: &str,
    ) -> InboundOutcome {
        let contact_id = contact_for(storage, &record).await;
        storage
            .record_inbound(InboundAppend {
                record,
                contact_id,
                handoff,
                now: now.into(),
            })
            .await
            .unwrap()
    }

    fn recorded(outcome: InboundOutcome) -> InboundRecord {
        match outcome {
            InboundOutcome::Recorded(r) => *r,
            InboundOutcome::Duplicate => panic!("unexpected duplicate"),
        }
    }

    fn plan(reason: HandoffReason) -> HandoffPlan {
        HandoffPlan {
            reason,
            priority: 0,
            sla_deadline: T3.into(),
        }
    }

    #[tokio::test]
    async fn uninitialized_storage_errors() {
        let storage = SqliteStorage::new(StorageConfig {
            database_path: "/nonexistent/never.db".into(),
            wal_mode: false,
        });
        let err = storage.list_channels(&TenantId::from("t1")).await.unwrap_err();
        assert!(matches!(err, AtriumError::Storage { .. }));
    }

    #[tokio::test]
    async fn first_inbound_creates_conversation_in_bot_routing() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Webchat).await;
        let rec = recorded(record(&storage, inbound(&ch, "s1", "m1", "hello"), None, T0).await);

        assert!(rec.created);
        assert_eq!(rec.conversation.status, ConversationStatus::WaitingBot);
        assert_eq!(rec.message.seq, 1);
        assert_eq!(rec.conversation.message_count, 1);

        let journal = storage
            .list_transitions(&ch.tenant_id, &rec.conversation.id)
            .await
            .unwrap();
        let steps: Vec<_> = journal.iter().map(|t| (t.from_status, t.to_status)).collect();
        assert_eq!(
            steps,
            vec![
                (None, ConversationStatus::Open),
                (Some(ConversationStatus::Open), ConversationStatus::WaitingBot),
            ]
        );

        let loaded = storage.get_channel(&ch.tenant_id, &ch.id).await.unwrap();
        assert_eq!(loaded.messages_received, 1);
        assert_eq!(loaded.active_conversations, 1);
    }

    #[tokio::test]
    async fn redelivered_message_is_a_duplicate() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Webchat).await;
        recorded(record(&storage, inbound(&ch, "s1", "m1", "hello"), None, T0).await);
        let again = record(&storage, inbound(&ch, "s1", "m1", "hello"), None, T1).await;
        assert!(matches!(again, InboundOutcome::Duplicate));
    }

    #[tokio::test]
    async fn sequence_numbers_are_gapless() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Sms).await;
        let mut conv = None;
        for i in 0..5 {
            let rec = recorded(
                record(&storage, inbound(&ch, "+5511", &format!("m{i}"), "x"), None, T0).await,
            );
            conv = Some(rec.conversation.id);
        }
        let conv = conv.unwrap();
        let messages = storage.list_messages(&ch.tenant_id, &conv, 0, 100).await.unwrap();
        let seqs: Vec<_> = messages.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        let tail = storage.list_messages(&ch.tenant_id, &conv, 3, 100).await.unwrap();
        assert_eq!(tail.len(), 2);
    }

    #[tokio::test]
    async fn inbound_with_handoff_enqueues_once() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Whatsapp).await;
        let rec = recorded(
            record(
                &storage,
                inbound(&ch, "5511", "m1", "quero um atendente"),
                Some(plan(HandoffReason::Keyword)),
                T0,
            )
            .await,
        );
        assert_eq!(rec.conversation.status, ConversationStatus::WaitingHuman);
        let item = rec.handoff_item.unwrap();
        assert_eq!(item.status, AttendanceStatus::Waiting);
        assert_eq!(item.channel_type, ChannelType::Whatsapp);

        // Already waiting for a human: a second keyword does not enqueue again.
        let rec = recorded(
            record(
                &storage,
                inbound(&ch, "5511", "m2", "atendente!"),
                Some(plan(HandoffReason::Keyword)),
                T1,
            )
            .await,
        );
        assert!(rec.handoff_item.is_none());
        let items = storage.list_items(&ch.tenant_id, None).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn assignment_is_exclusive() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Whatsapp).await;
        let rec = recorded(
            record(&storage, inbound(&ch, "5511", "m1", "help"), Some(plan(HandoffReason::Keyword)), T0)
                .await,
        );
        let item = rec.handoff_item.unwrap();
        let t = &ch.tenant_id;

        let op_a = OperatorId::from("op-a");
        let op_b = OperatorId::from("op-b");
        let (a, b) = tokio::join!(
            storage.try_assign(t, &item.id, &op_a, T1),
            storage.try_assign(t, &item.id, &op_b, T1),
        );
        let wins = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(|o| matches!(o, AssignOutcome::Assigned { .. }))
            .count();
        assert_eq!(wins, 1);

        let conv = storage.get_conversation(t, &rec.conversation.id).await.unwrap();
        assert_eq!(conv.status, ConversationStatus::InAttendance);
        assert!(conv.assigned_agent.is_some());
        assert_eq!(conv.idle_since.as_deref(), Some(T1));
    }

    #[tokio::test]
    async fn only_the_assigned_agent_may_reply() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Webchat).await;
        let rec = recorded(
            record(&storage, inbound(&ch, "s1", "m1", "help"), Some(plan(HandoffReason::Keyword)), T0)
                .await,
        );
        let t = &ch.tenant_id;
        let item = rec.handoff_item.unwrap();
        storage
            .try_assign(t, &item.id, &OperatorId::from("op-a"), T1)
            .await
            .unwrap();

        let reply = |who: &str| OutboundAppend {
            tenant_id: t.clone(),
            conversation_id: rec.conversation.id.clone(),
            sender_kind: SenderKind::Agent,
            sender_id: Some(who.into()),
            content_type: ContentType::Text,
            content: "hi".into(),
            media_url: None,
            fallback: false,
            handoff: None,
            now: T2.into(),
        };
        let err = storage.append_outbound(reply("op-b")).await.unwrap_err();
        assert!(matches!(err, AtriumError::AssignmentConflict { .. }));

        let out = storage.append_outbound(reply("op-a")).await.unwrap();
        assert_eq!(out.message.seq, 2);
        assert_eq!(out.item.unwrap().status, AttendanceStatus::InProgress);
    }

    #[tokio::test]
    async fn bot_fallbacks_count_and_reset() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Webchat).await;
        let rec = recorded(record(&storage, inbound(&ch, "s1", "m1", "??"), None, T0).await);
        let bot = |fallback: bool| OutboundAppend {
            tenant_id: ch.tenant_id.clone(),
            conversation_id: rec.conversation.id.clone(),
            sender_kind: SenderKind::Bot,
            sender_id: None,
            content_type: ContentType::Text,
            content: "sorry".into(),
            media_url: None,
            fallback,
            handoff: None,
            now: T1.into(),
        };
        storage.append_outbound(bot(true)).await.unwrap();
        let out = storage.append_outbound(bot(true)).await.unwrap();
        assert_eq!(out.conversation.bot_failures, 2);
        let out = storage.append_outbound(bot(false)).await.unwrap();
        assert_eq!(out.conversation.bot_failures, 0);

        let mut with_handoff = bot(true);
        with_handoff.handoff = Some(plan(HandoffReason::BotFailures));
        let out = storage.append_outbound(with_handoff).await.unwrap();
        assert_eq!(out.conversation.status, ConversationStatus::WaitingHuman);
        assert!(out.item.is_some());

        let err = storage.append_outbound(bot(false)).await.unwrap_err();
        assert!(matches!(err, AtriumError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn transfer_and_return_to_queue() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Instagram).await;
        let rec = recorded(
            record(&storage, inbound(&ch, "ig1", "m1", "x"), Some(plan(HandoffReason::Keyword)), T0)
                .await,
        );
        let t = &ch.tenant_id;
        let item = rec.handoff_item.unwrap();
        storage.try_assign(t, &item.id, &OperatorId::from("op-a"), T1).await.unwrap();

        let moved = storage
            .transfer(TransferRequest {
                tenant_id: t.clone(),
                item_id: item.id.clone(),
                from: Some(OperatorId::from("op-a")),
                to: Some(OperatorId::from("op-b")),
                now: T2.into(),
            })
            .await
            .unwrap();
        assert_eq!(moved.item.status, AttendanceStatus::Transferred);
        assert_eq!(moved.previous_agent, Some(OperatorId::from("op-a")));
        assert_eq!(moved.conversation.assigned_agent, Some(OperatorId::from("op-b")));

        // Stale holder cannot transfer.
        let err = storage
            .transfer(TransferRequest {
                tenant_id: t.clone(),
                item_id: item.id.clone(),
                from: Some(OperatorId::from("op-a")),
                to: None,
                now: T2.into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AtriumError::AssignmentConflict { .. }));

        let back = storage
            .transfer(TransferRequest {
                tenant_id: t.clone(),
                item_id: item.id.clone(),
                from: Some(OperatorId::from("op-b")),
                to: None,
                now: T2.into(),
            })
            .await
            .unwrap();
        assert_eq!(back.item.status, AttendanceStatus::Waiting);
        assert_eq!(back.conversation.status, ConversationStatus::WaitingHuman);
        assert!(back.conversation.assigned_agent.is_none());
    }

    #[tokio::test]
    async fn close_settles_item_and_next_inbound_reopens() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Webchat).await;
        let rec = recorded(
            record(&storage, inbound(&ch, "s1", "m1", "x"), Some(plan(HandoffReason::Keyword)), T0)
                .await,
        );
        let t = &ch.tenant_id;

        let closed = storage
            .close_conversation(CloseRequest {
                tenant_id: t.clone(),
                conversation_id: rec.conversation.id.clone(),
                reason: CloseReason::Admin,
                idle_before: None,
                now: T1.into(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.conversation.status, ConversationStatus::Closed);
        assert_eq!(closed.item.unwrap().status, AttendanceStatus::Abandoned);
        assert_eq!(
            storage.get_channel(t, &ch.id).await.unwrap().active_conversations,
            0
        );

        let again = recorded(record(&storage, inbound(&ch, "s1", "m2", "back"), None, T2).await);
        assert!(again.reopened);
        assert_eq!(again.conversation.id, rec.conversation.id);
        assert_eq!(again.conversation.cycle, 2);
        assert_eq!(again.conversation.status, ConversationStatus::WaitingBot);
        assert!(again.conversation.closed_at.is_none());
    }

    #[tokio::test]
    async fn idle_guard_skips_recently_active_conversations() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Webchat).await;
        let rec = recorded(
            record(&storage, inbound(&ch, "s1", "m1", "x"), Some(plan(HandoffReason::Keyword)), T0)
                .await,
        );
        let t = &ch.tenant_id;
        let item = rec.handoff_item.unwrap();
        storage.try_assign(t, &item.id, &OperatorId::from("op-a"), T1).await.unwrap();
        // Contact writes again, moving the idle clock to T2.
        recorded(record(&storage, inbound(&ch, "s1", "m2", "still here"), None, T2).await);

        let idle_close = |cutoff: &str| CloseRequest {
            tenant_id: t.clone(),
            conversation_id: rec.conversation.id.clone(),
            reason: CloseReason::IdleTimeout,
            idle_before: Some(cutoff.into()),
            now: T3.into(),
        };
        assert!(storage.close_conversation(idle_close(T1)).await.unwrap().is_none());
        let closed = storage.close_conversation(idle_close(T2)).await.unwrap().unwrap();
        assert_eq!(closed.item.unwrap().status, AttendanceStatus::Resolved);
    }

    #[tokio::test]
    async fn skills_filter_and_order_waiting_items() {
        let (storage, _dir) = storage().await;
        let wa = channel(&storage, ChannelType::Whatsapp).await;
        let mail = channel(&storage, ChannelType::Email).await;
        let t = &wa.tenant_id;

        let mut urgent = plan(HandoffReason::Manual);
        urgent.priority = 5;
        recorded(record(&storage, inbound(&wa, "a", "m1", "x"), Some(plan(HandoffReason::Keyword)), T0).await);
        recorded(record(&storage, inbound(&mail, "b@x.io", "m2", "x"), Some(plan(HandoffReason::Keyword)), T1).await);
        let top = recorded(record(&storage, inbound(&wa, "c", "m3", "x"), Some(urgent), T2).await);

        let wa_only = storage.next_waiting(t, &[ChannelType::Whatsapp], 10).await.unwrap();
        assert_eq!(wa_only.len(), 2);
        assert_eq!(wa_only[0].id, top.handoff_item.unwrap().id);

        let all = storage.next_waiting(t, &ChannelType::ALL, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(storage.next_waiting(t, &[], 10).await.unwrap().is_empty());

        let snapshot = storage.queue_snapshot(t).await.unwrap();
        assert_eq!(snapshot.waiting, 3);
        assert_eq!(snapshot.oldest_waiting_since.as_deref(), Some(T0));
    }

    #[tokio::test]
    async fn sla_breach_is_reported_once() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Webchat).await;
        recorded(record(&storage, inbound(&ch, "s1", "m1", "x"), Some(plan(HandoffReason::Keyword)), T0).await);

        assert!(storage.breach_overdue(T2).await.unwrap().is_empty());
        let breached = storage.breach_overdue(T3).await.unwrap();
        assert_eq!(breached.len(), 1);
        assert!(breached[0].sla_breached);
        assert!(storage.breach_overdue(T3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_handoff_records_system_event() {
        let (storage, _dir) = storage().await;
        let ch = channel(&storage, ChannelType::Facebook).await;
        let rec = recorded(record(&storage, inbound(&ch, "p1", "m1", "x"), None, T0).await);
        let handed = storage
            .handoff(HandoffRequest {
                tenant_id: ch.tenant_id.clone(),
                conversation_id: rec.conversation.id.clone(),
                plan: plan(HandoffReason::ResponderUnavailable),
                now: T1.into(),
            })
            .await
            .unwrap();
        assert_eq!(handed.message.content, "handoff:responder_unavailable");
        assert_eq!(handed.conversation.status, ConversationStatus::WaitingHuman);

        let last = storage
            .list_transitions(&ch.tenant_id, &rec.conversation.id)
            .await
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(last.message_id, Some(handed.message.id));
    }

    #[tokio::test]
    async fn contact_is_resolved_by_identity_after_creation() {
        let (storage, _dir) = storage().await;
        let req = ResolveContact {
            tenant_id: TenantId::from("t1"),
            channel_type: ChannelType::Whatsapp,
            external_id: "5511999".into(),
            display_name: None,
            phone: Some("5511999".into()),
            email: None,
            now: T0.into(),
        };
        let first = storage.resolve_contact(req.clone()).await.unwrap();
        assert_eq!(first.matched, ContactMatch::Created);
        let second = storage.resolve_contact(req).await.unwrap();
        assert_eq!(second.matched, ContactMatch::Identity);
        assert_eq!(first.contact.id, second.contact.id);
    }
}
