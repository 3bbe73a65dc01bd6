// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the routing stack (storage, bus, queue,
//! orchestrator, ingestion gateway, inbound worker) with mock adapters over
//! a temp SQLite database.

use std::sync::Arc;

use atrium_agent::worker::InboundWorker;
use atrium_agent::{HeuristicScorer, Orchestrator, ProcessOutcome};
use atrium_bus::EventBus;
use atrium_config::model::{AtriumConfig, StorageConfig};
use atrium_core::traits::auth::Principal;
use atrium_core::types::{
    CanonicalInbound, Channel, ChannelStatus, ChannelType, ContentType, OperatorId, TenantId,
    format_ts,
};
use atrium_core::{AtriumError, ReplyStreams, StorageAdapter};
use atrium_ingest::{AdapterRegistry, IngestionGateway};
use atrium_queue::AttendanceQueue;
use atrium_storage::SqliteStorage;
use chrono::{DateTime, TimeZone, Utc};

use crate::mock_dispatcher::MockDispatcher;
use crate::mock_responder::{MockResponder, Scripted};
use crate::mock_streams::RecordingReplyStreams;

pub const TENANT: &str = "t1";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    script: Vec<Scripted>,
    config: AtriumConfig,
    scoring: bool,
    streams: Option<Arc<dyn ReplyStreams>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = AtriumConfig::default();
        config.responder.timeout_secs = 1;
        Self {
            script: Vec::new(),
            config,
            scoring: false,
            streams: None,
        }
    }

    /// Scripted responder behaviour, consumed in order.
    pub fn with_script(mut self, script: Vec<Scripted>) -> Self {
        self.script = script;
        self
    }

    /// Adjusts the configuration before the stack is built.
    pub fn configure(mut self, f: impl FnOnce(&mut AtriumConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Enables the heuristic lead scorer.
    pub fn with_scoring(mut self) -> Self {
        self.scoring = true;
        self
    }

    /// Routes bot replies to `streams` instead of the recording streams.
    pub fn with_streams(mut self, streams: Arc<dyn ReplyStreams>) -> Self {
        self.streams = Some(streams);
        self
    }

    pub async fn build(self) -> Result<TestHarness, AtriumError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| AtriumError::Storage { source: e.into() })?;
        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: temp_dir.path().join("test.db").to_string_lossy().to_string(),
            wal_mode: true,
        };

        let sqlite = SqliteStorage::new(config.storage.clone());
        sqlite.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(sqlite);
        let config = Arc::new(config);

        let bus = EventBus::new(config.realtime.bus_capacity);
        let queue = Arc::new(AttendanceQueue::new(storage.clone(), bus.clone(), config.clone()));
        let responder = Arc::new(MockResponder::with_script(self.script));
        let dispatcher = Arc::new(MockDispatcher::new());
        let streams = RecordingReplyStreams::new();
        let reply_streams = self
            .streams
            .unwrap_or_else(|| Arc::new(streams.clone()) as Arc<dyn ReplyStreams>);

        let mut orchestrator = Orchestrator::new(
            storage.clone(),
            queue.clone(),
            bus.clone(),
            responder.clone(),
            dispatcher.clone(),
            reply_streams,
            config.clone(),
        );
        if self.scoring {
            orchestrator = orchestrator.with_scorer(Arc::new(HeuristicScorer::new()));
        }
        let orchestrator = Arc::new(orchestrator);
        let gateway = Arc::new(IngestionGateway::new(
            storage.clone(),
            AdapterRegistry::with_defaults(),
            config.ingestion.clone(),
        ));

        Ok(TestHarness {
            storage,
            bus,
            queue,
            orchestrator,
            gateway,
            responder,
            dispatcher,
            streams,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete routing stack with mock adapters and temp storage.
pub struct TestHarness {
    pub storage: Arc<dyn StorageAdapter>,
    pub bus: EventBus,
    pub queue: Arc<AttendanceQueue>,
    pub orchestrator: Arc<Orchestrator>,
    pub gateway: Arc<IngestionGateway>,
    pub responder: Arc<MockResponder>,
    pub dispatcher: Arc<MockDispatcher>,
    pub streams: RecordingReplyStreams,
    pub config: Arc<AtriumConfig>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default configuration and the default mock reply.
    pub async fn new() -> Result<Self, AtriumError> {
        Self::builder().build().await
    }

    pub fn tenant() -> TenantId {
        TenantId::from(TENANT)
    }

    /// A fixed Monday afternoon, inside default business hours.
    pub fn clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Registers an active channel for the harness tenant.
    pub async fn channel(&self, channel_type: ChannelType) -> Result<Channel, AtriumError> {
        let mut channel = Channel::new(Self::tenant(), channel_type, "main", "test-secret");
        channel.verify_token = Some("verify-me".into());
        self.storage.create_channel(&channel).await?;
        self.storage
            .set_channel_status(&channel.tenant_id, &channel.id, ChannelStatus::Active)
            .await
    }

    /// Builds a canonical text message as an adapter would.
    pub fn inbound(
        channel: &Channel,
        sender: &str,
        external_message_id: &str,
        text: &str,
    ) -> CanonicalInbound {
        CanonicalInbound {
            tenant_id: channel.tenant_id.clone(),
            channel_id: channel.id.clone(),
            channel_type: channel.channel_type,
            external_contact_id: sender.to_string(),
            contact_name: None,
            contact_phone: None,
            contact_email: None,
            external_message_id: external_message_id.to_string(),
            content: text.to_string(),
            content_type: ContentType::Text,
            media_url: None,
            provider_timestamp: None,
        }
    }

    /// Runs a record straight through the orchestrator.
    pub async fn process(
        &self,
        record: &CanonicalInbound,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, AtriumError> {
        self.orchestrator.process(record, now).await
    }

    /// Accepts a record into the durable inbound queue.
    pub async fn accept(&self, record: &CanonicalInbound, now: DateTime<Utc>) -> Result<(), AtriumError> {
        self.storage
            .accept_inbound(
                record,
                i64::from(self.config.ingestion.max_attempts),
                &format_ts(now),
            )
            .await
            .map(|_| ())
    }

    /// Drains the inbound queue with a single worker until it is empty or
    /// only holds entries scheduled after `now`.
    pub async fn drain(&self, now: DateTime<Utc>) -> Result<usize, AtriumError> {
        let worker = InboundWorker::new(
            0,
            self.storage.clone(),
            self.orchestrator.clone(),
            self.config.ingestion.clone(),
        );
        let mut total = 0;
        loop {
            let handled = worker.drain_once(now).await?;
            if handled == 0 {
                return Ok(total);
            }
            total += handled;
        }
    }

    pub fn operator(id: &str, skills: Vec<ChannelType>) -> Principal {
        Principal {
            tenant_id: Self::tenant(),
            operator_id: OperatorId::from(id),
            name: id.to_string(),
            skills,
        }
    }
}
