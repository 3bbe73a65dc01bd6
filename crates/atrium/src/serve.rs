// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `atrium serve` implementation.
//!
//! Wires storage, the event bus, the attendance queue, the orchestrator
//! and its workers, and the HTTP gateway, then runs until a shutdown
//! signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use atrium_agent::shutdown::{drain_tasks, install_signal_handler};
use atrium_agent::sweeper::run_sweeper;
use atrium_agent::worker::spawn_workers;
use atrium_agent::{HeuristicScorer, Orchestrator};
use atrium_bus::EventBus;
use atrium_config::model::AtriumConfig;
use atrium_core::{AtriumError, PluginAdapter, StorageAdapter};
use atrium_gateway::{
    ConnectionRegistry, GatewayState, HealthState, SessionStreams, StaticTokenAuth, run_fanout,
    start_server,
};
use atrium_ingest::{AdapterRegistry, IngestionGateway};
use atrium_queue::AttendanceQueue;
use atrium_storage::SqliteStorage;

use crate::dispatch::LogDispatcher;

/// Grace period for background tasks after the listener stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the routing engine until SIGTERM/SIGINT.
pub async fn run_serve(config: AtriumConfig) -> Result<(), AtriumError> {
    init_tracing(&config.log.level);

    info!(
        host = %config.server.host,
        port = config.server.port,
        database = %config.storage.database_path,
        workers = config.ingestion.workers,
        "starting atrium serve"
    );

    let cancel = install_signal_handler();

    let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> =
        match crate::telemetry::install_recorder() {
            Ok(handle) => Some(Arc::new(move || handle.render())),
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        };

    let sqlite = SqliteStorage::new(config.storage.clone());
    sqlite.initialize().await?;
    let storage: Arc<dyn StorageAdapter> = Arc::new(sqlite);
    info!("storage initialized");

    let config = Arc::new(config);
    let bus = EventBus::new(config.realtime.bus_capacity);
    let queue = Arc::new(AttendanceQueue::new(storage.clone(), bus.clone(), config.clone()));

    let responder = atrium_responder::from_config(&config.responder).inspect_err(|e| {
        error!(error = %e, "failed to initialize bot responder");
    })?;
    info!(responder = responder.name(), "bot responder ready");

    let streams = Arc::new(SessionStreams::new(&config.realtime));
    let mut orchestrator = Orchestrator::new(
        storage.clone(),
        queue.clone(),
        bus.clone(),
        responder.clone(),
        Arc::new(LogDispatcher),
        streams.clone(),
        config.clone(),
    );
    if config.scoring.enabled {
        orchestrator = orchestrator.with_scorer(Arc::new(HeuristicScorer::new()));
        info!(threshold = config.scoring.qualify_threshold, "lead scoring enabled");
    } else {
        info!("lead scoring disabled by configuration");
    }
    let orchestrator = Arc::new(orchestrator);

    let ingest = Arc::new(IngestionGateway::new(
        storage.clone(),
        AdapterRegistry::with_defaults(),
        config.ingestion.clone(),
    ));

    if config.operators.is_empty() {
        warn!("no operators configured; operator API and WebSocket will reject every token");
    }
    let registry = Arc::new(ConnectionRegistry::new(config.realtime.operator_buffer));

    let mut tasks = spawn_workers(storage.clone(), orchestrator.clone(), &config.ingestion, &cancel);
    tasks.push(tokio::spawn(run_sweeper(
        queue.clone(),
        Duration::from_secs(config.routing.sweep_interval_secs.max(1)),
        cancel.child_token(),
    )));
    tasks.push(tokio::spawn(run_fanout(
        registry.clone(),
        bus.subscribe("operator-fanout"),
        cancel.child_token(),
    )));
    info!(tasks = tasks.len(), "background tasks started");

    let state = GatewayState {
        storage: storage.clone(),
        ingest,
        queue,
        orchestrator,
        auth: Arc::new(StaticTokenAuth::from_config(&config.operators)),
        registry,
        streams,
        config: config.clone(),
        health: HealthState::new(prometheus_render),
    };

    let served = start_server(&config.server, state, cancel.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "gateway server failed");
    }

    cancel.cancel();
    drain_tasks(tasks, DRAIN_TIMEOUT).await;

    if let Err(e) = responder.shutdown().await {
        warn!(error = %e, "responder shutdown failed");
    }
    if let Err(e) = storage.close().await {
        warn!(error = %e, "storage close failed");
    }

    info!("atrium serve shutdown complete");
    served
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("ATRIUM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(format!("atrium={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
