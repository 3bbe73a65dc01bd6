// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Atrium routing engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use atrium_core::types::{ChannelType, TenantId};
use serde::{Deserialize, Serialize};

/// Top-level Atrium configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AtriumConfig {
    #[serde(default)]
    pub log: LogConfig,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Webhook verification and inbound retry queue settings.
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Bot responder settings.
    #[serde(default)]
    pub responder: ResponderConfig,

    /// Default routing policy applied to every tenant.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Realtime fan-out buffers and timers.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Per-tenant routing overrides.
    #[serde(default)]
    pub tenants: Vec<TenantOverride>,

    /// Static operator tokens.
    #[serde(default)]
    pub operators: Vec<OperatorConfig>,
}

impl AtriumConfig {
    /// Resolves the effective routing policy for a tenant by overlaying its
    /// `[[tenants]]` entry, if any, onto the `[routing]` defaults.
    pub fn routing_for(&self, tenant_id: &TenantId) -> RoutingPolicy {
        let base = RoutingPolicy::from(&self.routing);
        match self.tenants.iter().find(|t| t.id == tenant_id.as_str()) {
            Some(over) => base.overlay(over),
            None => base,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted webhook body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL mode for concurrent readers.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("atrium").join("atrium.db").display().to_string())
        .unwrap_or_else(|| "atrium.db".to_string())
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestionConfig {
    /// Budget for verification, normalization and acceptance of one delivery.
    /// Past it the provider is told to retry.
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,

    /// Consecutive rejected deliveries before a channel flips to `error`.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Concurrent inbound processing workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Entries claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Attempts before an inbound entry is parked as `failed`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay; doubles on every attempt.
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,

    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,

    /// How long a claimed entry stays locked before another worker may
    /// reclaim it. Must cover a whole batch: `batch_size` entries each
    /// waiting up to `responder.timeout_secs`.
    #[serde(default = "default_lock_secs")]
    pub lock_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            verify_timeout_ms: default_verify_timeout_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            workers: default_workers(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_base_secs: default_retry_base_secs(),
            retry_max_secs: default_retry_max_secs(),
            lock_secs: default_lock_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_verify_timeout_ms() -> u64 {
    2_000
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_workers() -> usize {
    4
}

fn default_batch_size() -> u32 {
    8
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_secs() -> u64 {
    2
}

fn default_retry_max_secs() -> u64 {
    300
}

fn default_lock_secs() -> u64 {
    180
}

fn default_poll_interval_ms() -> u64 {
    250
}

/// Which bot responder backs automated replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderKind {
    /// Streaming HTTP endpoint (server-sent events).
    Http,
    /// No responder: every conversation degrades to the human queue.
    #[default]
    Disabled,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResponderConfig {
    #[serde(default)]
    pub kind: ResponderKind,

    /// Endpoint URL for the `http` responder.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token sent to the responder endpoint.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Generation budget; past it the conversation is handed to a human.
    #[serde(default = "default_responder_timeout_secs")]
    pub timeout_secs: u64,

    /// Recent messages passed as context.
    #[serde(default = "default_history_messages")]
    pub history_messages: u32,
}

impl std::fmt::Debug for ResponderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderConfig")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("history_messages", &self.history_messages)
            .finish()
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            kind: ResponderKind::default(),
            endpoint: None,
            api_key: None,
            timeout_secs: default_responder_timeout_secs(),
            history_messages: default_history_messages(),
        }
    }
}

fn default_responder_timeout_secs() -> u64 {
    20
}

fn default_history_messages() -> u32 {
    10
}

/// Weekly opening window, evaluated in a fixed UTC offset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusinessHoursConfig {
    /// Offset from UTC in minutes (e.g. -180 for UTC-3).
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Open days as three-letter names (`mon` .. `sun`).
    #[serde(default = "default_business_days")]
    pub days: Vec<String>,

    /// Opening hour, inclusive (0-23).
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,

    /// Closing hour, exclusive (1-24).
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,
}

impl Default for BusinessHoursConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            days: default_business_days(),
            open_hour: default_open_hour(),
            close_hour: default_close_hour(),
        }
    }
}

fn default_business_days() -> Vec<String> {
    ["mon", "tue", "wed", "thu", "fri"]
        .iter()
        .map(|d| d.to_string())
        .collect()
}

fn default_open_hour() -> u32 {
    8
}

fn default_close_hour() -> u32 {
    18
}

pub(crate) const DAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Tenant-wide routing defaults (`[routing]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// When false, every inbound message goes straight to the human queue.
    #[serde(default = "default_true")]
    pub bot_enabled: bool,

    /// Words or phrases that request a human attendant.
    #[serde(default = "default_transfer_keywords")]
    pub transfer_keywords: Vec<String>,

    /// Consecutive fallback replies before handoff.
    #[serde(default = "default_max_bot_failures")]
    pub max_bot_failures: u32,

    /// Route to humans outside business hours instead of the bot.
    #[serde(default)]
    pub after_hours_to_human: bool,

    /// Opening window. Absent means always open.
    #[serde(default)]
    pub business_hours: Option<BusinessHoursConfig>,

    /// Maximum wait in the queue before the item is flagged as breached.
    #[serde(default = "default_sla_max_wait_secs")]
    pub sla_max_wait_secs: u64,

    /// Minutes without inbound messages before an attended conversation is closed.
    #[serde(default = "default_idle_timeout_mins")]
    pub idle_timeout_mins: u64,

    /// Emit a satisfaction survey event on close.
    #[serde(default)]
    pub survey_on_close: bool,

    #[serde(default)]
    pub default_priority: i64,

    /// Interval between SLA and idle sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            bot_enabled: true,
            transfer_keywords: default_transfer_keywords(),
            max_bot_failures: default_max_bot_failures(),
            after_hours_to_human: false,
            business_hours: None,
            sla_max_wait_secs: default_sla_max_wait_secs(),
            idle_timeout_mins: default_idle_timeout_mins(),
            survey_on_close: false,
            default_priority: 0,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_transfer_keywords() -> Vec<String> {
    ["atendente", "humano", "falar com uma pessoa"]
        .iter()
        .map(|k| k.to_string())
        .collect()
}

fn default_max_bot_failures() -> u32 {
    3
}

fn default_sla_max_wait_secs() -> u64 {
    300
}

fn default_idle_timeout_mins() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    15
}

/// Per-tenant overrides (`[[tenants]]`). Unset fields inherit `[routing]`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TenantOverride {
    pub id: String,
    #[serde(default)]
    pub bot_enabled: Option<bool>,
    #[serde(default)]
    pub transfer_keywords: Option<Vec<String>>,
    #[serde(default)]
    pub max_bot_failures: Option<u32>,
    #[serde(default)]
    pub after_hours_to_human: Option<bool>,
    #[serde(default)]
    pub business_hours: Option<BusinessHoursConfig>,
    #[serde(default)]
    pub sla_max_wait_secs: Option<u64>,
    #[serde(default)]
    pub idle_timeout_mins: Option<u64>,
    #[serde(default)]
    pub survey_on_close: Option<bool>,
    #[serde(default)]
    pub default_priority: Option<i64>,
}

/// Effective routing policy for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPolicy {
    pub bot_enabled: bool,
    pub transfer_keywords: Vec<String>,
    pub max_bot_failures: u32,
    pub after_hours_to_human: bool,
    pub business_hours: Option<BusinessHoursConfig>,
    pub sla_max_wait_secs: u64,
    pub idle_timeout_mins: u64,
    pub survey_on_close: bool,
    pub default_priority: i64,
}

impl From<&RoutingConfig> for RoutingPolicy {
    fn from(r: &RoutingConfig) -> Self {
        Self {
            bot_enabled: r.bot_enabled,
            transfer_keywords: r.transfer_keywords.clone(),
            max_bot_failures: r.max_bot_failures,
            after_hours_to_human: r.after_hours_to_human,
            business_hours: r.business_hours.clone(),
            sla_max_wait_secs: r.sla_max_wait_secs,
            idle_timeout_mins: r.idle_timeout_mins,
            survey_on_close: r.survey_on_close,
            default_priority: r.default_priority,
        }
    }
}

impl RoutingPolicy {
    fn overlay(mut self, over: &TenantOverride) -> Self {
        if let Some(v) = over.bot_enabled {
            self.bot_enabled = v;
        }
        if let Some(v) = &over.transfer_keywords {
            self.transfer_keywords = v.clone();
        }
        if let Some(v) = over.max_bot_failures {
            self.max_bot_failures = v;
        }
        if let Some(v) = over.after_hours_to_human {
            self.after_hours_to_human = v;
        }
        if let Some(v) = &over.business_hours {
            self.business_hours = Some(v.clone());
        }
        if let Some(v) = over.sla_max_wait_secs {
            self.sla_max_wait_secs = v;
        }
        if let Some(v) = over.idle_timeout_mins {
            self.idle_timeout_mins = v;
        }
        if let Some(v) = over.survey_on_close {
            self.survey_on_close = v;
        }
        if let Some(v) = over.default_priority {
            self.default_priority = v;
        }
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RealtimeConfig {
    /// Capacity of the internal event bus. Lagging subscribers lose the oldest events.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Per-operator-connection outbound buffer. A full buffer drops the connection.
    #[serde(default = "default_operator_buffer")]
    pub operator_buffer: usize,

    /// Per-end-user-stream buffer.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,

    /// How long a producer waits for space in a full end-user stream buffer
    /// before treating the client as disconnected.
    #[serde(default = "default_stream_send_timeout_ms")]
    pub stream_send_timeout_ms: u64,

    /// Keep-alive interval on websocket and SSE transports.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Maximum lifetime of an end-user stream connection.
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            bus_capacity: default_bus_capacity(),
            operator_buffer: default_operator_buffer(),
            stream_buffer: default_stream_buffer(),
            stream_send_timeout_ms: default_stream_send_timeout_ms(),
            heartbeat_secs: default_heartbeat_secs(),
            stream_timeout_secs: default_stream_timeout_secs(),
        }
    }
}

fn default_bus_capacity() -> usize {
    1024
}

fn default_operator_buffer() -> usize {
    256
}

fn default_stream_buffer() -> usize {
    64
}

fn default_stream_send_timeout_ms() -> u64 {
    2_000
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_stream_timeout_secs() -> u64 {
    1_800
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Score at which a `lead` contact is promoted to `qualified`.
    #[serde(default = "default_qualify_threshold")]
    pub qualify_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            qualify_threshold: default_qualify_threshold(),
        }
    }
}

fn default_qualify_threshold() -> f64 {
    70.0
}

/// A statically provisioned operator (`[[operators]]`).
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorConfig {
    /// Bearer token presented by the operator console.
    pub token: String,
    pub tenant_id: String,
    pub operator_id: String,
    #[serde(default)]
    pub name: String,
    /// Channel types this operator attends. Empty means all.
    #[serde(default)]
    pub skills: Vec<ChannelType>,
}

impl std::fmt::Debug for OperatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorConfig")
            .field("token", &"[redacted]")
            .field("tenant_id", &self.tenant_id)
            .field("operator_id", &self.operator_id)
            .field("name", &self.name)
            .field("skills", &self.skills)
            .finish()
    }
}
