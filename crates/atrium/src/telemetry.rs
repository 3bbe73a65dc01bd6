// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus recorder installation and metric descriptions.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use atrium_core::AtriumError;

/// Installs the Prometheus recorder globally. Only one recorder can be
/// installed per process.
pub fn install_recorder() -> Result<PrometheusHandle, AtriumError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AtriumError::Internal(format!("failed to install Prometheus recorder: {e}")))?;
    register_metrics();
    tracing::info!("prometheus metrics recorder installed");
    Ok(handle)
}

fn register_metrics() {
    describe_counter!("atrium_webhooks_total", "Webhook deliveries by channel and outcome");
    describe_counter!("atrium_webhook_duplicates_total", "Webhook records already accepted");
    describe_counter!("atrium_inbound_processed_total", "Inbound queue entries processed by outcome");
    describe_counter!("atrium_messages_total", "Messages appended by direction");
    describe_counter!("atrium_contacts_merged_total", "Identities linked to an existing contact");
    describe_counter!("atrium_handoffs_total", "Attendance items enqueued by handoff reason");
    describe_counter!("atrium_assignments_total", "Assignment attempts by outcome");
    describe_counter!("atrium_sla_breaches_total", "Attendance items that breached their SLA");
    describe_counter!("atrium_idle_closes_total", "Conversations closed by the idle sweep");
    describe_counter!("atrium_responder_failures_total", "Bot responder errors and timeouts");
    describe_counter!("atrium_dispatch_failures_total", "Outbound messages the dispatcher rejected");
    describe_counter!("atrium_bus_published_total", "Events published on the internal bus");
    describe_counter!("atrium_bus_dropped_total", "Bus events skipped by lagging subscribers");
    describe_counter!("atrium_operator_drops_total", "Operator connections dropped on failed sends");
    describe_counter!("atrium_stream_disconnects_total", "End-user reply streams dropped mid-reply");
    describe_gauge!("atrium_operator_connections", "Live operator connections");
    describe_histogram!("atrium_responder_latency_seconds", "Bot reply generation latency");
}
