// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bus-to-operator fan-out task.

use std::sync::Arc;

use atrium_bus::BusSubscriber;
use atrium_core::BusEvent;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::ConnectionRegistry;

/// Forwards committed operator events to live connections in commit order
/// until cancelled or the bus closes, then tears the registry down.
pub async fn run_fanout(
    registry: Arc<ConnectionRegistry>,
    mut subscriber: BusSubscriber,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = subscriber.recv() => event,
        };
        let Some(event) = event else { break };
        match event.as_ref() {
            BusEvent::Operator { tenant_id, event } => {
                let delivered = registry.broadcast(tenant_id, event);
                debug!(tenant_id = %tenant_id, conversation_id = %event.conversation_id(), delivered, "operator event fanned out");
            }
            BusEvent::SlaBreached { tenant_id, item } => {
                debug!(tenant_id = %tenant_id, item_id = %item.id, "sla breach observed");
            }
            BusEvent::SurveyRequested {
                tenant_id,
                conversation_id,
                contact_id,
                channel_id,
            } => {
                info!(
                    tenant_id = %tenant_id,
                    conversation_id = %conversation_id,
                    contact_id = %contact_id,
                    channel_id = %channel_id,
                    "satisfaction survey requested"
                );
            }
        }
    }
    registry.clear();
    debug!(dropped = subscriber.dropped(), "operator fan-out stopped");
}
