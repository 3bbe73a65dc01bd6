// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process event bus.
//!
//! A bounded broadcast channel carries [`BusEvent`]s from the queue and the
//! orchestrator to the realtime gateway and the sweepers. Publishing never
//! blocks: when a subscriber falls behind, the oldest events are dropped for
//! that subscriber only and the gap is logged and counted.

use std::sync::Arc;

use atrium_core::BusEvent;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Cloneable handle to the shared bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<BusEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every current subscriber. Returns the number
    /// of subscribers that will see it.
    pub fn publish(&self, event: BusEvent) -> usize {
        let tenant = event.tenant_id().clone();
        match self.tx.send(Arc::new(event)) {
            Ok(receivers) => {
                metrics::counter!("atrium_bus_published_total").increment(1);
                receivers
            }
            Err(_) => {
                trace!(tenant_id = %tenant, "bus event published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self, name: &'static str) -> BusSubscriber {
        BusSubscriber {
            name,
            rx: self.tx.subscribe(),
            dropped: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving half of the bus for one consumer.
pub struct BusSubscriber {
    name: &'static str,
    rx: broadcast::Receiver<Arc<BusEvent>>,
    dropped: u64,
}

impl BusSubscriber {
    /// Waits for the next event. Lag is absorbed: skipped events are
    /// logged and counted, then delivery resumes from the oldest retained
    /// event. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Arc<BusEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.dropped += skipped;
                    warn!(subscriber = self.name, skipped, "bus subscriber lagged, events dropped");
                    metrics::counter!("atrium_bus_dropped_total", "subscriber" => self.name)
                        .increment(skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Total events this subscriber has missed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
