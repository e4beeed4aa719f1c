//! Lifecycle events and notification sinks
//!
//! Every lifecycle transition emits exactly one `LifecycleEvent`. Sinks are
//! synchronous and must not block: the orchestrator calls them while it
//! holds the lifecycle's state lock, so events arrive in transition order.

use crate::error::BridgeError;
use crate::lifecycle::StateKind;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

/// One observed transition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub lifecycle_id: Uuid,
    pub previous: StateKind,
    pub state: StateKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BridgeError>,
}

/// Receives lifecycle events
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &LifecycleEvent);
}

/// Logs every event and records transition metrics
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: &LifecycleEvent) {
        crate::metrics::record_transition(event.state);

        match &event.error {
            Some(error) => {
                crate::metrics::record_failure(error.kind());
                warn!(
                    lifecycle = %event.lifecycle_id,
                    from = %event.previous,
                    to = %event.state,
                    kind = error.kind(),
                    tx_hash = ?event.tx_hash,
                    "Lifecycle failed: {}",
                    error
                );
            }
            None => info!(
                lifecycle = %event.lifecycle_id,
                from = %event.previous,
                to = %event.state,
                tx_hash = ?event.tx_hash,
                "Lifecycle transition"
            ),
        }
    }
}

/// Fans events out to async subscribers (API streams, tests)
pub struct BroadcastSink {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, event: &LifecycleEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event.clone());
    }
}

/// Forwards each event to several sinks, in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanoutSink {
    fn notify(&self, event: &LifecycleEvent) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}
