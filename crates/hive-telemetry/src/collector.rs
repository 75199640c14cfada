//! Event collector

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::OrchestratorEvent;

/// Collector for orchestration events
///
/// Broadcasts events to subscribers. If nothing is subscribed, events are
/// dropped; `emit` never blocks the caller.
#[derive(Clone)]
pub struct EventCollector {
    sender: Arc<broadcast::Sender<OrchestratorEvent>>,
}

impl EventCollector {
    /// Create a new collector with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Emit an event to all subscribers, best-effort
    pub fn emit(&self, event: OrchestratorEvent) {
        tracing::trace!(agent_id = %event.agent_id(), "Orchestrator event emitted");

        // Ignore if no receivers
        let _ = self.sender.send(event);
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new(1000)
    }
}
