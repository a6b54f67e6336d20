// Record notification sink. Explicitly constructed and injected so engine
// instances never share listener state; delivery is best-effort and never
// blocks or fails the aggregation pipeline.

use crate::models::{Packet, RecordEvent};
use tokio::sync::broadcast;

/// Consumer of newly created aggregated records. `notify` must not block;
/// a failed delivery is the implementation's problem, never the caller's.
pub trait RecordNotifier: Send + Sync {
    fn notify(&self, record: &Packet, destination: &str);
}

/// Broadcast-backed notifier feeding the /ws/records subscribers.
/// Slow subscribers may lag and drop events.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<RecordEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn sender(&self) -> broadcast::Sender<RecordEvent> {
        self.tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.tx.subscribe()
    }
}

impl RecordNotifier for BroadcastNotifier {
    fn notify(&self, record: &Packet, destination: &str) {
        let event = RecordEvent {
            record: record.clone(),
            destination: destination.to_string(),
        };
        if self.tx.send(event).is_err() {
            tracing::debug!(destination, "new record not delivered; no active subscribers");
        }
    }
}

/// Discards every notification. For runs where nobody is listening.
pub struct NullNotifier;

impl RecordNotifier for NullNotifier {
    fn notify(&self, _record: &Packet, _destination: &str) {}
}
