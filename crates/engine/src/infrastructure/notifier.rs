//! Completion notifications over a tokio broadcast channel.

use tokio::sync::broadcast;

use crate::infrastructure::ports::{CompletionNotifier, FinalizationCompleted};

const DEFAULT_CAPACITY: usize = 64;

/// Broadcasts finalization events to any number of listeners.
///
/// Progression trackers and audit logs subscribe; the engine never waits
/// for them.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<FinalizationCompleted>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FinalizationCompleted> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionNotifier for BroadcastNotifier {
    fn notify(&self, event: FinalizationCompleted) -> usize {
        let record_id = event.record.id;
        match self.sender.send(event) {
            Ok(listeners) => listeners,
            Err(_) => {
                tracing::warn!(
                    record_id = %record_id,
                    "Finalization completed with no listeners"
                );
                0
            }
        }
    }
}
