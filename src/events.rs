//! Application-wide notifications
//!
//! Used where one part of the client must react to something another part
//! did without a direct call between them (a finished sync refreshing the
//! explorer's tracked-file view).

use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// A backend sync finished; `success` is false when some files failed
    RagSyncCompleted { success: bool },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(16)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Broadcast an event; returns how many subscribers received it
    pub fn emit(&self, event: AppEvent) -> usize {
        match self.tx.send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                debug!("No subscribers for {:?}", event);
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }
}
