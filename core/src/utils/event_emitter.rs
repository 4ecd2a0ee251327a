/// Change notifications for the presentation layer
use crate::messenger_types::ViewEvent;
use tokio::sync::broadcast;
use tracing::trace;

pub struct EventEmitter {
    tx: broadcast::Sender<ViewEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; having no listeners is not an error
    pub fn emit(&self, event: ViewEvent) {
        if self.tx.send(event).is_err() {
            trace!("view event dropped, no listeners");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.tx.subscribe()
    }
}

impl Clone for EventEmitter {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
