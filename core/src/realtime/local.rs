/// In-process pub/sub bus
use super::RealtimeTransport;
use crate::error::Result;
use crate::messenger_types::RawEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// `RealtimeTransport` backed by in-memory channels
#[derive(Default)]
pub struct LocalBus {
    channels: Mutex<HashMap<String, mpsc::UnboundedSender<RawEvent>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event; returns false when nobody listens on `channel`
    pub fn publish(&self, channel: &str, event: &str, data: serde_json::Value) -> bool {
        let mut channels = self.lock();
        let Some(tx) = channels.get(channel) else {
            debug!("No subscriber on {}", channel);
            return false;
        };
        if tx.send(RawEvent::new(event, data)).is_err() {
            channels.remove(channel);
            return false;
        }
        true
    }

    /// True while a live receiver listens on `channel`
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.lock().get(channel).is_some_and(|tx| !tx.is_closed())
    }

    pub fn subscriber_count(&self) -> usize {
        let mut channels = self.lock();
        channels.retain(|_, tx| !tx.is_closed());
        channels.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<RawEvent>>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RealtimeTransport for LocalBus {
    async fn subscribe(&self, channel: &str) -> Result<mpsc::UnboundedReceiver<RawEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.lock().insert(channel.to_string(), tx).is_some() {
            warn!("Replacing existing subscriber on {}", channel);
        }
        Ok(rx)
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.lock().remove(channel);
        Ok(())
    }
}
