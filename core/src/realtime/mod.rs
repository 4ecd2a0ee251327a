/// Realtime subscription to the per-user pub/sub channel
pub mod local;
pub mod pusher;

use crate::error::Result;
use crate::messenger_types::{Message, RawEvent, RealtimeEvent, TypingSignal};
use crate::utils::scoped_task::ScopedTask;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub use local::LocalBus;
pub use pusher::PusherTransport;

/// Deterministic channel name for a user, e.g. `chat_42`
pub fn channel_name(prefix: &str, user_id: &str) -> String {
    format!("{}{}", prefix, user_id)
}

/// A pub/sub service delivering raw events per channel
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<mpsc::UnboundedReceiver<RawEvent>>;

    async fn unsubscribe(&self, channel: &str) -> Result<()>;
}

/// Receives decoded events from a subscription
#[async_trait]
pub trait RealtimeHandler: Send + Sync {
    async fn on_message(&self, message: Message);

    async fn on_typing(&self, signal: TypingSignal);
}

/// Opens per-user subscriptions on a transport.
///
/// Callers must close a user's subscription before opening another one for
/// the same user; this is not checked.
pub struct SubscriptionManager {
    transport: Arc<dyn RealtimeTransport>,
    prefix: String,
}

impl SubscriptionManager {
    pub fn new(transport: Arc<dyn RealtimeTransport>, prefix: impl Into<String>) -> Self {
        Self {
            transport,
            prefix: prefix.into(),
        }
    }

    /// Subscribe to `current_user_id`'s channel and route its events to `handler`
    pub async fn open(
        &self,
        current_user_id: &str,
        handler: Arc<dyn RealtimeHandler>,
    ) -> Result<RealtimeSubscription> {
        let channel = channel_name(&self.prefix, current_user_id);
        let rx = self.transport.subscribe(&channel).await?;
        info!("Subscribed to {}", channel);

        let dispatcher = ScopedTask::spawn(dispatch(channel.clone(), rx, handler));
        Ok(RealtimeSubscription {
            channel,
            user_id: current_user_id.to_string(),
            transport: self.transport.clone(),
            dispatcher: Some(dispatcher),
        })
    }
}

impl Clone for SubscriptionManager {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

/// A live subscription.
///
/// Dropping it unbinds the handlers; the transport prunes the dropped receiver
/// without sending an unsubscribe, so a replacement subscription on the same
/// channel is never torn down by a late release.
pub struct RealtimeSubscription {
    channel: String,
    user_id: String,
    transport: Arc<dyn RealtimeTransport>,
    dispatcher: Option<ScopedTask>,
}

impl RealtimeSubscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// False once the transport ended the stream
    pub fn is_active(&self) -> bool {
        self.dispatcher.as_ref().is_some_and(|d| !d.is_finished())
    }

    /// Unbind the handlers and release the channel
    pub async fn close(mut self) -> Result<()> {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.cancel();
        }
        info!("Unsubscribing from {}", self.channel);
        self.transport.unsubscribe(&self.channel).await
    }
}

async fn dispatch(
    channel: String,
    mut rx: mpsc::UnboundedReceiver<RawEvent>,
    handler: Arc<dyn RealtimeHandler>,
) {
    while let Some(raw) = rx.recv().await {
        match RealtimeEvent::decode(&raw) {
            Ok(RealtimeEvent::Message(message)) => handler.on_message(message).await,
            Ok(RealtimeEvent::Typing(signal)) => handler.on_typing(signal).await,
            Err(e) => debug!("Dropping event on {}: {}", channel, e),
        }
    }
    debug!("Realtime stream for {} ended", channel);
}
