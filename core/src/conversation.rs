/// One open conversation: fetch, realtime merge, threads, typing and sending
use crate::api::ChatApi;
use crate::config::ClientConfig;
use crate::error::{ChatError, Result};
use crate::message_store::MessageStore;
use crate::messenger_types::{Message, SendMessageRequest, TypingSignal, ViewEvent};
use crate::realtime::{RealtimeHandler, RealtimeSubscription, RealtimeTransport, SubscriptionManager};
use crate::thread_expansion::ThreadExpansion;
use crate::typing::{TypingEmitter, TypingTracker};
use crate::utils::event_emitter::EventEmitter;
use crate::utils::scoped_task::ScopedTask;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

/// Collaborators and timings shared by every view a client opens
pub struct ConversationDeps {
    pub api: Arc<dyn ChatApi>,
    pub subscriptions: SubscriptionManager,
    pub typing_idle_timeout: Duration,
    pub typing_expiry: Duration,
    pub event_buffer: usize,
}

impl ConversationDeps {
    pub fn new(
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn RealtimeTransport>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            api,
            subscriptions: SubscriptionManager::new(transport, config.channel_prefix.clone()),
            typing_idle_timeout: config.typing_idle_timeout,
            typing_expiry: config.typing_expiry,
            event_buffer: config.event_buffer,
        }
    }
}

/// Routes realtime events into the view's state
struct ViewRouter {
    peer_id: String,
    store: Arc<RwLock<MessageStore>>,
    typing: Arc<TypingTracker>,
}

#[async_trait]
impl RealtimeHandler for ViewRouter {
    async fn on_message(&self, message: Message) {
        if !message.involves(&self.peer_id) {
            debug!("Message {} belongs to another conversation", message.id);
            return;
        }
        let outcome = self.store.write().await.apply_incoming(message);
        debug!("Applied realtime message: {:?}", outcome);
    }

    async fn on_typing(&self, signal: TypingSignal) {
        self.typing.handle(&signal).await;
    }
}

/// State of one open peer conversation.
///
/// Every view owns its own store, trackers, timers and subscription; nothing
/// is shared between views. Dropping the view cancels all of them.
pub struct ConversationView {
    current_user_id: String,
    peer_id: String,
    api: Arc<dyn ChatApi>,
    subscriptions: SubscriptionManager,
    store: Arc<RwLock<MessageStore>>,
    threads: Arc<Mutex<ThreadExpansion>>,
    typing: Arc<TypingTracker>,
    emitter: TypingEmitter,
    reply_target: Option<String>,
    events: EventEmitter,
    subscription: Option<RealtimeSubscription>,
    fetch: Option<ScopedTask>,
}

impl ConversationView {
    /// Start the initial fetch and subscribe to the user's channel
    pub async fn open(
        deps: &ConversationDeps,
        current_user_id: impl Into<String>,
        peer_id: impl Into<String>,
    ) -> Result<Self> {
        let current_user_id = current_user_id.into();
        let peer_id = peer_id.into();

        let events = EventEmitter::new(deps.event_buffer);
        let store = Arc::new(RwLock::new(MessageStore::new(events.clone())));
        let typing = Arc::new(TypingTracker::new(
            current_user_id.clone(),
            deps.typing_expiry,
            events.clone(),
        ));
        let threads = Arc::new(Mutex::new(ThreadExpansion::new(events.clone())));
        let emitter = TypingEmitter::new(deps.api.clone(), peer_id.clone(), deps.typing_idle_timeout);

        let fetch = ScopedTask::spawn(initial_fetch(
            deps.api.clone(),
            peer_id.clone(),
            Arc::downgrade(&store),
            Arc::downgrade(&threads),
        ));

        let router = Arc::new(ViewRouter {
            peer_id: peer_id.clone(),
            store: store.clone(),
            typing: typing.clone(),
        });
        let subscription = deps.subscriptions.open(&current_user_id, router).await?;
        info!("Opened conversation with {} as {}", peer_id, current_user_id);

        Ok(Self {
            current_user_id,
            peer_id,
            api: deps.api.clone(),
            subscriptions: deps.subscriptions.clone(),
            store,
            threads,
            typing,
            emitter,
            reply_target: None,
            events,
            subscription: Some(subscription),
            fetch: Some(fetch),
        })
    }

    pub fn current_user_id(&self) -> &str {
        &self.current_user_id
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Change notifications, one per state mutation
    pub fn events(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    /// True once the initial fetch finished, whatever its outcome
    pub fn is_loaded(&self) -> bool {
        self.fetch.as_ref().map_or(true, ScopedTask::is_finished)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(RealtimeSubscription::is_active)
    }

    /// Top-level messages in arrival order
    pub async fn messages(&self) -> Vec<Message> {
        self.store.read().await.messages().to_vec()
    }

    pub async fn message(&self, id: &str) -> Option<Message> {
        self.store.read().await.get(id).cloned()
    }

    /// Fetch the thread again and replace the local state
    pub async fn refresh(&mut self) -> Result<()> {
        let messages = self.api.fetch_thread(&self.peer_id).await?;
        let mut store = self.store.write().await;
        store.initialize(messages);
        lock_threads(&self.threads).retain_known(|id| store.contains(id));
        Ok(())
    }

    /// Expand or collapse a loaded message's replies; `None` for unknown ids
    pub async fn toggle_thread(&mut self, message_id: &str) -> Option<bool> {
        let store = self.store.read().await;
        if !store.contains(message_id) {
            return None;
        }
        Some(lock_threads(&self.threads).toggle(message_id))
    }

    pub fn is_expanded(&self, message_id: &str) -> bool {
        lock_threads(&self.threads).is_expanded(message_id)
    }

    /// Display names of peers currently typing
    pub async fn typing_users(&self) -> Vec<String> {
        self.typing.typing_users().await
    }

    /// Composer keystroke
    pub async fn on_input(&self) {
        self.emitter.on_local_input_activity().await;
    }

    pub async fn is_typing(&self) -> bool {
        self.emitter.is_typing().await
    }

    /// Select a loaded top-level message to reply to, or clear the selection
    pub async fn set_reply_target(&mut self, message_id: Option<&str>) -> Result<()> {
        if let Some(id) = message_id {
            let store = self.store.read().await;
            if !store.contains(id) {
                return Err(ChatError::UnknownMessage(id.to_string()));
            }
        }
        self.update_reply_target(message_id.map(str::to_string));
        Ok(())
    }

    pub fn reply_target(&self) -> Option<&str> {
        self.reply_target.as_deref()
    }

    fn update_reply_target(&mut self, target: Option<String>) {
        if self.reply_target != target {
            self.reply_target = target.clone();
            self.events
                .emit(ViewEvent::ReplyTargetChanged { message_id: target });
        }
    }

    /// Post a message to the peer, as a reply when a target is selected.
    ///
    /// Nothing is appended locally; the message comes back on the realtime
    /// channel. On failure the error is returned and no state changes.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let request = SendMessageRequest {
            receiver_id: self.peer_id.clone(),
            text: text.to_string(),
            parent_id: self.reply_target.clone(),
        };
        if let Err(e) = self.api.send_message(&request).await {
            error!("Error sending message: {}", e);
            return Err(e);
        }

        self.update_reply_target(None);
        self.emitter.on_message_sent().await;
        Ok(())
    }

    /// Re-subscribe after the local user changed.
    ///
    /// The new channel is opened first; if that fails the view keeps its
    /// current user and subscription.
    pub async fn switch_user(&mut self, user_id: impl Into<String>) -> Result<()> {
        let user_id = user_id.into();
        if user_id == self.current_user_id {
            return Ok(());
        }

        let router = Arc::new(ViewRouter {
            peer_id: self.peer_id.clone(),
            store: self.store.clone(),
            typing: self.typing.clone(),
        });
        let subscription = self.subscriptions.open(&user_id, router).await?;

        if let Some(previous) = self.subscription.replace(subscription) {
            if let Err(e) = previous.close().await {
                warn!("Failed to close subscription: {}", e);
            }
        }
        self.typing.shutdown().await;
        self.typing.set_current_user(user_id.clone()).await;
        info!("Conversation with {} now follows {}", self.peer_id, user_id);
        self.current_user_id = user_id;
        Ok(())
    }

    /// Release the subscription and cancel every timer and pending fetch
    pub async fn close(mut self) -> Result<()> {
        if let Some(fetch) = self.fetch.take() {
            fetch.cancel();
        }
        self.typing.shutdown().await;
        info!("Closing conversation with {}", self.peer_id);
        match self.subscription.take() {
            Some(subscription) => subscription.close().await,
            None => Ok(()),
        }
    }
}

fn lock_threads(threads: &Mutex<ThreadExpansion>) -> MutexGuard<'_, ThreadExpansion> {
    threads.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn initial_fetch(
    api: Arc<dyn ChatApi>,
    peer_id: String,
    store: Weak<RwLock<MessageStore>>,
    threads: Weak<Mutex<ThreadExpansion>>,
) {
    let messages = match api.fetch_thread(&peer_id).await {
        Ok(messages) => messages,
        Err(e) => {
            error!("Error fetching messages: {}", e);
            return;
        }
    };

    let (Some(store), Some(threads)) = (store.upgrade(), threads.upgrade()) else {
        debug!("Conversation with {} closed before its thread loaded", peer_id);
        return;
    };
    let mut store = store.write().await;
    store.initialize(messages);
    // Threads toggled on realtime messages the fetch replaced are forgotten
    lock_threads(&threads).retain_known(|id| store.contains(id));
}
