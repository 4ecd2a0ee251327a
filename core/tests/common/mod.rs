#![allow(dead_code)]

use async_trait::async_trait;
use chatline_core::api::ChatApi;
use chatline_core::messenger_types::{
    ConversationSummary, Message, MessageCounts, SendMessageRequest, TypingRequest, User,
};
use chatline_core::messenger_types::RawEvent;
use chatline_core::realtime::{LocalBus, RealtimeTransport, SubscriptionManager};
use chatline_core::{ChatError, ConversationDeps, Result};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Chat API double that records every call
#[derive(Default)]
pub struct MockApi {
    pub thread: Mutex<Vec<Message>>,
    pub fetch_delay: Duration,
    pub fetches: Mutex<usize>,
    pub sent: Mutex<Vec<SendMessageRequest>>,
    pub typing: Mutex<Vec<bool>>,
    pub fail_send: AtomicBool,
}

impl MockApi {
    pub fn with_thread(messages: Vec<Message>) -> Self {
        Self {
            thread: Mutex::new(messages),
            ..Default::default()
        }
    }

    pub fn typing_flags(&self) -> Vec<bool> {
        self.typing.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<SendMessageRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn fetch_thread(&self, _peer_id: &str) -> Result<Vec<Message>> {
        *self.fetches.lock().unwrap() += 1;
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        Ok(self.thread.lock().unwrap().clone())
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<()> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ChatError::Api {
                status: 500,
                message: "send failed".to_string(),
            });
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn send_typing(&self, request: TypingRequest<'_>) -> Result<()> {
        self.typing.lock().unwrap().push(request.is_typing);
        Ok(())
    }

    async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        Ok(Vec::new())
    }

    async fn search_users(&self, _query: &str) -> Result<Vec<User>> {
        Ok(Vec::new())
    }

    async fn current_user(&self) -> Result<User> {
        Ok(User {
            id: ME.to_string(),
            username: "me".to_string(),
        })
    }
}

pub const ME: &str = "u1";
pub const PEER: &str = "u2";

/// Bus wrapper whose subscribes start failing after `allowed` successes
pub struct FailingTransport {
    pub bus: Arc<LocalBus>,
    pub allowed: usize,
    pub subscribes: AtomicUsize,
}

impl FailingTransport {
    pub fn new(bus: Arc<LocalBus>, allowed: usize) -> Self {
        Self {
            bus,
            allowed,
            subscribes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RealtimeTransport for FailingTransport {
    async fn subscribe(&self, channel: &str) -> Result<mpsc::UnboundedReceiver<RawEvent>> {
        if self.subscribes.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(ChatError::Subscription(format!("{} refused", channel)));
        }
        self.bus.subscribe(channel).await
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.bus.unsubscribe(channel).await
    }
}

pub fn deps(api: Arc<MockApi>, bus: Arc<LocalBus>) -> ConversationDeps {
    deps_with(api, bus)
}

pub fn deps_with(api: Arc<MockApi>, transport: Arc<dyn RealtimeTransport>) -> ConversationDeps {
    ConversationDeps {
        api,
        subscriptions: SubscriptionManager::new(transport, "chat_"),
        typing_idle_timeout: Duration::from_secs(2),
        typing_expiry: Duration::from_secs(3),
        event_buffer: 64,
    }
}

pub fn message(id: &str, text: &str) -> Message {
    Message {
        id: id.to_string(),
        sender_id: PEER.to_string(),
        receiver_id: ME.to_string(),
        text: text.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        is_read: false,
        parent_id: None,
        parent: None,
        replies: Vec::new(),
        sender: None,
        counts: MessageCounts { replies: 0 },
    }
}

pub fn message_event(id: &str, parent: Option<&str>, sender: &str, receiver: &str) -> serde_json::Value {
    let mut value = json!({
        "id": id,
        "senderId": sender,
        "receiverId": receiver,
        "text": format!("text {}", id),
        "createdAt": "2024-05-01T10:05:00Z",
    });
    if let Some(parent) = parent {
        value["parentId"] = json!(parent);
    }
    value
}

pub fn typing_event(user: &str, name: &str, typing: bool) -> serde_json::Value {
    json!({ "userId": user, "username": name, "isTyping": typing })
}

/// Let spawned tasks run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
