/// Message store: top-level messages in arrival order, replies one level deep
use crate::messenger_types::{Message, ViewEvent};
use crate::utils::event_emitter::EventEmitter;
use tracing::debug;

/// Result of merging one incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Appended to the top-level list
    Appended,
    /// Attached to a loaded parent, which now has `reply_count` replies
    ReplyAttached { reply_count: u32 },
    /// Parent not loaded; the message was dropped
    Orphaned,
}

pub struct MessageStore {
    messages: Vec<Message>,
    events: EventEmitter,
}

impl MessageStore {
    pub fn new(events: EventEmitter) -> Self {
        Self {
            messages: Vec::new(),
            events,
        }
    }

    /// Replace all state with a freshly fetched list
    pub fn initialize(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        debug!("message store initialized with {} messages", self.messages.len());
        self.events.emit(ViewEvent::MessagesLoaded {
            count: self.messages.len(),
        });
    }

    /// Merge one realtime message.
    ///
    /// Top-level messages are appended without reordering. Replies are appended
    /// to their parent's thread; a reply whose parent is not loaded is dropped.
    /// No deduplication by id is performed.
    pub fn apply_incoming(&mut self, message: Message) -> ApplyOutcome {
        let Some(parent_id) = message.parent_id.clone() else {
            let message_id = message.id.clone();
            self.messages.push(message);
            self.events.emit(ViewEvent::MessageAppended { message_id });
            return ApplyOutcome::Appended;
        };

        let Some(parent) = self.messages.iter_mut().find(|m| m.id == parent_id) else {
            debug!("dropping reply {} to unknown parent {}", message.id, parent_id);
            return ApplyOutcome::Orphaned;
        };

        let reply_id = message.id.clone();
        parent.replies.push(message);
        parent.counts.replies += 1;
        let reply_count = parent.counts.replies;

        self.events.emit(ViewEvent::ReplyAppended {
            parent_id,
            reply_id,
            reply_count,
        });
        ApplyOutcome::ReplyAttached { reply_count }
    }

    /// Top-level messages in arrival order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(EventEmitter::default())
    }
}
