/// Shared types for the conversation core
use crate::error::{ChatError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Realtime event name carrying a `Message` payload
pub const MESSAGE_EVENT: &str = "message";
/// Realtime event name carrying a `TypingSignal` payload
pub const TYPING_EVENT: &str = "typing";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

/// Denormalised counters attached to a message by the chat API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCounts {
    #[serde(default)]
    pub replies: u32,
}

/// A chat message as delivered by the API and the realtime channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Embedded parent, used for reply previews
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<Message>>,
    #[serde(default)]
    pub replies: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<User>,
    #[serde(rename = "_count", default)]
    pub counts: MessageCounts,
}

impl Message {
    /// Replies carry a parent id; top-level messages do not
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn reply_count(&self) -> u32 {
        self.counts.replies
    }

    /// True when the user sent or received this message
    pub fn involves(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    /// Sender's username, falling back to the raw sender id
    pub fn sender_name(&self) -> &str {
        self.sender
            .as_ref()
            .map(|u| u.username.as_str())
            .unwrap_or(&self.sender_id)
    }

    /// Threads are one level deep: a reply never owns replies
    fn check_thread_depth(&self) -> Result<()> {
        if self.is_reply() && (!self.replies.is_empty() || self.reply_count() > 0) {
            return Err(ChatError::MalformedEvent(format!(
                "reply {} carries its own replies",
                self.id
            )));
        }
        Ok(())
    }
}

/// Peer presence signal received on the realtime channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    #[serde(rename = "userId", alias = "peerUserId")]
    pub peer_user_id: String,
    #[serde(rename = "username", alias = "displayName")]
    pub display_name: String,
    #[serde(rename = "isTyping")]
    pub is_typing: bool,
}

/// Raw `(event, payload)` pair as handed over by a realtime transport
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl RawEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Realtime event validated at the transport boundary
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Message(Message),
    Typing(TypingSignal),
}

impl RealtimeEvent {
    /// Decode a raw event, rejecting unknown kinds and malformed payloads
    pub fn decode(raw: &RawEvent) -> Result<Self> {
        match raw.event.as_str() {
            MESSAGE_EVENT => {
                let message: Message = serde_json::from_value(raw.data.clone())
                    .map_err(|e| ChatError::MalformedEvent(format!("message: {}", e)))?;
                message.check_thread_depth()?;
                Ok(Self::Message(message))
            }
            TYPING_EVENT => {
                let signal: TypingSignal = serde_json::from_value(raw.data.clone())
                    .map_err(|e| ChatError::MalformedEvent(format!("typing: {}", e)))?;
                Ok(Self::Typing(signal))
            }
            other => Err(ChatError::UnknownEvent(other.to_string())),
        }
    }
}

/// One row of the conversation list: the peer's profile and a preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Text of the latest message exchanged with this peer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}

/// Body of `GET auth/search`; `users` is either a list or `{ data: [..] }`
#[derive(Debug, Clone, Deserialize)]
pub struct UserSearchResponse {
    #[serde(default)]
    users: Option<UserList>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum UserList {
    Plain(Vec<User>),
    Wrapped { data: Vec<User> },
}

impl UserSearchResponse {
    pub fn into_users(self) -> Vec<User> {
        match self.users {
            Some(UserList::Plain(users)) | Some(UserList::Wrapped { data: users }) => users,
            None => Vec::new(),
        }
    }
}

/// Body of `POST messages/send`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Body of `POST messages/typing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest<'a> {
    pub peer_id: &'a str,
    pub is_typing: bool,
}

/// Response envelope used by the chat API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Only an explicit `false` marks a failure
    #[serde(default)]
    pub success: Option<bool>,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Change notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewEvent {
    /// The message list was replaced by a fetch
    MessagesLoaded { count: usize },
    /// A top-level message was appended
    MessageAppended { message_id: String },
    /// A reply was attached to a loaded parent
    ReplyAppended {
        parent_id: String,
        reply_id: String,
        reply_count: u32,
    },
    /// The set of typing peers changed
    TypingChanged { typing: Vec<String> },
    /// A reply thread was expanded or collapsed
    ThreadToggled { message_id: String, expanded: bool },
    /// The composer's reply target changed
    ReplyTargetChanged { message_id: Option<String> },
    /// A user search finished or its results were cleared
    SearchResultsChanged { query: String, count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_message_event() {
        let raw = RawEvent::new(
            "message",
            json!({
                "id": "m2",
                "senderId": "u2",
                "receiverId": "u1",
                "text": "yo",
                "createdAt": "2024-05-01T10:00:00Z",
                "parentId": "m1",
                "sender": { "id": "u2", "username": "bob" }
            }),
        );

        match RealtimeEvent::decode(&raw).unwrap() {
            RealtimeEvent::Message(msg) => {
                assert_eq!(msg.id, "m2");
                assert_eq!(msg.parent_id.as_deref(), Some("m1"));
                assert!(msg.is_reply());
                assert_eq!(msg.reply_count(), 0);
                assert_eq!(msg.sender_name(), "bob");
                assert!(msg.involves("u1"));
                assert!(!msg.involves("u3"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_counts_field() {
        let raw = RawEvent::new(
            "message",
            json!({
                "id": "m1",
                "senderId": "u1",
                "receiverId": "u2",
                "text": "hi",
                "createdAt": "2024-05-01T10:00:00Z",
                "_count": { "replies": 4 }
            }),
        );
        let RealtimeEvent::Message(msg) = RealtimeEvent::decode(&raw).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(msg.reply_count(), 4);
        assert!(msg.replies.is_empty());
    }

    #[test]
    fn test_decode_typing_wire_and_alias_names() {
        let wire = RawEvent::new(
            "typing",
            json!({ "userId": "u2", "username": "bob", "isTyping": true }),
        );
        let alias = RawEvent::new(
            "typing",
            json!({ "peerUserId": "u2", "displayName": "bob", "isTyping": true }),
        );

        let expected = RealtimeEvent::Typing(TypingSignal {
            peer_user_id: "u2".to_string(),
            display_name: "bob".to_string(),
            is_typing: true,
        });
        assert_eq!(RealtimeEvent::decode(&wire).unwrap(), expected);
        assert_eq!(RealtimeEvent::decode(&alias).unwrap(), expected);
    }

    #[test]
    fn test_decode_rejects_unknown_event() {
        let raw = RawEvent::new("reaction", json!({}));
        assert!(matches!(
            RealtimeEvent::decode(&raw),
            Err(ChatError::UnknownEvent(name)) if name == "reaction"
        ));
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let raw = RawEvent::new("typing", json!({ "userId": "u2" }));
        assert!(matches!(
            RealtimeEvent::decode(&raw),
            Err(ChatError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_decode_rejects_nested_thread() {
        let raw = RawEvent::new(
            "message",
            json!({
                "id": "m3",
                "senderId": "u2",
                "receiverId": "u1",
                "text": "deep",
                "createdAt": "2024-05-01T10:00:00Z",
                "parentId": "m1",
                "_count": { "replies": 1 }
            }),
        );
        assert!(matches!(
            RealtimeEvent::decode(&raw),
            Err(ChatError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_view_event_is_type_tagged() {
        let event = ViewEvent::ThreadToggled {
            message_id: "m1".to_string(),
            expanded: true,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "thread_toggled");
        assert_eq!(value["message_id"], "m1");
    }

    #[test]
    fn test_send_request_omits_missing_parent() {
        let req = SendMessageRequest {
            receiver_id: "u2".to_string(),
            text: "hi".to_string(),
            parent_id: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({ "receiverId": "u2", "text": "hi" }));
    }

    #[test]
    fn test_conversation_row_is_flat_profile() {
        let envelope: ApiEnvelope<Vec<ConversationSummary>> = serde_json::from_str(
            r#"{"success":true,"data":[{"id":"u2","username":"bob","lastMessage":"hi there"}]}"#,
        )
        .unwrap();
        let rows = envelope.data.unwrap();
        assert_eq!(
            rows,
            vec![ConversationSummary {
                id: "u2".to_string(),
                username: "bob".to_string(),
                avatar: None,
                last_message: Some("hi there".to_string()),
            }]
        );
    }

    #[test]
    fn test_search_response_shapes() {
        let plain: UserSearchResponse =
            serde_json::from_str(r#"{"users":[{"id":"u2","username":"bob"}]}"#).unwrap();
        assert_eq!(plain.into_users().len(), 1);

        let wrapped: UserSearchResponse =
            serde_json::from_str(r#"{"users":{"data":[{"id":"u2","username":"bob"}]}}"#).unwrap();
        assert_eq!(wrapped.into_users()[0].username, "bob");

        let missing: UserSearchResponse = serde_json::from_str("{}").unwrap();
        assert!(missing.into_users().is_empty());
    }
}
