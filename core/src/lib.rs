/// Chatline - realtime conversation core
///
/// Client-side state for one-to-one chat: merging fetched and realtime
/// messages into one-level reply threads, thread expansion, and debounced
/// typing presence over a hosted pub/sub channel.

pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod format;
pub mod message_store;
pub mod messenger_types;
pub mod realtime;
pub mod thread_expansion;
pub mod typing;
pub mod user_search;
pub mod utils;

pub use api::{ChatApi, HttpChatApi};
pub use config::ClientConfig;
pub use conversation::{ConversationDeps, ConversationView};
pub use error::{ChatError, Result};
pub use messenger_types::{Message, TypingSignal, ViewEvent};
pub use user_search::UserSearch;
