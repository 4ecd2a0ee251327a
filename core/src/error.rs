/// Error types for the conversation core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Chat API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed realtime event: {0}")]
    MalformedEvent(String),

    #[error("Unknown realtime event: {0}")]
    UnknownEvent(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Message {0} is not loaded")]
    UnknownMessage(String),

    #[error("Message text is empty")]
    EmptyMessage,
}

pub type Result<T> = std::result::Result<T, ChatError>;
