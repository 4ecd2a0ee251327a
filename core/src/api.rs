/// Chat API client
///
/// Endpoints (relative to the configured base URL):
///   GET  messages/threads/:peer_id
///   POST messages/send                 body: {"receiverId":"..","text":"..","parentId":".."}
///   POST messages/typing               body: {"peerId":"..","isTyping":true}
///   GET  message/conversations
///   GET  auth/search?username=..
///   GET  auth/me
use crate::config::ClientConfig;
use crate::error::{ChatError, Result};
use crate::messenger_types::{
    ApiEnvelope, ConversationSummary, Message, SendMessageRequest, TypingRequest, User,
    UserSearchResponse,
};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

const SESSION_COOKIE: &str = "token";

/// Operations the conversation core needs from the chat API
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Top-level messages exchanged with `peer_id`, replies nested
    async fn fetch_thread(&self, peer_id: &str) -> Result<Vec<Message>>;

    async fn send_message(&self, request: &SendMessageRequest) -> Result<()>;

    async fn send_typing(&self, request: TypingRequest<'_>) -> Result<()>;

    async fn conversations(&self) -> Result<Vec<ConversationSummary>>;

    /// Users whose username matches `query`
    async fn search_users(&self, query: &str) -> Result<Vec<User>>;

    async fn current_user(&self) -> Result<User>;
}

/// `ChatApi` over HTTP with a session cookie
pub struct HttpChatApi {
    client: Client,
    base: Url,
}

impl HttpChatApi {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        if let Some(token) = &config.session_token {
            jar.add_cookie_str(
                &format!("{}={}; Path=/", SESSION_COOKIE, token),
                &config.api_base_url,
            );
        }

        let client = Client::builder()
            .cookie_provider(jar)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base: config.api_base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve an endpoint path; `segments` are percent-encoded
    pub fn endpoint(&self, path: &str, segments: &[&str]) -> Result<Url> {
        let mut relative = path.to_string();
        for segment in segments {
            relative.push('/');
            relative.push_str(&urlencoding::encode(segment));
        }
        Ok(self.base.join(&relative)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Enveloped payload, `None` when the server sent no `data`
    async fn get_data<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let envelope: ApiEnvelope<T> = self.get_json(url).await?;
        unwrap_envelope(envelope)
    }

    async fn post_json<B: serde::Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<()> {
        debug!("POST {}", url);
        let response = self.client.post(url).json(body).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_thread(&self, peer_id: &str) -> Result<Vec<Message>> {
        let url = self.endpoint("messages/threads", &[peer_id])?;
        self.get_data(url).await?.ok_or_else(|| ChatError::Api {
            status: 200,
            message: "thread response carried no data".to_string(),
        })
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<()> {
        let url = self.endpoint("messages/send", &[])?;
        self.post_json(url, request).await
    }

    async fn send_typing(&self, request: TypingRequest<'_>) -> Result<()> {
        let url = self.endpoint("messages/typing", &[])?;
        self.post_json(url, &request).await
    }

    async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        let url = self.endpoint("message/conversations", &[])?;
        Ok(self.get_data(url).await?.unwrap_or_default())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let mut url = self.endpoint("auth/search", &[])?;
        url.query_pairs_mut().append_pair("username", query);
        let response: UserSearchResponse = self.get_json(url).await?;
        Ok(response.into_users())
    }

    async fn current_user(&self) -> Result<User> {
        #[derive(Deserialize)]
        struct MeResponse {
            user: User,
        }

        let url = self.endpoint("auth/me", &[])?;
        let me: MeResponse = self.get_json(url).await?;
        Ok(me.user)
    }
}

/// Map non-2xx responses to `ChatError::Api`, keeping the server's message
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Api {
        status: status.as_u16(),
        message: error_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        }),
    })
}

fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn unwrap_envelope<T>(envelope: ApiEnvelope<T>) -> Result<Option<T>> {
    match envelope {
        ApiEnvelope {
            success: Some(false),
            message,
            ..
        } => Err(ChatError::Api {
            status: 200,
            message: message.unwrap_or_else(|| "unsuccessful response".to_string()),
        }),
        ApiEnvelope { data, .. } => Ok(data),
    }
}
