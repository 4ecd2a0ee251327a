/// Configuration management
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:5000/api/";
const DEFAULT_CHANNEL_PREFIX: &str = "chat_";
const DEFAULT_PUSHER_CLUSTER: &str = "mt1";

/// Hosted pub/sub connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PusherConfig {
    /// Application key
    pub key: String,

    /// Cluster name, used to derive the host when `host` is unset
    pub cluster: String,

    /// Explicit `host[:port]`, overrides the cluster host
    pub host: Option<String>,

    /// Use `wss://` instead of `ws://`
    pub tls: bool,
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            cluster: DEFAULT_PUSHER_CLUSTER.to_string(),
            host: None,
            tls: true,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the chat API (must end with `/`)
    pub api_base_url: Url,

    /// Session token sent as the `token` cookie
    pub session_token: Option<String>,

    /// Local user id; resolved through the API when absent
    pub user_id: Option<String>,

    /// Peer whose conversation is opened by the terminal client
    pub peer_id: Option<String>,

    /// Prefix of the per-user realtime channel
    pub channel_prefix: String,

    /// Inactivity before a local stop-typing signal is sent
    pub typing_idle_timeout: Duration,

    /// Lifetime of a received typing signal
    pub typing_expiry: Duration,

    /// Pause in typing before a user search is sent
    pub search_debounce: Duration,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Capacity of the view change-notification channel
    pub event_buffer: usize,

    /// Realtime service settings
    pub pusher: PusherConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            session_token: None,
            user_id: None,
            peer_id: None,
            channel_prefix: DEFAULT_CHANNEL_PREFIX.to_string(),
            typing_idle_timeout: Duration::from_secs(2),
            typing_expiry: Duration::from_secs(3),
            search_debounce: Duration::from_millis(400),
            request_timeout: Duration::from_secs(10),
            event_buffer: 256,
            pusher: PusherConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(ChatError::Config(format!(
                "Usage: {} <peer-id> [--user <id>] [--api <url>] [--token <token>] [--pusher-key <key>] [--pusher-cluster <cluster>] [--pusher-host <host>] [--insecure-ws]",
                args.first().map(String::as_str).unwrap_or("chatline")
            )));
        }

        let mut config = Self {
            peer_id: Some(args[1].clone()),
            ..Default::default()
        };

        let mut i = 2;
        while i < args.len() {
            let flag = args[i].as_str();
            if flag == "--insecure-ws" {
                config.pusher.tls = false;
                i += 1;
                continue;
            }

            let value = args.get(i + 1).cloned().ok_or_else(|| {
                ChatError::Config(format!("{} requires an argument", flag))
            })?;
            match flag {
                "--user" => config.user_id = Some(value),
                "--api" => config.api_base_url = parse_api_url(&value)?,
                "--token" => config.session_token = Some(value),
                "--pusher-key" => config.pusher.key = value,
                "--pusher-cluster" => config.pusher.cluster = value,
                "--pusher-host" => config.pusher.host = Some(value),
                other => {
                    return Err(ChatError::Config(format!("Unknown option: {}", other)));
                }
            }
            i += 2;
        }

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CHATLINE_*` overrides from the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CHATLINE_API_URL") {
            self.api_base_url = parse_api_url(&url)?;
        }
        if let Some(token) = lookup("CHATLINE_TOKEN") {
            self.session_token = Some(token);
        }
        if let Some(key) = lookup("CHATLINE_PUSHER_KEY") {
            self.pusher.key = key;
        }
        if let Some(cluster) = lookup("CHATLINE_PUSHER_CLUSTER") {
            self.pusher.cluster = cluster;
        }
        if let Some(host) = lookup("CHATLINE_PUSHER_HOST") {
            self.pusher.host = Some(host);
        }
        Ok(())
    }

    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.channel_prefix.is_empty() {
            return Err(ChatError::Config("channel prefix must not be empty".to_string()));
        }
        if self.typing_idle_timeout.is_zero() || self.typing_expiry.is_zero() {
            return Err(ChatError::Config("typing timers must be non-zero".to_string()));
        }
        if self.event_buffer == 0 {
            return Err(ChatError::Config("event buffer must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Parse an API base URL, forcing a trailing slash so relative joins keep the path
fn parse_api_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.channel_prefix, "chat_");
        assert_eq!(config.typing_idle_timeout, Duration::from_secs(2));
        assert_eq!(config.typing_expiry, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_args_requires_peer() {
        let err = ClientConfig::from_args(&args(&["chatline"])).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn test_from_args_flags() {
        let config = ClientConfig::from_args(&args(&[
            "chatline",
            "peer-1",
            "--user",
            "me",
            "--api",
            "https://chat.example.com/api",
            "--pusher-cluster",
            "eu",
            "--insecure-ws",
        ]))
        .unwrap();

        assert_eq!(config.peer_id.as_deref(), Some("peer-1"));
        assert_eq!(config.user_id.as_deref(), Some("me"));
        assert_eq!(config.api_base_url.as_str(), "https://chat.example.com/api/");
        assert_eq!(config.pusher.cluster, "eu");
        assert!(!config.pusher.tls);
    }

    #[test]
    fn test_from_args_missing_value() {
        let err = ClientConfig::from_args(&args(&["chatline", "peer-1", "--token"])).unwrap_err();
        assert!(err.to_string().contains("--token"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ClientConfig::default();
        config
            .apply_env(|name| match name {
                "CHATLINE_TOKEN" => Some("secret".to_string()),
                "CHATLINE_PUSHER_HOST" => Some("127.0.0.1:6001".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.session_token.as_deref(), Some("secret"));
        assert_eq!(config.pusher.host.as_deref(), Some("127.0.0.1:6001"));
    }

    #[test]
    fn test_validate_rejects_zero_timers() {
        let config = ClientConfig {
            typing_expiry: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
