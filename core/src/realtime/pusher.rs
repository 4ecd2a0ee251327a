/// Hosted pub/sub transport speaking the Pusher websocket protocol (v7)
use super::RealtimeTransport;
use crate::config::PusherConfig;
use crate::error::{ChatError, Result};
use crate::messenger_types::RawEvent;
use crate::utils::scoped_task::ScopedTask;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

const PROTOCOL_VERSION: u8 = 7;
const CLIENT_NAME: &str = "chatline";

type Routes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<RawEvent>>>>;

/// One protocol frame. `data` is usually a JSON document encoded as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PusherFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PusherFrame {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Payload with string-encoded JSON unwrapped
    pub fn payload(&self) -> serde_json::Value {
        match &self.data {
            serde_json::Value::String(s) => {
                serde_json::from_str(s).unwrap_or_else(|_| self.data.clone())
            }
            other => other.clone(),
        }
    }
}

/// What the reader does with an incoming frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameAction {
    /// Hand an application event to the channel's subscriber
    Forward { channel: String, event: RawEvent },
    /// Answer a server ping
    Pong,
    /// Server reported an error
    ServerError(String),
    Ignore,
}

pub fn classify(frame: &PusherFrame) -> FrameAction {
    match frame.event.as_str() {
        "pusher:ping" => FrameAction::Pong,
        "pusher:error" => {
            let payload = frame.payload();
            let message = payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string();
            FrameAction::ServerError(message)
        }
        event if event.starts_with("pusher:") || event.starts_with("pusher_internal:") => {
            FrameAction::Ignore
        }
        event => match &frame.channel {
            Some(channel) => FrameAction::Forward {
                channel: channel.clone(),
                event: RawEvent::new(event, frame.payload()),
            },
            None => FrameAction::Ignore,
        },
    }
}

pub fn subscribe_frame(channel: &str) -> String {
    json!({ "event": "pusher:subscribe", "data": { "channel": channel } }).to_string()
}

pub fn unsubscribe_frame(channel: &str) -> String {
    json!({ "event": "pusher:unsubscribe", "data": { "channel": channel } }).to_string()
}

fn pong_frame() -> String {
    json!({ "event": "pusher:pong", "data": {} }).to_string()
}

/// Websocket URL for the configured app
pub fn endpoint(config: &PusherConfig) -> Result<String> {
    if config.key.is_empty() {
        return Err(ChatError::Config("pusher key is not set".to_string()));
    }
    let host = config
        .host
        .clone()
        .unwrap_or_else(|| format!("ws-{}.pusher.com", config.cluster));
    let scheme = if config.tls { "wss" } else { "ws" };
    Ok(format!(
        "{}://{}/app/{}?protocol={}&client={}&version={}&flash=false",
        scheme,
        host,
        config.key,
        PROTOCOL_VERSION,
        CLIENT_NAME,
        env!("CARGO_PKG_VERSION")
    ))
}

pub struct PusherTransport {
    routes: Routes,
    outbound: mpsc::UnboundedSender<String>,
    socket_id: String,
    _reader: ScopedTask,
    _writer: ScopedTask,
}

impl PusherTransport {
    /// Connect and wait for the server's `connection_established`
    pub async fn connect(config: &PusherConfig) -> Result<Self> {
        let url = endpoint(config)?;
        info!("Connecting to realtime service at {}", url);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ChatError::WebSocket(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        let socket_id = loop {
            let frame = match read.next().await {
                Some(Ok(WsMessage::Text(text))) => PusherFrame::parse(&text)?,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ChatError::WebSocket(e.to_string())),
                None => {
                    return Err(ChatError::WebSocket(
                        "connection closed before handshake".to_string(),
                    ))
                }
            };
            match frame.event.as_str() {
                "pusher:connection_established" => {
                    break frame
                        .payload()
                        .get("socket_id")
                        .and_then(|s| s.as_str())
                        .unwrap_or_default()
                        .to_string();
                }
                "pusher:error" => {
                    if let FrameAction::ServerError(msg) = classify(&frame) {
                        return Err(ChatError::WebSocket(msg));
                    }
                }
                other => debug!("Ignoring {} before handshake", other),
            }
        };
        info!("Realtime connection established (socket {})", socket_id);

        let (outbound, mut rx) = mpsc::unbounded_channel::<String>();
        let writer = ScopedTask::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = write.send(WsMessage::Text(text)).await {
                    error!("Realtime send error: {}", e);
                    break;
                }
            }
            debug!("Realtime writer stopped");
        });

        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let reader = {
            let routes = routes.clone();
            let outbound = outbound.clone();
            ScopedTask::spawn(async move {
                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(WsMessage::Text(text)) => match PusherFrame::parse(&text) {
                            Ok(frame) => handle_frame(&frame, &routes, &outbound),
                            Err(e) => warn!("Unparseable realtime frame: {}", e),
                        },
                        Ok(WsMessage::Close(_)) => {
                            info!("Realtime connection closed by server");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("Realtime connection error: {}", e);
                            break;
                        }
                    }
                }
                // Ends every subscriber's stream
                lock_routes(&routes).clear();
            })
        };

        Ok(Self {
            routes,
            outbound,
            socket_id,
            _reader: reader,
            _writer: writer,
        })
    }

    pub fn socket_id(&self) -> &str {
        &self.socket_id
    }

    fn send_frame(&self, text: String) -> Result<()> {
        self.outbound
            .send(text)
            .map_err(|_| ChatError::WebSocket("connection is closed".to_string()))
    }
}

fn lock_routes(
    routes: &Routes,
) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<RawEvent>>> {
    routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn handle_frame(frame: &PusherFrame, routes: &Routes, outbound: &mpsc::UnboundedSender<String>) {
    match classify(frame) {
        FrameAction::Forward { channel, event } => {
            let mut routes = lock_routes(routes);
            let delivered = routes
                .get(&channel)
                .map(|tx| tx.send(event).is_ok())
                .unwrap_or(false);
            if !delivered && routes.remove(&channel).is_some() {
                debug!("Subscriber for {} is gone", channel);
                let _ = outbound.send(unsubscribe_frame(&channel));
            }
        }
        FrameAction::Pong => {
            let _ = outbound.send(pong_frame());
        }
        FrameAction::ServerError(msg) => warn!("Realtime service error: {}", msg),
        FrameAction::Ignore => {
            if frame.event == "pusher_internal:subscription_succeeded" {
                debug!("Subscription to {:?} confirmed", frame.channel);
            }
        }
    }
}

#[async_trait]
impl RealtimeTransport for PusherTransport {
    async fn subscribe(&self, channel: &str) -> Result<mpsc::UnboundedReceiver<RawEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let replaced = lock_routes(&self.routes).insert(channel.to_string(), tx);
        if replaced.is_none() {
            self.send_frame(subscribe_frame(channel))?;
        }
        Ok(rx)
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        if lock_routes(&self.routes).remove(channel).is_some() {
            self.send_frame(unsubscribe_frame(channel))?;
        }
        Ok(())
    }
}
