/// Debounces local composer activity into start/stop typing signals
use crate::api::ChatApi;
use crate::messenger_types::TypingRequest;
use crate::utils::scoped_task::ScopedTask;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

struct EmitterState {
    typing: bool,
    idle_timer: Option<ScopedTask>,
    generation: u64,
}

/// Outbound typing signals for one peer.
///
/// Signals go out in order through a single worker. Delivery is best-effort:
/// failures are logged and never retried.
pub struct TypingEmitter {
    state: Arc<Mutex<EmitterState>>,
    idle_timeout: Duration,
    outbound: mpsc::UnboundedSender<bool>,
    _worker: ScopedTask,
}

impl TypingEmitter {
    pub fn new(api: Arc<dyn ChatApi>, peer_id: impl Into<String>, idle_timeout: Duration) -> Self {
        let (outbound, rx) = mpsc::unbounded_channel();
        let worker = ScopedTask::spawn(run_worker(api, peer_id.into(), rx));

        Self {
            state: Arc::new(Mutex::new(EmitterState {
                typing: false,
                idle_timer: None,
                generation: 0,
            })),
            idle_timeout,
            outbound,
            _worker: worker,
        }
    }

    /// Call on every keystroke in the composer
    pub async fn on_local_input_activity(&self) {
        let mut state = self.state.lock().await;
        if !state.typing {
            state.typing = true;
            self.queue(true);
        }

        state.generation += 1;
        let generation = state.generation;
        let weak = Arc::downgrade(&self.state);
        let outbound = self.outbound.clone();
        state.idle_timer = Some(ScopedTask::delayed(self.idle_timeout, move || {
            go_idle(weak, outbound, generation)
        }));
    }

    /// Force a stop signal after a message was sent
    pub async fn on_message_sent(&self) {
        let mut state = self.state.lock().await;
        state.idle_timer = None;
        state.generation += 1;
        state.typing = false;
        self.queue(false);
    }

    pub async fn is_typing(&self) -> bool {
        self.state.lock().await.typing
    }

    fn queue(&self, is_typing: bool) {
        if self.outbound.send(is_typing).is_err() {
            debug!("typing worker stopped, signal discarded");
        }
    }
}

async fn go_idle(state: Weak<Mutex<EmitterState>>, outbound: mpsc::UnboundedSender<bool>, generation: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.lock().await;
    if state.generation != generation || !state.typing {
        return;
    }

    state.typing = false;
    if let Some(timer) = state.idle_timer.take() {
        timer.detach();
    }
    let _ = outbound.send(false);
}

async fn run_worker(api: Arc<dyn ChatApi>, peer_id: String, mut rx: mpsc::UnboundedReceiver<bool>) {
    while let Some(is_typing) = rx.recv().await {
        let request = TypingRequest {
            peer_id: &peer_id,
            is_typing,
        };
        if let Err(e) = api.send_typing(request).await {
            warn!("Error sending typing indicator: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ChatError, Result};
    use crate::messenger_types::{ConversationSummary, Message, SendMessageRequest, User};
    use async_trait::async_trait;
    use tokio::time::sleep;

    #[derive(Default)]
    struct RecordingApi {
        signals: std::sync::Mutex<Vec<(String, bool)>>,
        fail: bool,
    }

    impl RecordingApi {
        fn flags(&self) -> Vec<bool> {
            self.signals.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    #[async_trait]
    impl ChatApi for RecordingApi {
        async fn fetch_thread(&self, _peer_id: &str) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }

        async fn send_message(&self, _request: &SendMessageRequest) -> Result<()> {
            Ok(())
        }

        async fn send_typing(&self, request: TypingRequest<'_>) -> Result<()> {
            self.signals
                .lock()
                .unwrap()
                .push((request.peer_id.to_string(), request.is_typing));
            if self.fail {
                return Err(ChatError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(())
        }

        async fn search_users(&self, _query: &str) -> Result<Vec<User>> {
            Ok(Vec::new())
        }

        async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
            Ok(Vec::new())
        }

        async fn current_user(&self) -> Result<User> {
            Err(ChatError::Config("unused".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_emits_one_start_and_one_stop() {
        let api = Arc::new(RecordingApi::default());
        let emitter = TypingEmitter::new(api.clone(), "peer", Duration::from_secs(2));

        for i in 0..5 {
            if i > 0 {
                sleep(Duration::from_millis(500)).await;
            }
            emitter.on_local_input_activity().await;
        }

        // Last activity at 2.0s; stop is due at 4.0s
        sleep(Duration::from_millis(1900)).await;
        assert_eq!(api.flags(), vec![true]);
        assert!(emitter.is_typing().await);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(api.flags(), vec![true, false]);
        assert!(!emitter.is_typing().await);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.flags(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signals_target_peer() {
        let api = Arc::new(RecordingApi::default());
        let emitter = TypingEmitter::new(api.clone(), "peer-7", Duration::from_secs(2));
        emitter.on_local_input_activity().await;
        sleep(Duration::from_secs(3)).await;

        let signals = api.signals.lock().unwrap().clone();
        assert!(signals.iter().all(|(peer, _)| peer == "peer-7"));
        assert_eq!(signals.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_forces_stop_and_cancels_timer() {
        let api = Arc::new(RecordingApi::default());
        let emitter = TypingEmitter::new(api.clone(), "peer", Duration::from_secs(2));

        emitter.on_local_input_activity().await;
        sleep(Duration::from_millis(500)).await;
        emitter.on_message_sent().await;
        assert!(!emitter.is_typing().await);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.flags(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_again_after_stop() {
        let api = Arc::new(RecordingApi::default());
        let emitter = TypingEmitter::new(api.clone(), "peer", Duration::from_secs(2));

        emitter.on_local_input_activity().await;
        sleep(Duration::from_secs(3)).await;
        emitter.on_local_input_activity().await;
        sleep(Duration::from_secs(3)).await;

        assert_eq!(api.flags(), vec![true, false, true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_retried() {
        let api = Arc::new(RecordingApi {
            fail: true,
            ..Default::default()
        });
        let emitter = TypingEmitter::new(api.clone(), "peer", Duration::from_secs(2));

        emitter.on_local_input_activity().await;
        sleep(Duration::from_secs(3)).await;

        assert_eq!(api.flags(), vec![true, false]);
        assert!(!emitter.is_typing().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_stop() {
        let api = Arc::new(RecordingApi::default());
        let emitter = TypingEmitter::new(api.clone(), "peer", Duration::from_secs(2));
        emitter.on_local_input_activity().await;
        sleep(Duration::from_millis(10)).await;
        drop(emitter);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(api.flags(), vec![true]);
    }
}
