/// Tracks which peers are typing, expiring each signal after a fixed delay
use crate::messenger_types::{TypingSignal, ViewEvent};
use crate::utils::event_emitter::EventEmitter;
use crate::utils::scoped_task::ScopedTask;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace};

struct ExpiryTimer {
    generation: u64,
    task: ScopedTask,
}

struct TrackerState {
    current_user_id: String,
    typing: BTreeSet<String>,
    timers: HashMap<String, ExpiryTimer>,
    next_generation: u64,
}

impl TrackerState {
    fn snapshot(&self) -> Vec<String> {
        self.typing.iter().cloned().collect()
    }
}

/// Inbound typing signals of one conversation view.
///
/// Keyed by display name: two peers sharing a name collapse into one entry.
pub struct TypingTracker {
    state: Arc<Mutex<TrackerState>>,
    expiry: Duration,
    events: EventEmitter,
}

impl TypingTracker {
    pub fn new(current_user_id: impl Into<String>, expiry: Duration, events: EventEmitter) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState {
                current_user_id: current_user_id.into(),
                typing: BTreeSet::new(),
                timers: HashMap::new(),
                next_generation: 0,
            })),
            expiry,
            events,
        }
    }

    /// Apply one inbound signal. Signals from the local user are ignored.
    pub async fn handle(&self, signal: &TypingSignal) {
        let mut state = self.state.lock().await;
        if signal.peer_user_id == state.current_user_id {
            trace!("ignoring own typing echo");
            return;
        }

        let name = signal.display_name.clone();
        let changed = if signal.is_typing {
            let inserted = state.typing.insert(name.clone());
            let generation = state.next_generation;
            state.next_generation += 1;
            let task = self.schedule_expiry(name.clone(), generation);
            // Replacing the entry aborts the previous timer
            state.timers.insert(
                name,
                ExpiryTimer {
                    generation,
                    task,
                },
            );
            inserted
        } else {
            state.timers.remove(&name);
            state.typing.remove(&name)
        };

        if changed {
            self.events.emit(ViewEvent::TypingChanged {
                typing: state.snapshot(),
            });
        }
    }

    fn schedule_expiry(&self, name: String, generation: u64) -> ScopedTask {
        let state = Arc::downgrade(&self.state);
        let events = self.events.clone();
        ScopedTask::delayed(self.expiry, move || expire(state, events, name, generation))
    }

    /// Display names currently typing, sorted
    pub async fn typing_users(&self) -> Vec<String> {
        self.state.lock().await.snapshot()
    }

    pub async fn is_typing(&self, display_name: &str) -> bool {
        self.state.lock().await.typing.contains(display_name)
    }

    /// Change the local user whose own echoes are ignored
    pub async fn set_current_user(&self, user_id: impl Into<String>) {
        self.state.lock().await.current_user_id = user_id.into();
    }

    /// Cancel all pending expiry timers and forget every typist
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.timers.clear();
        if !state.typing.is_empty() {
            state.typing.clear();
            self.events.emit(ViewEvent::TypingChanged { typing: Vec::new() });
        }
    }

    pub async fn pending_timers(&self) -> usize {
        self.state.lock().await.timers.len()
    }
}

async fn expire(state: Weak<Mutex<TrackerState>>, events: EventEmitter, name: String, generation: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.lock().await;

    // A newer signal rescheduled this name
    if state.timers.get(&name).map(|t| t.generation) != Some(generation) {
        return;
    }
    if let Some(timer) = state.timers.remove(&name) {
        timer.task.detach();
    }

    if state.typing.remove(&name) {
        debug!("typing signal from {} expired", name);
        events.emit(ViewEvent::TypingChanged {
            typing: state.snapshot(),
        });
    }
}
