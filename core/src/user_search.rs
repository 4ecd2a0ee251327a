/// Debounced username search for starting new conversations
use crate::api::ChatApi;
use crate::messenger_types::{User, ViewEvent};
use crate::utils::event_emitter::EventEmitter;
use crate::utils::scoped_task::ScopedTask;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Default)]
struct SearchState {
    query: String,
    results: Vec<User>,
    loading: bool,
    generation: u64,
    pending: Option<ScopedTask>,
}

/// Runs one API search per pause in typing.
///
/// Each new query cancels the pending or in-flight search. An empty query
/// clears the results without a request.
pub struct UserSearch {
    state: Arc<Mutex<SearchState>>,
    api: Arc<dyn ChatApi>,
    debounce: Duration,
    events: EventEmitter,
}

impl UserSearch {
    pub fn new(api: Arc<dyn ChatApi>, debounce: Duration, events: EventEmitter) -> Self {
        Self {
            state: Arc::new(Mutex::new(SearchState::default())),
            api,
            debounce,
            events,
        }
    }

    /// Replace the query; the search runs once the query is left alone
    pub async fn set_query(&self, query: &str) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.pending = None;
        state.query = query.to_string();

        if query.trim().is_empty() {
            state.loading = false;
            if !state.results.is_empty() {
                state.results.clear();
                self.events.emit(ViewEvent::SearchResultsChanged {
                    query: String::new(),
                    count: 0,
                });
            }
            return;
        }

        let generation = state.generation;
        let weak = Arc::downgrade(&self.state);
        let api = self.api.clone();
        let events = self.events.clone();
        let query = query.to_string();
        state.pending = Some(ScopedTask::delayed(self.debounce, move || {
            run_search(weak, api, events, query, generation)
        }));
    }

    pub async fn query(&self) -> String {
        self.state.lock().await.query.clone()
    }

    pub async fn results(&self) -> Vec<User> {
        self.state.lock().await.results.clone()
    }

    /// True while a request is in flight
    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.loading
    }

    /// Cancel any pending search
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.pending = None;
        state.loading = false;
    }
}

async fn run_search(
    state: Weak<Mutex<SearchState>>,
    api: Arc<dyn ChatApi>,
    events: EventEmitter,
    query: String,
    generation: u64,
) {
    {
        let Some(state) = state.upgrade() else { return };
        let mut state = state.lock().await;
        if state.generation != generation {
            return;
        }
        state.loading = true;
    }

    let results = match api.search_users(&query).await {
        Ok(users) => users,
        Err(e) => {
            warn!("Search failed: {}", e);
            Vec::new()
        }
    };

    let Some(state) = state.upgrade() else { return };
    let mut state = state.lock().await;
    if state.generation != generation {
        debug!("Discarding stale results for {:?}", query);
        return;
    }
    state.loading = false;
    state.results = results;
    if let Some(task) = state.pending.take() {
        task.detach();
    }
    events.emit(ViewEvent::SearchResultsChanged {
        query,
        count: state.results.len(),
    });
}
