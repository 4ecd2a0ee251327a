/// Expanded reply threads of one conversation view
use crate::messenger_types::ViewEvent;
use crate::utils::event_emitter::EventEmitter;
use std::collections::HashSet;

pub struct ThreadExpansion {
    expanded: HashSet<String>,
    events: EventEmitter,
}

impl ThreadExpansion {
    pub fn new(events: EventEmitter) -> Self {
        Self {
            expanded: HashSet::new(),
            events,
        }
    }

    /// Flip the thread's state and return whether it is now expanded
    pub fn toggle(&mut self, message_id: &str) -> bool {
        let expanded = if self.expanded.remove(message_id) {
            false
        } else {
            self.expanded.insert(message_id.to_string());
            true
        };
        self.events.emit(ViewEvent::ThreadToggled {
            message_id: message_id.to_string(),
            expanded,
        });
        expanded
    }

    pub fn is_expanded(&self, message_id: &str) -> bool {
        self.expanded.contains(message_id)
    }

    /// Forget threads whose parent is no longer loaded
    pub fn retain_known<F>(&mut self, is_known: F)
    where
        F: Fn(&str) -> bool,
    {
        self.expanded.retain(|id| is_known(id));
    }

    pub fn expanded_count(&self) -> usize {
        self.expanded.len()
    }
}

impl Default for ThreadExpansion {
    fn default() -> Self {
        Self::new(EventEmitter::default())
    }
}
