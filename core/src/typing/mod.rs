/// Typing presence: inbound signal tracking and outbound debounced emission
pub mod emitter;
pub mod tracker;

pub use emitter::TypingEmitter;
pub use tracker::TypingTracker;
