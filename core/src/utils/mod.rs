pub mod event_emitter;
pub mod scoped_task;
