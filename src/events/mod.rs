//! Process notification: typed events, per-process queues, and the fan-out
//! manager that delivers `READY_TO_READ`/`READY_TO_WRITE` to subscribers (§3, §4.7).

mod event;
mod manager;
mod queue;

pub use event::{Event, EventFilter, EventKind};
pub use manager::{notify, notify_ready, register_listener, unregister_listener, EventManager};
pub use queue::EventQueue;
