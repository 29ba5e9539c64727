//! Event-driven reactor module.
//!
//! - [`core`]: the single-threaded event loop
//! - [`timer`]: the fire-time-ordered timer queue
//! - [`handle`]: the cross-thread completion handle
//! - [`poller`]: the pluggable OS readiness capability

pub mod core;
pub(crate) mod handle;
pub mod poller;
pub mod timer;

pub use core::{EventLoop, WatchToken};
pub use poller::{Interest, NullPoller, PollPoller, Poller, WakeHandle};
pub use timer::TimerKey;
