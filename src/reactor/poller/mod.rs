//! Pluggable OS readiness capability.
//!
//! The loop blocks inside a [`Poller`] when socket watches are outstanding.
//! [`PollPoller`] is the real poll(2)-backed implementation; [`NullPoller`]
//! is the default for loops built without I/O support and rejects
//! registrations outright.

mod null;
mod poll;

pub use null::NullPoller;
pub use poll::PollPoller;

use crate::error::RuntimeError;

use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Readiness directions a watch subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub const READ: Interest = Interest {
        read: true,
        write: false,
    };

    pub const WRITE: Interest = Interest {
        read: false,
        write: true,
    };
}

/// Wakes a loop blocked inside its poller, from any thread.
#[derive(Clone)]
pub struct WakeHandle {
    inner: Arc<dyn Fn() + Send + Sync>,
}

impl WakeHandle {
    pub(crate) fn new(wake: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(wake),
        }
    }

    /// A handle that does nothing; used when the loop never blocks in a
    /// poller and wakes through the completion channel instead.
    pub(crate) fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn wake(&self) {
        (self.inner)();
    }
}

/// OS readiness backend the loop blocks in.
///
/// Subscriptions are keyed by token, not by descriptor: several watches may
/// target one descriptor (read interest plus write-readiness on the same
/// connection) and each settles independently.
pub trait Poller {
    /// Subscribes a descriptor under the given token (one-shot from the
    /// loop's point of view; the loop deregisters on delivery).
    fn register(&mut self, fd: RawFd, interest: Interest, token: u64) -> Result<(), RuntimeError>;

    /// Removes one subscription; sibling watches on the same descriptor
    /// stay registered.
    fn deregister(&mut self, token: u64) -> Result<(), RuntimeError>;

    /// Blocks until a watched descriptor is ready, the timeout elapses or
    /// the wake handle fires. Ready tokens are appended to `ready`.
    fn poll(&mut self, timeout: Option<Duration>, ready: &mut Vec<u64>) -> Result<(), RuntimeError>;

    /// A `Send` handle that interrupts a blocked `poll`.
    fn wake_handle(&self) -> WakeHandle;
}
