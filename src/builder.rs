//! Fluent builder for Runtime construction.

use crate::error::RuntimeError;
use crate::executor::Executor;
use crate::reactor::poller::{NullPoller, PollPoller, Poller};
use crate::reactor::EventLoop;
use crate::runtime::{DEFAULT_LEGACY_GUARD, DEFAULT_WORKERS, Runtime};

use std::time::Duration;

/// Builder for constructing [`Runtime`] instances with a fluent API.
///
/// # Example
/// ```ignore
/// let rt = RuntimeBuilder::new()
///     .worker_threads(4)
///     .enable_io()
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    worker_threads: usize,
    legacy_guard: Duration,
    enable_io: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            worker_threads: DEFAULT_WORKERS,
            legacy_guard: DEFAULT_LEGACY_GUARD,
            enable_io: false,
        }
    }

    /// Sets the size of the blocking-work pool (at least one thread).
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = count.max(1);
        self
    }

    /// Sets how long a legacy computation may leave its supplied promise
    /// pending after running to its natural end before it is failed with
    /// [`RuntimeError::IncompleteComputation`].
    pub fn legacy_guard(mut self, guard: Duration) -> Self {
        self.legacy_guard = guard;
        self
    }

    /// Enables socket readiness support through the platform poller.
    pub fn enable_io(mut self) -> Self {
        self.enable_io = true;
        self
    }

    /// Builds the runtime. Fails only when the platform poller cannot be
    /// set up.
    pub fn build(self) -> Result<Runtime, RuntimeError> {
        let poller: Box<dyn Poller> = if self.enable_io {
            Box::new(PollPoller::new()?)
        } else {
            Box::new(NullPoller::new())
        };

        let event_loop = EventLoop::with_poller(poller);
        let executor = Executor::new(&event_loop, self.worker_threads, self.legacy_guard);

        Ok(Runtime::from_parts(event_loop, executor))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
