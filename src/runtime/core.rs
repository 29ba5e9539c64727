//! Top-level runtime assembling the loop, executor and thread bridge.
//!
//! A `Runtime` is one reactor thread's worth of machinery: routers hand it
//! computations, it hands back their promises and streaming handles, and
//! `run` / `run_until` drive everything to completion.

use crate::error::RuntimeError;
use crate::executor::{Executor, Spawn};
use crate::promise::{Outcome, Promise};
use crate::reactor::EventLoop;
use crate::stream::{StreamingAdapter, Transport};
use crate::suspend::Suspendable;

use std::time::Duration;

pub(crate) const DEFAULT_WORKERS: usize = 1;
pub(crate) const DEFAULT_LEGACY_GUARD: Duration = Duration::from_secs(30);

/// Single-threaded cooperative runtime.
///
/// Construct directly with [`Runtime::new`] for a loop without socket
/// support, or through [`RuntimeBuilder`](crate::RuntimeBuilder) to enable
/// I/O and tune the worker pool.
pub struct Runtime {
    event_loop: EventLoop,
    executor: Executor,
}

impl Runtime {
    /// Creates a runtime with default configuration: no socket support,
    /// one worker thread, a 30 second legacy guard.
    pub fn new() -> Self {
        let event_loop = EventLoop::new();
        let executor = Executor::new(&event_loop, DEFAULT_WORKERS, DEFAULT_LEGACY_GUARD);

        Self {
            event_loop,
            executor,
        }
    }

    pub(crate) fn from_parts(event_loop: EventLoop, executor: Executor) -> Self {
        Self {
            event_loop,
            executor,
        }
    }

    /// The underlying event loop, for scheduling timers and watches
    /// directly.
    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// The executor driving computations on this runtime.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Registers a computation whose output streams to the given transport.
    ///
    /// Returns the computation's promise and cancellation handle; the first
    /// step runs once the loop is driven.
    pub fn spawn(&self, body: Box<dyn Suspendable>, transport: Box<dyn Transport>) -> Spawn {
        self.executor
            .launch(body, StreamingAdapter::new(transport))
    }

    /// Registers a legacy computation that receives its promise as a
    /// parameter and must settle it itself. The configured guard timeout
    /// bounds how long it may stay pending after the body runs out.
    pub fn spawn_legacy(
        &self,
        make: impl FnOnce(Promise) -> Box<dyn Suspendable>,
        transport: Box<dyn Transport>,
    ) -> Spawn {
        self.executor
            .launch_legacy(make, StreamingAdapter::new(transport))
    }

    /// Drives the loop until nothing remains pending or it is stopped.
    pub fn run(&self) -> Result<(), RuntimeError> {
        self.event_loop.run()
    }

    /// Drives the loop until the promise settles, returning its outcome.
    pub fn run_until(&self, promise: &Promise) -> Result<Outcome, RuntimeError> {
        self.event_loop.run_until(promise)
    }

    /// Requests the loop to stop after the current turn.
    pub fn stop(&self) {
        self.event_loop.stop();
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
