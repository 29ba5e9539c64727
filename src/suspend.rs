//! The suspension protocol between computations and the executor.
//!
//! A computation is a resumable unit of work: each resumption runs one
//! synchronous step and reports what happened as a [`Step`]. Producing
//! output is free and does not yield control; only an explicit
//! [`Suspension`] pauses the computation until the requested event settles.

use crate::error::RuntimeError;
use crate::promise::Promise;
use crate::reactor::poller::Interest;
use crate::value::Value;

use std::os::unix::io::RawFd;
use std::time::Duration;

/// A blocking callable shipped to the worker pool.
///
/// Runs off the reactor thread; its result crosses back through the loop's
/// completion channel, so both the closure and its output must be `Send`.
pub type BlockingJob = Box<dyn FnOnce() -> Result<Value, RuntimeError> + Send>;

/// A request to pause the issuing computation until an event settles.
///
/// Exactly one suspension is outstanding per computation at any time; the
/// executor will not resume the computation until the request is satisfied.
pub enum Suspension {
    /// Resume after the given duration has elapsed.
    Sleep(Duration),
    /// Resume once the descriptor reports the requested readiness.
    WaitSocket(RawFd, Interest),
    /// Run the callable on the worker pool; resume with its result.
    RunOnThread(BlockingJob),
    /// Resume with the outcome of the given promise.
    Await(Promise),
    /// Zero-delay suspension carrying an output chunk.
    ///
    /// The implicit-suspension bridge: the executor forwards the payload to
    /// the streaming adapter and resumes immediately, making emission
    /// indistinguishable from explicit production.
    Emit(Vec<u8>),
}

/// What a computation is resumed with.
#[derive(Debug, Clone, PartialEq)]
pub enum Resumption {
    /// First resumption; no prior suspension outcome exists.
    Start,
    /// The pending suspension resolved with a value.
    Resolved(Value),
    /// The pending suspension failed; delivered like a normal result so
    /// handler logic can use ordinary error recovery.
    Failed(RuntimeError),
    /// The pending suspension was cancelled.
    Cancelled,
}

impl Resumption {
    /// Converts the resumption into a plain result, treating `Start` as a
    /// null value and cancellation as a handler-visible error.
    pub fn into_result(self) -> Result<Value, RuntimeError> {
        match self {
            Resumption::Start => Ok(Value::Null),
            Resumption::Resolved(value) => Ok(value),
            Resumption::Failed(error) => Err(error),
            Resumption::Cancelled => Err(RuntimeError::handler("awaited operation was cancelled")),
        }
    }
}

/// The effect of one resumption step.
pub enum Step {
    /// Produce an output chunk. Does not yield control: the executor
    /// forwards the chunk and resumes the computation immediately (unless
    /// the transport applies backpressure).
    Emit(Vec<u8>),
    /// Pause until the request settles.
    Suspend(Suspension),
    /// Delegate to a nested computation. The executor pushes it as a child
    /// frame and resumes the parent with the child's final result, so the
    /// event loop only ever sees leaf-level suspensions.
    Call(Box<dyn Suspendable>),
    /// The computation finished with a final value.
    Done(Value),
}

/// A resumable computation driven by the executor.
///
/// `resume` runs one step synchronously and must be short by contract:
/// cancellation never interrupts a step, it only takes effect between them.
/// Returning `Err` is how a computation raises; the executor propagates the
/// error to the parent frame, or to the computation's promise at the root.
pub trait Suspendable {
    /// Runs one step, given the outcome of the previous suspension.
    fn resume(&mut self, input: Resumption) -> Result<Step, RuntimeError>;
}
