//! Error taxonomy for the runtime.
//!
//! Cancellation is deliberately absent from this enum: a cancelled operation
//! settles its promise with [`Outcome::Cancelled`](crate::promise::Outcome),
//! which awaiting code can tell apart from a failure. Everything that really
//! is an error lives here.

use thiserror::Error;

/// Errors produced by the runtime core.
///
/// Cloneable and comparable so that a single error can be fanned out to every
/// continuation registered on a promise and asserted on in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A promise was resolved, rejected or cancelled a second time.
    ///
    /// This is a programmer error: the first settlement stands and the
    /// offending call gets this error back.
    #[error("promise already settled")]
    AlreadySettled,

    /// A legacy computation ran to its natural end without ever settling
    /// the promise it was handed. Surfaced by the guard timer instead of
    /// hanging forever.
    #[error("legacy computation never settled its promise")]
    IncompleteComputation,

    /// The transport failed mid-stream. Chunks already written stand; the
    /// stream is terminally broken, not rolled back.
    #[error("broken stream: {0}")]
    BrokenStream(String),

    /// An ordinary error raised by handler logic. Propagated to the
    /// computation's promise as a rejection; never retried at this layer.
    #[error("{0}")]
    Handler(String),

    /// A platform-level readiness failure (poller registration or poll call).
    #[error("i/o error: {0}")]
    Io(String),

    /// The worker pool has shut down and can no longer accept submissions.
    #[error("worker pool closed")]
    PoolClosed,

    /// The event loop ran out of work while something was still being
    /// awaited. Indicates a promise that nothing will ever settle.
    #[error("event loop stalled with work still pending")]
    Stalled,
}

impl RuntimeError {
    /// Shorthand for an ordinary handler error carrying a message.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}
