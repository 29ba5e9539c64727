//! Single-assignment result cells with completion continuations.
//!
//! A [`Promise`] is the runtime's completion primitive: it starts out
//! pending, settles exactly once with an [`Outcome`], and notifies every
//! registered continuation in registration order at the moment of
//! settlement. All settlement happens on the reactor thread, so no locking
//! is involved; the thread bridge hands results over through the loop's
//! completion channel instead of touching a promise from a worker thread.

use crate::error::RuntimeError;
use crate::value::Value;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// The final result of a settled promise.
///
/// Cancellation is a first-class outcome, distinguishable from both success
/// and failure, so awaiting code can react to it explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The operation completed with a value.
    Resolved(Value),
    /// The operation raised an error.
    Failed(RuntimeError),
    /// The operation was cancelled before it could complete.
    Cancelled,
}

type Continuation = Box<dyn FnOnce(&Outcome)>;

struct Inner {
    outcome: Option<Outcome>,
    continuations: Vec<Continuation>,
}

/// A single-assignment container for an eventual outcome.
///
/// Cloning a promise clones a handle to the same cell; ownership is shared
/// between the operation that will settle it and the code awaiting it.
#[derive(Clone)]
pub struct Promise {
    inner: Rc<RefCell<Inner>>,
}

impl Promise {
    /// Creates a new pending promise.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                outcome: None,
                continuations: Vec::new(),
            })),
        }
    }

    /// Settles the promise with the given outcome.
    ///
    /// Continuations run synchronously, in registration order, and the list
    /// is cleared afterwards. Returns [`RuntimeError::AlreadySettled`] if the
    /// promise was settled before; the stored outcome is left untouched.
    pub fn settle(&self, outcome: Outcome) -> Result<(), RuntimeError> {
        let continuations = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return Err(RuntimeError::AlreadySettled);
            }
            inner.outcome = Some(outcome.clone());
            std::mem::take(&mut inner.continuations)
        };

        // Run continuations outside the borrow: they may inspect the promise
        // or register further continuations.
        for continuation in continuations {
            continuation(&outcome);
        }

        Ok(())
    }

    /// Transitions `Pending -> Resolved(value)`.
    pub fn resolve(&self, value: Value) -> Result<(), RuntimeError> {
        self.settle(Outcome::Resolved(value))
    }

    /// Transitions `Pending -> Failed(error)`.
    pub fn reject(&self, error: RuntimeError) -> Result<(), RuntimeError> {
        self.settle(Outcome::Failed(error))
    }

    /// Transitions `Pending -> Cancelled`.
    pub fn cancel(&self) -> Result<(), RuntimeError> {
        self.settle(Outcome::Cancelled)
    }

    /// Settles the promise if it is still pending, reporting whether this
    /// call performed the settlement.
    ///
    /// Used by callback adapters that may race a guard timer: the first
    /// settlement wins and the loser backs off silently.
    pub fn try_settle(&self, outcome: Outcome) -> bool {
        self.settle(outcome).is_ok()
    }

    /// Registers a continuation to run when the promise settles.
    ///
    /// If the promise has already settled, the continuation runs immediately
    /// with the stored outcome; no suspension is involved.
    pub fn on_settled(&self, continuation: impl FnOnce(&Outcome) + 'static) {
        let settled = self.inner.borrow().outcome.clone();
        match settled {
            Some(outcome) => continuation(&outcome),
            None => self
                .inner
                .borrow_mut()
                .continuations
                .push(Box::new(continuation)),
        }
    }

    /// Whether the promise has left the pending state.
    pub fn is_settled(&self) -> bool {
        self.inner.borrow().outcome.is_some()
    }

    /// A copy of the stored outcome, if the promise has settled.
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.borrow().outcome.clone()
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.borrow().outcome {
            Some(ref outcome) => write!(f, "Promise({outcome:?})"),
            None => write!(f, "Promise(Pending)"),
        }
    }
}
