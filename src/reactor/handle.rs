//! Cross-thread handle into the event loop.
//!
//! The only shared mutable state crossing threads in the whole runtime is
//! the completion channel wrapped here: a worker posts a finished job's
//! result and nudges the reactor awake. Promises themselves are never
//! touched off the reactor thread.

use crate::error::RuntimeError;
use crate::reactor::poller::WakeHandle;
use crate::value::Value;

use std::sync::mpsc::Sender;

/// Identifies a pending cross-thread completion slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RemoteId(pub(crate) u64);

/// A finished off-thread job, en route to the reactor.
pub(crate) struct Completion {
    pub(crate) id: RemoteId,
    pub(crate) result: Result<Value, RuntimeError>,
}

/// `Send + Clone` handle used by worker threads to deliver results.
#[derive(Clone)]
pub(crate) struct LoopHandle {
    transmitter: Sender<Completion>,
    wake: WakeHandle,
}

impl LoopHandle {
    pub(crate) fn new(transmitter: Sender<Completion>, wake: WakeHandle) -> Self {
        Self { transmitter, wake }
    }

    /// Posts a completion onto the loop's ready side and wakes it if it is
    /// blocked in the poller.
    pub(crate) fn post(&self, id: RemoteId, result: Result<Value, RuntimeError>) {
        // A send can only fail once the loop is gone; the result is moot then.
        let _ = self.transmitter.send(Completion { id, result });
        self.wake.wake();
    }
}
