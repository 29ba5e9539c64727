//! Adapters that bring the different handler authoring styles onto the one
//! [`Suspendable`] capability.
//!
//! Three styles coexist:
//! - explicit production: the computation's own `Step::Emit`s are the output
//!   chunks; nothing to adapt,
//! - implicit suspension: the computation can only suspend, so [`emit`]
//!   smuggles a chunk through a zero-delay suspension the executor unwraps,
//! - legacy promise-parameter: the computation receives its promise and must
//!   settle it itself; see
//!   [`Executor::launch_legacy`](crate::executor::Executor::launch_legacy).

use crate::error::RuntimeError;
use crate::suspend::{Resumption, Step, Suspendable, Suspension};
use crate::value::Value;

/// Side-channel output for implicit-suspension computations.
///
/// Returns a suspension carrying the chunk as payload; the executor forwards
/// it to the streaming adapter and resumes the computation with no delay, so
/// from the adapter's point of view emission is indistinguishable from
/// explicit production.
pub fn emit(chunk: impl Into<Vec<u8>>) -> Suspension {
    Suspension::Emit(chunk.into())
}

struct FnCompute<F> {
    call: Option<F>,
}

impl<F> Suspendable for FnCompute<F>
where
    F: FnOnce() -> Result<Value, RuntimeError>,
{
    fn resume(&mut self, _input: Resumption) -> Result<Step, RuntimeError> {
        match self.call.take() {
            Some(call) => Ok(Step::Done(call()?)),
            None => Err(RuntimeError::handler("computation resumed after completion")),
        }
    }
}

/// Wraps a plain fallible closure as a single-step computation.
///
/// Useful for driving ordinary synchronous handlers under the same contract
/// as suspending ones, and as the leaf of a nested `Step::Call` chain.
pub fn from_fn(
    call: impl FnOnce() -> Result<Value, RuntimeError> + 'static,
) -> Box<dyn Suspendable> {
    Box::new(FnCompute { call: Some(call) })
}
