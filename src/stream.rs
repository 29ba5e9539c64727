//! Streaming adapter: incremental handler output to a response transport.
//!
//! Chunks reach the transport strictly in production order and none are
//! dropped. When the transport cannot accept bytes (slow client), `push`
//! hands back a gate promise the executor awaits before resuming the
//! producing computation, so a fast producer suspends instead of buffering
//! without bound. Failure after partial output is terminal: HTTP cannot
//! un-send bytes, so already-written chunks stand and the stream is marked
//! broken rather than rolled back.

use crate::error::RuntimeError;
use crate::promise::{Outcome, Promise};
use crate::value::Value;

use std::cell::RefCell;
use std::rc::Rc;

/// The response-side channel the adapter writes into.
///
/// `on_writable` continuations are invoked when writability returns, never
/// synchronously from within the registering call.
pub trait Transport {
    /// Whether the transport can accept more bytes right now.
    fn is_writable(&self) -> bool;

    /// Registers a continuation to run once the transport becomes writable.
    fn on_writable(&mut self, continuation: Box<dyn FnOnce()>);

    /// Writes one chunk. An error means the stream is broken.
    fn write(&mut self, chunk: &[u8]) -> Result<(), RuntimeError>;

    /// Finalizes the stream cleanly.
    fn close(&mut self) -> Result<(), RuntimeError>;

    /// Surfaces a mid-stream error state. Defaults to closing.
    fn fail(&mut self, _error: &RuntimeError) {
        let _ = self.close();
    }
}

/// Result of a [`StreamingAdapter::push`].
pub enum PushOutcome {
    /// The chunk reached the transport; production may continue at once.
    Written,
    /// The transport is backed up. The chunk is held and will be flushed
    /// when writability returns; the promise resolves once it has been,
    /// and the producing computation must suspend on it.
    NotReady(Promise),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdapterState {
    Idle,
    Open,
    Closed,
    Broken,
}

struct AdapterInner {
    transport: Box<dyn Transport>,
    state: AdapterState,
    declared_length: Option<u64>,
    pending: Option<(Vec<u8>, Promise)>,
}

/// Bridges a running computation's produced chunks to an open transport.
///
/// Cheap to clone; all clones share the same underlying stream state.
#[derive(Clone)]
pub struct StreamingAdapter {
    inner: Rc<RefCell<AdapterInner>>,
}

impl StreamingAdapter {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(AdapterInner {
                transport,
                state: AdapterState::Idle,
                declared_length: None,
                pending: None,
            })),
        }
    }

    /// Signals that output will arrive incrementally.
    ///
    /// `declared_length` of `None` means the total size is unknown and
    /// chunked delivery applies. Called implicitly by the first `push` when
    /// the handler does not call it itself.
    pub fn begin(&self, declared_length: Option<u64>) {
        let mut inner = self.inner.borrow_mut();
        if inner.state == AdapterState::Idle {
            inner.state = AdapterState::Open;
            inner.declared_length = declared_length;
        }
    }

    /// The length declared at `begin`, if any.
    pub fn declared_length(&self) -> Option<u64> {
        self.inner.borrow().declared_length
    }

    /// Enqueues one chunk for immediate transport write.
    pub fn push(&self, chunk: Vec<u8>) -> Result<PushOutcome, RuntimeError> {
        let mut inner = self.inner.borrow_mut();

        match inner.state {
            AdapterState::Broken => {
                return Err(RuntimeError::BrokenStream("stream is broken".into()));
            }
            AdapterState::Closed => {
                return Err(RuntimeError::BrokenStream("stream is closed".into()));
            }
            AdapterState::Idle => inner.state = AdapterState::Open,
            AdapterState::Open => {}
        }

        if inner.transport.is_writable() {
            match inner.transport.write(&chunk) {
                Ok(()) => Ok(PushOutcome::Written),
                Err(error) => {
                    inner.state = AdapterState::Broken;
                    inner.transport.fail(&error);
                    Err(error)
                }
            }
        } else {
            let gate = Promise::new();
            inner.pending = Some((chunk, gate.clone()));

            let adapter = self.clone();
            inner
                .transport
                .on_writable(Box::new(move || adapter.flush_pending()));

            Ok(PushOutcome::NotReady(gate))
        }
    }

    /// Terminates the stream with the computation's final outcome.
    ///
    /// Success and cancellation close the transport cleanly; failure marks
    /// the stream broken mid-flight, leaving already-sent chunks in place.
    pub fn finish(&self, outcome: &Outcome) {
        let dropped_gate = {
            let mut inner = self.inner.borrow_mut();

            if matches!(inner.state, AdapterState::Closed | AdapterState::Broken) {
                return;
            }

            let dropped = inner.pending.take().map(|(_, gate)| gate);

            match outcome {
                Outcome::Failed(error) => {
                    tracing::warn!(%error, "stream terminated mid-flight");
                    inner.state = AdapterState::Broken;
                    inner.transport.fail(error);
                }
                Outcome::Resolved(_) | Outcome::Cancelled => {
                    inner.state = AdapterState::Closed;
                    if let Err(error) = inner.transport.close() {
                        tracing::warn!(%error, "transport close failed");
                        inner.state = AdapterState::Broken;
                    }
                }
            }

            dropped
        };

        if let Some(gate) = dropped_gate {
            let _ = gate.cancel();
        }
    }

    /// Whether the stream has been terminated by a mid-flight failure.
    pub fn is_broken(&self) -> bool {
        self.inner.borrow().state == AdapterState::Broken
    }

    /// Whether the stream has been closed cleanly.
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().state == AdapterState::Closed
    }

    // Writes the held chunk once the transport reports writable again, then
    // settles the gate so the executor resumes the producer.
    fn flush_pending(&self) {
        let settled = {
            let mut inner = self.inner.borrow_mut();

            let Some((chunk, gate)) = inner.pending.take() else {
                return;
            };

            if inner.state != AdapterState::Open {
                Some((gate, None))
            } else if !inner.transport.is_writable() {
                // Writability flapped before we got to run; re-arm.
                inner.pending = Some((chunk, gate));
                let adapter = self.clone();
                inner
                    .transport
                    .on_writable(Box::new(move || adapter.flush_pending()));
                None
            } else {
                match inner.transport.write(&chunk) {
                    Ok(()) => Some((gate, Some(Ok(())))),
                    Err(error) => {
                        inner.state = AdapterState::Broken;
                        inner.transport.fail(&error);
                        Some((gate, Some(Err(error))))
                    }
                }
            }
        };

        // Settle outside the borrow: gate continuations re-enter the
        // executor.
        if let Some((gate, result)) = settled {
            match result {
                Some(Ok(())) => {
                    let _ = gate.resolve(Value::Null);
                }
                Some(Err(error)) => {
                    let _ = gate.reject(error);
                }
                None => {
                    let _ = gate.cancel();
                }
            }
        }
    }
}

#[derive(Default)]
struct MemoryState {
    chunks: Vec<Vec<u8>>,
    blocked: bool,
    closed: bool,
    error: Option<RuntimeError>,
    waiters: Vec<Box<dyn FnOnce()>>,
}

/// In-process transport recording chunks in production order.
///
/// Doubles as the buffered-response path and as the test double for the
/// streaming contract: writability can be toggled to exercise backpressure,
/// and the terminal marker (closed or errored) is observable.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxes a clone of this transport for handing to an adapter.
    pub fn boxed(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }

    /// Toggles writability. Turning it back on runs every waiting
    /// continuation, in registration order.
    pub fn set_writable(&self, writable: bool) {
        let waiters = {
            let mut state = self.state.borrow_mut();
            state.blocked = !writable;
            if writable {
                std::mem::take(&mut state.waiters)
            } else {
                Vec::new()
            }
        };

        for waiter in waiters {
            waiter();
        }
    }

    /// The chunks written so far, in production order.
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.state.borrow().chunks.clone()
    }

    /// The chunks written so far, decoded lossily as UTF-8.
    pub fn chunk_strings(&self) -> Vec<String> {
        self.state
            .borrow()
            .chunks
            .iter()
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect()
    }

    /// Whether the stream reached its terminal marker.
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// The mid-stream error, if the stream ended broken.
    pub fn error(&self) -> Option<RuntimeError> {
        self.state.borrow().error.clone()
    }
}

impl Transport for MemoryTransport {
    fn is_writable(&self) -> bool {
        let state = self.state.borrow();
        !state.blocked && !state.closed
    }

    fn on_writable(&mut self, continuation: Box<dyn FnOnce()>) {
        self.state.borrow_mut().waiters.push(continuation);
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), RuntimeError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(RuntimeError::BrokenStream("transport closed".into()));
        }
        state.chunks.push(chunk.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<(), RuntimeError> {
        self.state.borrow_mut().closed = true;
        Ok(())
    }

    fn fail(&mut self, error: &RuntimeError) {
        let mut state = self.state.borrow_mut();
        state.error = Some(error.clone());
        state.closed = true;
    }
}
