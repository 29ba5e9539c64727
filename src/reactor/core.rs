//! Single-threaded reactor: ready queue, timer queue, socket watches.
//!
//! One `EventLoop` instance per worker process, constructed explicitly and
//! passed to every component that schedules work; there is no ambient
//! global loop. Each turn runs the ready continuations, folds in
//! cross-thread completions, then blocks for at most the time until the
//! earliest timer, on the poller when sockets are watched or on the
//! completion channel otherwise.

use crate::error::RuntimeError;
use crate::promise::{Outcome, Promise};
use crate::reactor::handle::{Completion, LoopHandle, RemoteId};
use crate::reactor::poller::{Interest, NullPoller, Poller, WakeHandle};
use crate::reactor::timer::{TimerKey, TimerQueue};
use crate::value::Value;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

pub(crate) type Continuation = Box<dyn FnOnce()>;

/// Identifies a pending socket-readiness subscription for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchToken(u64);

/// Loop state shared with the executor and the thread bridge on the
/// reactor thread. All queues are exclusively reactor-thread-owned; the
/// completion channel is the single cross-thread handoff.
pub(crate) struct LoopShared {
    ready: RefCell<VecDeque<Continuation>>,
    timers: RefCell<TimerQueue>,
    watches: RefCell<HashMap<u64, Promise>>,
    remote: RefCell<HashMap<u64, Promise>>,
    poller: RefCell<Box<dyn Poller>>,
    next_token: Cell<u64>,
    next_remote: Cell<u64>,
    stopped: Cell<bool>,
    transmitter: Sender<Completion>,
    wake: WakeHandle,
}

impl LoopShared {
    /// Enqueues a continuation to run on the next turn.
    pub(crate) fn schedule(&self, continuation: Continuation) {
        self.ready.borrow_mut().push_back(continuation);
    }

    /// Schedules a timer firing after `duration`.
    pub(crate) fn sleep(&self, duration: Duration) -> (TimerKey, Promise) {
        self.timer_at(Instant::now() + duration)
    }

    /// Schedules a timer firing at an explicit instant. Equal instants fire
    /// in registration order.
    pub(crate) fn timer_at(&self, at: Instant) -> (TimerKey, Promise) {
        self.timers.borrow_mut().insert(at)
    }

    /// Cancels a pending timer: the entry is removed and its promise
    /// settles as cancelled rather than silently vanishing.
    pub(crate) fn cancel_timer(&self, key: TimerKey) {
        let promise = self.timers.borrow_mut().cancel(key);
        if let Some(promise) = promise {
            let _ = promise.cancel();
        }
    }

    /// Subscribes to readiness on a descriptor; the promise resolves once
    /// the poller reports it ready (one-shot).
    pub(crate) fn watch(
        &self,
        fd: RawFd,
        interest: Interest,
    ) -> Result<(WatchToken, Promise), RuntimeError> {
        let token = self.next_token.get();
        self.next_token.set(token.wrapping_add(1));

        self.poller.borrow_mut().register(fd, interest, token)?;

        let promise = Promise::new();
        self.watches.borrow_mut().insert(token, promise.clone());

        Ok((WatchToken(token), promise))
    }

    /// Cancels a pending watch: its interest is removed from the poller
    /// (sibling watches on the same descriptor stand) and the promise
    /// settles as cancelled.
    pub(crate) fn cancel_watch(&self, token: WatchToken) {
        let promise = self.watches.borrow_mut().remove(&token.0);
        if let Some(promise) = promise {
            let _ = self.poller.borrow_mut().deregister(token.0);
            let _ = promise.cancel();
        }
    }

    /// Opens a completion slot for an off-thread job. The worker posts the
    /// result under the returned id and the loop settles the promise on the
    /// reactor thread.
    pub(crate) fn remote_promise(&self) -> (RemoteId, Promise) {
        let id = self.next_remote.get();
        self.next_remote.set(id.wrapping_add(1));

        let promise = Promise::new();
        self.remote.borrow_mut().insert(id, promise.clone());

        (RemoteId(id), promise)
    }

    /// Discards a pending completion slot: the job may still finish, but
    /// its result is dropped and the promise settles as cancelled now.
    pub(crate) fn cancel_remote(&self, id: RemoteId) {
        let promise = self.remote.borrow_mut().remove(&id.0);
        if let Some(promise) = promise {
            let _ = promise.cancel();
        }
    }

    /// Fails a pending completion slot before any worker picked it up.
    pub(crate) fn reject_remote(&self, id: RemoteId, error: RuntimeError) {
        let promise = self.remote.borrow_mut().remove(&id.0);
        if let Some(promise) = promise {
            let _ = promise.reject(error);
        }
    }

    /// A `Send` handle for posting completions from worker threads.
    pub(crate) fn loop_handle(&self) -> LoopHandle {
        LoopHandle::new(self.transmitter.clone(), self.wake.clone())
    }

    /// Requests the loop to stop after the current turn.
    pub(crate) fn stop(&self) {
        self.stopped.set(true);
    }

    fn complete_remote(&self, completion: Completion) {
        let promise = self.remote.borrow_mut().remove(&completion.id.0);
        match promise {
            Some(promise) => {
                let settled = match completion.result {
                    Ok(value) => promise.resolve(value),
                    Err(error) => promise.reject(error),
                };
                if settled.is_err() {
                    tracing::warn!(id = completion.id.0, "remote completion hit a settled promise");
                }
            }
            // Slot was cancelled; the job ran to completion but its result
            // is discarded.
            None => tracing::trace!(id = completion.id.0, "discarding cancelled job result"),
        }
    }

    fn complete_watch(&self, token: u64) {
        let promise = self.watches.borrow_mut().remove(&token);
        if let Some(promise) = promise {
            let _ = self.poller.borrow_mut().deregister(token);
            let _ = promise.resolve(Value::Null);
        }
    }

    // Resolves every timer due by now, earliest (deadline, seq) first.
    // Continuations registered on each promise run synchronously and push
    // their follow-up work onto the ready queue.
    fn fire_due_timers(&self) {
        loop {
            let due = self.timers.borrow_mut().pop_due(Instant::now());
            match due {
                Some(promise) => {
                    let _ = promise.resolve(Value::Null);
                }
                None => break,
            }
        }
    }
}

/// The single-threaded reactor driving timers, socket readiness and ready
/// continuations.
pub struct EventLoop {
    shared: Rc<LoopShared>,
    completions: Receiver<Completion>,
}

impl EventLoop {
    /// Creates a loop without socket support; timers, thread offloading and
    /// promise scheduling all work.
    pub fn new() -> Self {
        Self::with_poller(Box::new(NullPoller::new()))
    }

    /// Creates a loop blocking on the given readiness poller.
    pub fn with_poller(poller: Box<dyn Poller>) -> Self {
        let (transmitter, completions) = mpsc::channel();
        let wake = poller.wake_handle();

        let shared = Rc::new(LoopShared {
            ready: RefCell::new(VecDeque::new()),
            timers: RefCell::new(TimerQueue::new()),
            watches: RefCell::new(HashMap::new()),
            remote: RefCell::new(HashMap::new()),
            poller: RefCell::new(poller),
            next_token: Cell::new(0),
            next_remote: Cell::new(0),
            stopped: Cell::new(false),
            transmitter,
            wake,
        });

        Self {
            shared,
            completions,
        }
    }

    pub(crate) fn shared(&self) -> Rc<LoopShared> {
        self.shared.clone()
    }

    /// Enqueues a continuation onto the ready queue.
    pub fn schedule(&self, continuation: impl FnOnce() + 'static) {
        self.shared.schedule(Box::new(continuation));
    }

    /// Schedules a timer firing after `duration`.
    pub fn sleep(&self, duration: Duration) -> (TimerKey, Promise) {
        self.shared.sleep(duration)
    }

    /// Schedules a timer firing at an explicit instant. Timers scheduled
    /// for the same instant fire in registration order.
    pub fn timer_at(&self, at: Instant) -> (TimerKey, Promise) {
        self.shared.timer_at(at)
    }

    /// Cancels a pending timer; its promise settles as cancelled.
    pub fn cancel_timer(&self, key: TimerKey) {
        self.shared.cancel_timer(key);
    }

    /// Subscribes to socket readiness; fails when the loop was built
    /// without I/O support.
    pub fn watch(
        &self,
        fd: RawFd,
        interest: Interest,
    ) -> Result<(WatchToken, Promise), RuntimeError> {
        self.shared.watch(fd, interest)
    }

    /// Cancels a pending watch; interest is removed from the poller and the
    /// promise settles as cancelled.
    pub fn cancel_watch(&self, token: WatchToken) {
        self.shared.cancel_watch(token);
    }

    /// Requests the loop to stop after the current turn.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Runs until no timers, watches, completions or ready continuations
    /// remain, or the loop is stopped.
    pub fn run(&self) -> Result<(), RuntimeError> {
        while !self.shared.stopped.get() {
            if !self.turn()? {
                break;
            }
        }
        Ok(())
    }

    /// Runs until the given promise settles, returning its outcome.
    ///
    /// Errs with [`RuntimeError::Stalled`] if the loop runs out of work
    /// first: nothing left in the system could ever settle the promise.
    pub fn run_until(&self, promise: &Promise) -> Result<Outcome, RuntimeError> {
        loop {
            if let Some(outcome) = promise.outcome() {
                return Ok(outcome);
            }
            if self.shared.stopped.get() || !self.turn()? {
                return promise.outcome().ok_or(RuntimeError::Stalled);
            }
        }
    }

    // One reactor turn. Returns false once fully idle.
    fn turn(&self) -> Result<bool, RuntimeError> {
        let shared = &self.shared;

        // Run every continuation currently ready; each may enqueue more.
        loop {
            let next = shared.ready.borrow_mut().pop_front();
            match next {
                Some(continuation) => continuation(),
                None => break,
            }
        }

        // Fold in results posted by worker threads while we were busy.
        while let Ok(completion) = self.completions.try_recv() {
            shared.complete_remote(completion);
        }

        shared.fire_due_timers();

        if !shared.ready.borrow().is_empty() {
            return Ok(true);
        }

        // Minimal wait: time until the earliest timer, indefinite if only
        // sockets or off-thread jobs are pending.
        let deadline = shared.timers.borrow_mut().next_deadline();
        let timeout = deadline.map(|at| at.saturating_duration_since(Instant::now()));
        let has_watches = !shared.watches.borrow().is_empty();
        let has_remote = !shared.remote.borrow().is_empty();

        if timeout.is_none() && !has_watches && !has_remote {
            return Ok(false);
        }

        if has_watches {
            let mut ready_tokens = Vec::new();
            shared.poller.borrow_mut().poll(timeout, &mut ready_tokens)?;
            for token in ready_tokens {
                shared.complete_watch(token);
            }
        } else if has_remote {
            let completion = match timeout {
                Some(timeout) => match self.completions.recv_timeout(timeout) {
                    Ok(completion) => Some(completion),
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
                },
                None => self.completions.recv().ok(),
            };
            if let Some(completion) = completion {
                shared.complete_remote(completion);
            }
        } else if let Some(timeout) = timeout {
            if !timeout.is_zero() {
                thread::sleep(timeout);
            }
        }

        shared.fire_due_timers();

        Ok(true)
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}
