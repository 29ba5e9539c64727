//! Drives suspendable computations step by step.
//!
//! The executor resumes a computation, translates each suspension request
//! into a scheduling action on the event loop, and arranges for the
//! computation to be resumed with the outcome once the underlying event
//! settles. Producing output never yields control: emitted chunks are
//! forwarded to the streaming adapter and the computation is resumed
//! immediately, unless the transport applies backpressure.

use crate::bridge::ThreadBridge;
use crate::error::RuntimeError;
use crate::executor::frame::{Frame, FrameArena};
use crate::promise::{Outcome, Promise};
use crate::reactor::core::{EventLoop, LoopShared, WatchToken};
use crate::reactor::handle::RemoteId;
use crate::reactor::timer::TimerKey;
use crate::stream::{PushOutcome, StreamingAdapter};
use crate::suspend::{Resumption, Step, Suspendable, Suspension};
use crate::value::Value;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Identity of a computation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompId(u64);

/// Lifecycle state of a computation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Running,
    Suspended,
    Completed,
    Failed,
    Cancelled,
}

// The single outstanding suspension of a computation, kept so cancellation
// can withdraw it at the source.
enum PendingWait {
    Timer(TimerKey),
    Watch(WatchToken),
    Job(RemoteId),
    // Listening on a promise; nothing to withdraw, the stale resumption is
    // dropped by the run-state guard instead.
    Awaiting,
}

struct Comp {
    id: CompId,
    frames: RefCell<FrameArena>,
    top: Cell<Option<usize>>,
    state: Cell<RunState>,
    promise: Promise,
    stream: StreamingAdapter,
    pending: RefCell<Option<PendingWait>>,
}

enum Forward {
    Continue(Resumption),
    Suspended,
}

pub(crate) struct ExecInner {
    shared: Rc<LoopShared>,
    bridge: ThreadBridge,
    legacy_guard: Duration,
    next_comp: Cell<u64>,
}

/// Drives computations on one event loop. Cheap to clone.
#[derive(Clone)]
pub struct Executor {
    inner: Rc<ExecInner>,
}

/// A launched computation: its promise plus a cancellation handle.
///
/// This is the router-facing contract: start a computation, get back the
/// promise of its final result and the stream it writes through.
pub struct Spawn {
    promise: Promise,
    comp: Rc<Comp>,
    exec: Rc<ExecInner>,
}

impl Spawn {
    /// The promise of the computation's final result.
    pub fn promise(&self) -> Promise {
        self.promise.clone()
    }

    /// The streaming adapter the computation emits through.
    pub fn stream(&self) -> StreamingAdapter {
        self.comp.stream.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.comp.state.get()
    }

    /// Cancels the computation: the outstanding suspension is withdrawn and
    /// the promise settles as cancelled, exactly once. A step already in
    /// progress is never interrupted.
    pub fn cancel(&self) {
        ExecInner::cancel(&self.exec, &self.comp);
    }
}

impl Executor {
    /// Creates an executor over the given loop, with `workers` threads
    /// backing [`Suspension::RunOnThread`] and `legacy_guard` bounding how
    /// long a legacy computation may leave its promise unsettled after
    /// running to its natural end.
    pub fn new(event_loop: &EventLoop, workers: usize, legacy_guard: Duration) -> Self {
        let shared = event_loop.shared();
        let bridge = ThreadBridge::new(workers, shared.clone());

        Self {
            inner: Rc::new(ExecInner {
                shared,
                bridge,
                legacy_guard,
                next_comp: Cell::new(0),
            }),
        }
    }

    /// Starts driving a computation, returning its promise and handle.
    ///
    /// The first step runs from the loop's ready queue, not synchronously
    /// from this call.
    pub fn launch(&self, body: Box<dyn Suspendable>, stream: StreamingAdapter) -> Spawn {
        let id = self.inner.next_comp.get();
        self.inner.next_comp.set(id.wrapping_add(1));

        let mut frames = FrameArena::new();
        let root = frames.insert(Frame { body, parent: None });

        let comp = Rc::new(Comp {
            id: CompId(id),
            frames: RefCell::new(frames),
            top: Cell::new(Some(root)),
            state: Cell::new(RunState::Created),
            promise: Promise::new(),
            stream,
            pending: RefCell::new(None),
        });

        tracing::debug!(id, "launching computation");

        let exec = self.inner.clone();
        let scheduled = comp.clone();
        self.inner
            .shared
            .schedule(Box::new(move || ExecInner::step(&exec, &scheduled, Resumption::Start)));

        Spawn {
            promise: comp.promise.clone(),
            comp,
            exec: self.inner.clone(),
        }
    }

    /// Adapts a legacy computation that receives its promise as a parameter
    /// and is responsible for settling it.
    ///
    /// The executor supplies the bound promise, drives the body to its
    /// natural end, and arms a guard timer if the promise is still pending
    /// then: on expiry it is rejected with
    /// [`RuntimeError::IncompleteComputation`] instead of hanging silently.
    pub fn launch_legacy(
        &self,
        make: impl FnOnce(Promise) -> Box<dyn Suspendable>,
        stream: StreamingAdapter,
    ) -> Spawn {
        let supplied = Promise::new();
        let body = make(supplied.clone());

        let driven = self.launch(body, stream);
        let drive = driven.promise();

        let shared = self.inner.shared.clone();
        let guard = self.inner.legacy_guard;
        let watched = supplied.clone();

        drive.on_settled(move |outcome| {
            if watched.is_settled() {
                return;
            }
            match outcome {
                // Natural end without settlement: start the guard clock.
                Outcome::Resolved(_) => {
                    let (key, timer) = shared.sleep(guard);

                    let target = watched.clone();
                    timer.on_settled(move |fired| {
                        if matches!(fired, Outcome::Resolved(_))
                            && target.try_settle(Outcome::Failed(RuntimeError::IncompleteComputation))
                        {
                            tracing::warn!("legacy computation never settled its promise");
                        }
                    });

                    // Disarm the guard if a late callback settles first.
                    let disarm = shared.clone();
                    watched.on_settled(move |_| disarm.cancel_timer(key));
                }
                Outcome::Failed(error) => {
                    watched.try_settle(Outcome::Failed(error.clone()));
                }
                Outcome::Cancelled => {
                    watched.try_settle(Outcome::Cancelled);
                }
            }
        });

        Spawn {
            promise: supplied,
            comp: driven.comp,
            exec: driven.exec,
        }
    }
}

impl ExecInner {
    // Runs resumption steps until the computation suspends, completes or
    // fails. Emitted output is forwarded without yielding control; nested
    // calls are flattened onto the frame arena so only leaf suspensions
    // reach the loop.
    fn step(exec: &Rc<ExecInner>, comp: &Rc<Comp>, input: Resumption) {
        match comp.state.get() {
            RunState::Completed | RunState::Failed | RunState::Cancelled => return,
            _ => {}
        }
        comp.state.set(RunState::Running);

        let mut input = input;
        loop {
            let Some(top) = comp.top.get() else {
                return;
            };

            let resumed = {
                let mut frames = comp.frames.borrow_mut();
                let Some(frame) = frames.get_mut(top) else {
                    return;
                };
                frame.body.resume(input)
            };

            match resumed {
                Ok(Step::Emit(chunk)) | Ok(Step::Suspend(Suspension::Emit(chunk))) => {
                    match Self::forward_chunk(exec, comp, chunk) {
                        Forward::Continue(next) => input = next,
                        Forward::Suspended => return,
                    }
                }
                Ok(Step::Call(child)) => {
                    let index = comp.frames.borrow_mut().insert(Frame {
                        body: child,
                        parent: Some(top),
                    });
                    comp.top.set(Some(index));
                    input = Resumption::Start;
                }
                Ok(Step::Done(value)) => {
                    let parent = comp
                        .frames
                        .borrow_mut()
                        .remove(top)
                        .and_then(|frame| frame.parent);
                    match parent {
                        Some(parent) => {
                            comp.top.set(Some(parent));
                            input = Resumption::Resolved(value);
                        }
                        None => {
                            comp.top.set(None);
                            Self::complete(comp, Outcome::Resolved(value));
                            return;
                        }
                    }
                }
                Err(error) => {
                    // Delivered to the parent frame first; only an error
                    // nobody recovers from reaches the promise.
                    let parent = comp
                        .frames
                        .borrow_mut()
                        .remove(top)
                        .and_then(|frame| frame.parent);
                    match parent {
                        Some(parent) => {
                            comp.top.set(Some(parent));
                            input = Resumption::Failed(error);
                        }
                        None => {
                            comp.top.set(None);
                            Self::complete(comp, Outcome::Failed(error));
                            return;
                        }
                    }
                }
                Ok(Step::Suspend(request)) => match request {
                    Suspension::Emit(_) => unreachable!("emit handled above"),
                    Suspension::Sleep(duration) => {
                        let (key, promise) = exec.shared.sleep(duration);
                        *comp.pending.borrow_mut() = Some(PendingWait::Timer(key));
                        comp.state.set(RunState::Suspended);
                        Self::resume_on(exec, comp, &promise);
                        return;
                    }
                    Suspension::WaitSocket(fd, interest) => {
                        match exec.shared.watch(fd, interest) {
                            Ok((token, promise)) => {
                                *comp.pending.borrow_mut() = Some(PendingWait::Watch(token));
                                comp.state.set(RunState::Suspended);
                                Self::resume_on(exec, comp, &promise);
                                return;
                            }
                            // Registration failure is delivered into the
                            // computation like any suspension error.
                            Err(error) => input = Resumption::Failed(error),
                        }
                    }
                    Suspension::RunOnThread(call) => {
                        let (id, promise) = exec.bridge.run_on_thread(call);
                        *comp.pending.borrow_mut() = Some(PendingWait::Job(id));
                        comp.state.set(RunState::Suspended);
                        Self::resume_on(exec, comp, &promise);
                        return;
                    }
                    Suspension::Await(promise) => {
                        *comp.pending.borrow_mut() = Some(PendingWait::Awaiting);
                        comp.state.set(RunState::Suspended);
                        Self::resume_on(exec, comp, &promise);
                        return;
                    }
                },
            }
        }
    }

    fn forward_chunk(exec: &Rc<ExecInner>, comp: &Rc<Comp>, chunk: Vec<u8>) -> Forward {
        match comp.stream.push(chunk) {
            Ok(PushOutcome::Written) => Forward::Continue(Resumption::Resolved(Value::Null)),
            Ok(PushOutcome::NotReady(gate)) => {
                *comp.pending.borrow_mut() = Some(PendingWait::Awaiting);
                comp.state.set(RunState::Suspended);
                Self::resume_on(exec, comp, &gate);
                Forward::Suspended
            }
            Err(error) => Forward::Continue(Resumption::Failed(error)),
        }
    }

    // Resumes the computation with the promise's outcome, via the ready
    // queue so no step ever runs from inside another component's stack.
    fn resume_on(exec: &Rc<ExecInner>, comp: &Rc<Comp>, promise: &Promise) {
        let exec = exec.clone();
        let comp = comp.clone();

        promise.on_settled(move |outcome| {
            let input = match outcome {
                Outcome::Resolved(value) => Resumption::Resolved(value.clone()),
                Outcome::Failed(error) => Resumption::Failed(error.clone()),
                Outcome::Cancelled => Resumption::Cancelled,
            };

            comp.pending.borrow_mut().take();

            let shared = exec.shared.clone();
            shared.schedule(Box::new(move || ExecInner::step(&exec, &comp, input)));
        });
    }

    fn complete(comp: &Rc<Comp>, outcome: Outcome) {
        comp.state.set(match outcome {
            Outcome::Resolved(_) => RunState::Completed,
            Outcome::Failed(_) => RunState::Failed,
            Outcome::Cancelled => RunState::Cancelled,
        });

        tracing::debug!(id = comp.id.0, state = ?comp.state.get(), "computation settled");

        comp.stream.finish(&outcome);
        if comp.promise.settle(outcome).is_err() {
            tracing::warn!(id = comp.id.0, "computation promise settled twice");
        }
    }

    fn cancel(exec: &Rc<ExecInner>, comp: &Rc<Comp>) {
        match comp.state.get() {
            RunState::Completed | RunState::Failed | RunState::Cancelled => return,
            _ => {}
        }

        tracing::debug!(id = comp.id.0, "cancelling computation");
        comp.state.set(RunState::Cancelled);

        // Withdraw the outstanding suspension at its source. A thread-pool
        // job is allowed to finish; its result is discarded.
        let pending = comp.pending.borrow_mut().take();
        match pending {
            Some(PendingWait::Timer(key)) => exec.shared.cancel_timer(key),
            Some(PendingWait::Watch(token)) => exec.shared.cancel_watch(token),
            Some(PendingWait::Job(id)) => exec.shared.cancel_remote(id),
            Some(PendingWait::Awaiting) | None => {}
        }

        comp.stream.finish(&Outcome::Cancelled);
        if comp.promise.settle(Outcome::Cancelled).is_err() {
            tracing::warn!(id = comp.id.0, "cancel raced a settlement");
        }
    }
}
