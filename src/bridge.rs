//! Worker pool for blocking calls, bridged back to the reactor.
//!
//! Blocking work is explicitly opt-in: a computation suspends with
//! [`Suspension::RunOnThread`](crate::suspend::Suspension) and the callable
//! runs on one of a bounded set of worker threads. The worker never touches
//! the promise; it posts the result through the loop handle (send + wake),
//! and the loop settles the promise on the reactor thread.
//! Saturated pools queue submissions FIFO; nothing is dropped.

use crate::error::RuntimeError;
use crate::promise::Promise;
use crate::reactor::core::LoopShared;
use crate::reactor::handle::RemoteId;
use crate::suspend::BlockingJob;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

struct Job {
    id: RemoteId,
    call: BlockingJob,
}

fn panic_error(panic: Box<dyn std::any::Any + Send>) -> RuntimeError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "blocking job panicked".to_owned());
    RuntimeError::Handler(message)
}

/// Runs blocking callables on a bounded worker pool and resolves their
/// promises back on the reactor thread.
pub(crate) struct ThreadBridge {
    shared: Rc<LoopShared>,
    intake: Option<Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ThreadBridge {
    /// Spawns `size` worker threads feeding off a shared FIFO intake.
    pub(crate) fn new(size: usize, shared: Rc<LoopShared>) -> Self {
        let (intake, jobs) = mpsc::channel::<Job>();
        let jobs = Arc::new(Mutex::new(jobs));

        let mut workers = Vec::with_capacity(size);
        for _ in 0..size {
            let jobs = jobs.clone();
            let handle = shared.loop_handle();

            workers.push(thread::spawn(move || {
                loop {
                    // Guard dropped at the end of the statement; workers take
                    // jobs one at a time in FIFO order.
                    let job = jobs.lock().unwrap().recv();
                    match job {
                        Ok(job) => {
                            // A panicking job must still post a completion;
                            // the payload comes back as a handler error and
                            // the worker stays alive for later submissions.
                            let result = catch_unwind(AssertUnwindSafe(job.call))
                                .unwrap_or_else(|panic| Err(panic_error(panic)));
                            handle.post(job.id, result);
                        }
                        // Intake disconnected: the bridge is shutting down.
                        Err(_) => break,
                    }
                }
            }));
        }

        Self {
            shared,
            intake: Some(intake),
            workers,
        }
    }

    /// Submits a blocking callable, returning immediately with the slot id
    /// and the promise that resolves with the callable's result.
    pub(crate) fn run_on_thread(&self, call: BlockingJob) -> (RemoteId, Promise) {
        let (id, promise) = self.shared.remote_promise();

        match &self.intake {
            Some(intake) => {
                tracing::debug!(id = ?id, "submitting blocking job");
                if intake.send(Job { id, call }).is_err() {
                    self.shared.reject_remote(id, RuntimeError::PoolClosed);
                }
            }
            None => self.shared.reject_remote(id, RuntimeError::PoolClosed),
        }

        (id, promise)
    }
}

impl Drop for ThreadBridge {
    fn drop(&mut self) {
        // Disconnect the intake so workers drain remaining jobs and exit.
        self.intake.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
