use strand::{
    MemoryTransport, Outcome, Resumption, Runtime, RuntimeBuilder, RuntimeError, Step, Suspendable,
    Suspension, Value,
};

use std::cell::RefCell;
use std::rc::Rc;
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Offloads one blocking job and completes with its result.
struct Offload {
    job: Option<Box<dyn FnOnce() -> Result<Value, RuntimeError> + Send>>,
}

impl Suspendable for Offload {
    fn resume(&mut self, input: Resumption) -> Result<Step, RuntimeError> {
        match self.job.take() {
            Some(job) => Ok(Step::Suspend(Suspension::RunOnThread(job))),
            None => Ok(Step::Done(input.into_result()?)),
        }
    }
}

#[test]
fn test_blocking_job_result_reaches_the_computation() {
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let spawn = rt.spawn(
        Box::new(Offload {
            job: Some(Box::new(|| {
                thread::sleep(Duration::from_millis(5));
                Ok(Value::Int(42))
            })),
        }),
        transport.boxed(),
    );

    let outcome = rt.run_until(&spawn.promise()).unwrap();
    assert_eq!(outcome, Outcome::Resolved(Value::Int(42)));
}

#[test]
fn test_job_runs_off_thread_but_resumption_runs_on_loop_thread() {
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let resume_thread: Rc<RefCell<Option<ThreadId>>> = Rc::new(RefCell::new(None));

    // The job itself cannot capture the Rc (it must be Send), so it reports
    // its thread id through the result value instead.
    let spawn = rt.spawn(
        Box::new(Offload {
            job: Some(Box::new(|| {
                Ok(Value::Text(format!("{:?}", thread::current().id())))
            })),
        }),
        transport.boxed(),
    );

    let sink = resume_thread.clone();
    spawn
        .promise()
        .on_settled(move |_| *sink.borrow_mut() = Some(thread::current().id()));

    let outcome = rt.run_until(&spawn.promise()).unwrap();
    if let Outcome::Resolved(Value::Text(reported)) = &outcome {
        assert_ne!(
            reported,
            &format!("{:?}", thread::current().id()),
            "the job must not run on the reactor thread"
        );
    } else {
        panic!("unexpected outcome: {outcome:?}");
    }

    assert_eq!(
        *resume_thread.borrow(),
        Some(thread::current().id()),
        "settlement must happen on the reactor thread"
    );
}

#[test]
fn test_job_error_is_delivered_as_failed_resumption() {
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let spawn = rt.spawn(
        Box::new(Offload {
            job: Some(Box::new(|| Err(RuntimeError::handler("disk on fire")))),
        }),
        transport.boxed(),
    );

    let outcome = rt.run_until(&spawn.promise()).unwrap();
    assert_eq!(
        outcome,
        Outcome::Failed(RuntimeError::Handler("disk on fire".into()))
    );
}

#[test]
fn test_panicking_job_fails_the_computation() {
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let spawn = rt.spawn(
        Box::new(Offload {
            job: Some(Box::new(|| panic!("job panicked"))),
        }),
        transport.boxed(),
    );

    let outcome = rt.run_until(&spawn.promise()).unwrap();
    assert_eq!(
        outcome,
        Outcome::Failed(RuntimeError::Handler("job panicked".into())),
        "a panicking job must settle the computation, not hang it"
    );

    // The default pool has a single worker; it must survive the panic and
    // keep serving later submissions.
    let after = MemoryTransport::new();
    let next = rt.spawn(
        Box::new(Offload {
            job: Some(Box::new(|| Ok(Value::Int(1)))),
        }),
        after.boxed(),
    );
    let outcome = rt.run_until(&next.promise()).unwrap();
    assert_eq!(
        outcome,
        Outcome::Resolved(Value::Int(1)),
        "a panic must not take the worker down with it"
    );
}

#[test]
fn test_multiple_jobs_complete_under_one_worker() {
    // One worker forces strictly sequential job execution; all results must
    // still come back.
    let rt = RuntimeBuilder::new().worker_threads(1).build().unwrap();

    let mut spawns = Vec::new();
    for index in 0..4i64 {
        let transport = MemoryTransport::new();
        spawns.push(rt.spawn(
            Box::new(Offload {
                job: Some(Box::new(move || Ok(Value::Int(index)))),
            }),
            transport.boxed(),
        ));
    }

    for (index, spawn) in spawns.iter().enumerate() {
        let outcome = rt.run_until(&spawn.promise()).unwrap();
        assert_eq!(outcome, Outcome::Resolved(Value::Int(index as i64)));
    }
}
