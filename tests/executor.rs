use strand::compat::from_fn;
use strand::{
    MemoryTransport, Outcome, Resumption, RunState, Runtime, RuntimeError, Step, Suspendable,
    Suspension, Value,
};

use std::time::{Duration, Instant};

/// Sleeps `naps` times, summing the values it is resumed with along the way
/// (timer resumptions carry `Null`, counted as zero).
struct NapAndSum {
    naps: u32,
    total: i64,
}

impl Suspendable for NapAndSum {
    fn resume(&mut self, input: Resumption) -> Result<Step, RuntimeError> {
        if let Resumption::Resolved(Value::Int(value)) = input {
            self.total += value;
        }
        if self.naps == 0 {
            return Ok(Step::Done(Value::Int(self.total)));
        }
        self.naps -= 1;
        Ok(Step::Suspend(Suspension::Sleep(Duration::from_millis(2))))
    }
}

/// Delegates to a child computation and doubles its result.
struct Doubler {
    started: bool,
}

impl Suspendable for Doubler {
    fn resume(&mut self, input: Resumption) -> Result<Step, RuntimeError> {
        if !self.started {
            self.started = true;
            return Ok(Step::Call(from_fn(|| Ok(Value::Int(21)))));
        }
        match input.into_result()? {
            Value::Int(value) => Ok(Step::Done(Value::Int(value * 2))),
            other => Ok(Step::Done(other)),
        }
    }
}

/// Delegates to a failing child and recovers with a fallback value.
struct Recovers {
    started: bool,
}

impl Suspendable for Recovers {
    fn resume(&mut self, input: Resumption) -> Result<Step, RuntimeError> {
        if !self.started {
            self.started = true;
            return Ok(Step::Call(from_fn(|| {
                Err(RuntimeError::handler("child blew up"))
            })));
        }
        match input {
            Resumption::Failed(_) => Ok(Step::Done(Value::Text("recovered".into()))),
            _ => Ok(Step::Done(Value::Text("child did not fail".into()))),
        }
    }
}

#[test]
fn test_synchronous_body_completes() {
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let spawn = rt.spawn(from_fn(|| Ok(Value::Int(7))), transport.boxed());

    let outcome = rt.run_until(&spawn.promise()).unwrap();
    assert_eq!(outcome, Outcome::Resolved(Value::Int(7)));
    assert_eq!(spawn.state(), RunState::Completed);
    assert!(transport.is_closed(), "stream must close on completion");
}

#[test]
fn test_first_step_runs_from_the_loop_not_spawn() {
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let spawn = rt.spawn(from_fn(|| Ok(Value::Null)), transport.boxed());

    assert_eq!(
        spawn.state(),
        RunState::Created,
        "spawn must not run the body synchronously"
    );
    rt.run().unwrap();
    assert_eq!(spawn.state(), RunState::Completed);
}

#[test]
fn test_suspensions_are_transparent_to_the_result() {
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let body = Box::new(NapAndSum { naps: 3, total: 40 });
    let spawn = rt.spawn(body, transport.boxed());

    let started = Instant::now();
    let outcome = rt.run_until(&spawn.promise()).unwrap();

    assert_eq!(
        outcome,
        Outcome::Resolved(Value::Int(40)),
        "result must match the synchronous computation"
    );
    assert!(
        started.elapsed() >= Duration::from_millis(6),
        "three naps must actually wait"
    );
}

#[test]
fn test_nested_call_delivers_child_value_to_parent() {
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let spawn = rt.spawn(Box::new(Doubler { started: false }), transport.boxed());

    let outcome = rt.run_until(&spawn.promise()).unwrap();
    assert_eq!(outcome, Outcome::Resolved(Value::Int(42)));
}

#[test]
fn test_parent_recovers_from_child_failure() {
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let spawn = rt.spawn(Box::new(Recovers { started: false }), transport.boxed());

    let outcome = rt.run_until(&spawn.promise()).unwrap();
    assert_eq!(
        outcome,
        Outcome::Resolved(Value::Text("recovered".into())),
        "child failure must be recoverable by the parent frame"
    );
}

#[test]
fn test_unrecovered_error_fails_the_promise() {
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let spawn = rt.spawn(
        from_fn(|| Err(RuntimeError::handler("handler exploded"))),
        transport.boxed(),
    );

    let outcome = rt.run_until(&spawn.promise()).unwrap();
    assert_eq!(
        outcome,
        Outcome::Failed(RuntimeError::Handler("handler exploded".into()))
    );
    assert_eq!(spawn.state(), RunState::Failed);
    assert!(
        spawn.stream().is_broken(),
        "failure must mark the stream broken"
    );
    assert!(
        transport.error().is_some(),
        "transport must observe the failure"
    );
}

#[test]
fn test_awaiting_an_external_promise() {
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let external = strand::Promise::new();

    struct AwaitOnce {
        target: Option<strand::Promise>,
    }

    impl Suspendable for AwaitOnce {
        fn resume(&mut self, input: Resumption) -> Result<Step, RuntimeError> {
            match self.target.take() {
                Some(target) => Ok(Step::Suspend(Suspension::Await(target))),
                None => Ok(Step::Done(input.into_result()?)),
            }
        }
    }

    let spawn = rt.spawn(
        Box::new(AwaitOnce {
            target: Some(external.clone()),
        }),
        transport.boxed(),
    );

    // Settle the awaited promise from a later loop turn.
    rt.event_loop()
        .schedule(move || external.resolve(Value::Int(5)).unwrap());

    let outcome = rt.run_until(&spawn.promise()).unwrap();
    assert_eq!(outcome, Outcome::Resolved(Value::Int(5)));
}

#[test]
fn test_run_until_reports_stall_for_unsettleable_promise() {
    let rt = Runtime::new();
    let orphan = strand::Promise::new();

    assert_eq!(
        rt.run_until(&orphan),
        Err(RuntimeError::Stalled),
        "an idle loop cannot settle anything"
    );
}
