use strand::{Outcome, Promise, RuntimeError, Value};

use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_resolve_settles_once() {
    let promise = Promise::new();

    assert!(promise.resolve(Value::Int(1)).is_ok());
    assert_eq!(
        promise.resolve(Value::Int(2)),
        Err(RuntimeError::AlreadySettled),
        "second resolution must fail"
    );
    assert_eq!(
        promise.reject(RuntimeError::handler("late")),
        Err(RuntimeError::AlreadySettled),
        "rejection after resolution must fail"
    );

    assert_eq!(
        promise.outcome(),
        Some(Outcome::Resolved(Value::Int(1))),
        "stored outcome must not be altered by later calls"
    );
}

#[test]
fn test_reject_settles_once() {
    let promise = Promise::new();

    assert!(promise.reject(RuntimeError::handler("boom")).is_ok());
    assert_eq!(
        promise.cancel(),
        Err(RuntimeError::AlreadySettled),
        "cancel after rejection must fail"
    );
    assert_eq!(
        promise.outcome(),
        Some(Outcome::Failed(RuntimeError::Handler("boom".into())))
    );
}

#[test]
fn test_continuations_run_in_registration_order() {
    let promise = Promise::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    for index in 0..5 {
        let order = order.clone();
        promise.on_settled(move |_| order.borrow_mut().push(index));
    }

    promise.resolve(Value::Null).unwrap();

    assert_eq!(
        *order.borrow(),
        vec![0, 1, 2, 3, 4],
        "continuations must fire in registration order"
    );
}

#[test]
fn test_continuation_after_settlement_runs_immediately() {
    let promise = Promise::new();
    promise.resolve(Value::Text("done".into())).unwrap();

    let seen = Rc::new(RefCell::new(None));
    let sink = seen.clone();
    promise.on_settled(move |outcome| *sink.borrow_mut() = Some(outcome.clone()));

    assert_eq!(
        *seen.borrow(),
        Some(Outcome::Resolved(Value::Text("done".into()))),
        "late continuation must run immediately with the stored outcome"
    );
}

#[test]
fn test_try_settle_reports_winner() {
    let promise = Promise::new();

    assert!(promise.try_settle(Outcome::Resolved(Value::Int(1))));
    assert!(
        !promise.try_settle(Outcome::Cancelled),
        "second settlement attempt must lose"
    );
    assert_eq!(promise.outcome(), Some(Outcome::Resolved(Value::Int(1))));
}

#[test]
fn test_cancelled_is_distinguishable() {
    let promise = Promise::new();
    promise.cancel().unwrap();

    assert_eq!(promise.outcome(), Some(Outcome::Cancelled));
    assert!(promise.is_settled());
}
