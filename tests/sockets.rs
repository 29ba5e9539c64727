use strand::{
    Interest, MemoryTransport, Outcome, Resumption, Runtime, RuntimeBuilder, RuntimeError, Step,
    Suspendable, Suspension, Value,
};

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

fn pipe_pair() -> (RawFd, RawFd) {
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe(2) failed");
    (fds[0], fds[1])
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn write_byte(fd: RawFd) {
    let byte = [b'x'];
    let written = unsafe { libc::write(fd, byte.as_ptr() as *const libc::c_void, 1) };
    assert_eq!(written, 1, "write to pipe failed");
}

/// Waits for readability once, then completes.
struct WaitReadable {
    fd: RawFd,
    waited: bool,
}

impl Suspendable for WaitReadable {
    fn resume(&mut self, input: Resumption) -> Result<Step, RuntimeError> {
        if !self.waited {
            self.waited = true;
            return Ok(Step::Suspend(Suspension::WaitSocket(self.fd, Interest::READ)));
        }
        input.into_result()?;
        Ok(Step::Done(Value::Text("readable".into())))
    }
}

#[test]
fn test_readiness_resumes_the_computation() {
    let rt = RuntimeBuilder::new().enable_io().build().unwrap();
    let transport = MemoryTransport::new();
    let (read_fd, write_fd) = pipe_pair();

    let spawn = rt.spawn(
        Box::new(WaitReadable {
            fd: read_fd,
            waited: false,
        }),
        transport.boxed(),
    );

    // Make the descriptor readable from a later loop turn, once the
    // computation is parked in the poller.
    let (_key, trigger) = rt.event_loop().sleep(Duration::from_millis(5));
    trigger.on_settled(move |_| write_byte(write_fd));

    let outcome = rt.run_until(&spawn.promise()).unwrap();
    assert_eq!(outcome, Outcome::Resolved(Value::Text("readable".into())));

    close_fd(read_fd);
    close_fd(write_fd);
}

#[test]
fn test_cancel_mid_watch_removes_interest() {
    let rt = RuntimeBuilder::new().enable_io().build().unwrap();
    let transport = MemoryTransport::new();
    let (read_fd, write_fd) = pipe_pair();

    let spawn = rt.spawn(
        Box::new(WaitReadable {
            fd: read_fd,
            waited: false,
        }),
        transport.boxed(),
    );
    let promise = spawn.promise();

    rt.event_loop().schedule(move || spawn.cancel());

    let started = Instant::now();
    let outcome = rt.run_until(&promise).unwrap();
    assert_eq!(outcome, Outcome::Cancelled);

    // With the watch withdrawn nothing remains pending, so the loop must go
    // idle instead of blocking in the poller.
    rt.run().unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "a cancelled watch must not keep the loop alive"
    );

    close_fd(read_fd);
    close_fd(write_fd);
}

#[test]
fn test_two_watches_on_one_descriptor_both_resolve() {
    let rt = RuntimeBuilder::new().enable_io().build().unwrap();
    let (read_fd, write_fd) = pipe_pair();

    let (_first_token, first) = rt.event_loop().watch(read_fd, Interest::READ).unwrap();
    let (_second_token, second) = rt.event_loop().watch(read_fd, Interest::READ).unwrap();

    write_byte(write_fd);
    rt.run().unwrap();

    assert_eq!(
        first.outcome(),
        Some(Outcome::Resolved(Value::Null)),
        "the earlier watch must not be displaced by a later one on the same fd"
    );
    assert_eq!(second.outcome(), Some(Outcome::Resolved(Value::Null)));

    close_fd(read_fd);
    close_fd(write_fd);
}

#[test]
fn test_cancelling_one_watch_keeps_its_sibling() {
    let rt = RuntimeBuilder::new().enable_io().build().unwrap();
    let (read_fd, write_fd) = pipe_pair();

    let (victim, cancelled) = rt.event_loop().watch(read_fd, Interest::READ).unwrap();
    let (_kept_token, kept) = rt.event_loop().watch(read_fd, Interest::READ).unwrap();

    rt.event_loop().cancel_watch(victim);
    assert_eq!(cancelled.outcome(), Some(Outcome::Cancelled));

    write_byte(write_fd);
    rt.run().unwrap();

    assert_eq!(
        kept.outcome(),
        Some(Outcome::Resolved(Value::Null)),
        "cancelling one watch must not drop its sibling on the same fd"
    );

    close_fd(read_fd);
    close_fd(write_fd);
}

#[test]
fn test_watch_without_io_support_fails() {
    let rt = Runtime::new();

    let result = rt.event_loop().watch(0, Interest::READ);
    assert!(
        matches!(result, Err(RuntimeError::Io(_))),
        "the default loop has no socket support"
    );
}

#[test]
fn test_watch_failure_is_delivered_into_the_computation() {
    // Default runtime: registration fails, and the failure arrives as an
    // ordinary failed resumption the handler can observe.
    let rt = Runtime::new();
    let transport = MemoryTransport::new();

    let spawn = rt.spawn(
        Box::new(WaitReadable {
            fd: 0,
            waited: false,
        }),
        transport.boxed(),
    );

    let outcome = rt.run_until(&spawn.promise()).unwrap();
    assert!(
        matches!(outcome, Outcome::Failed(RuntimeError::Io(_))),
        "registration failure must fail the computation, not the loop"
    );
}
