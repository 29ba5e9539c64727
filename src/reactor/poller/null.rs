//! Poller stub for loops built without socket support.

use super::{Interest, Poller, WakeHandle};
use crate::error::RuntimeError;

use std::os::unix::io::RawFd;
use std::time::Duration;

/// Rejects every registration; loops using it never block in `poll`.
pub struct NullPoller;

impl NullPoller {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl Poller for NullPoller {
    fn register(&mut self, _fd: RawFd, _interest: Interest, _token: u64) -> Result<(), RuntimeError> {
        Err(RuntimeError::Io(
            "socket support not enabled, use RuntimeBuilder::enable_io()".into(),
        ))
    }

    fn deregister(&mut self, _token: u64) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn poll(&mut self, timeout: Option<Duration>, _ready: &mut Vec<u64>) -> Result<(), RuntimeError> {
        // Nothing is ever registered, so there is nothing to wait on beyond
        // the timeout itself.
        if let Some(timeout) = timeout {
            std::thread::sleep(timeout);
        }
        Ok(())
    }

    fn wake_handle(&self) -> WakeHandle {
        WakeHandle::noop()
    }
}
