//! poll(2)-backed readiness poller with a self-pipe wakeup.

use super::{Interest, Poller, WakeHandle};
use crate::error::RuntimeError;

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, pollfd};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Portable poller over poll(2).
///
/// A non-blocking self-pipe is always watched alongside the registered
/// descriptors: worker threads write one byte to interrupt a blocked poll,
/// and the read side is drained on every delivery.
pub struct PollPoller {
    wake_read: RawFd,
    wake_write: RawFd,
    // Keyed by token: one descriptor may carry several independent watches.
    watches: HashMap<u64, (RawFd, Interest)>,
}

fn last_io_error(context: &str) -> RuntimeError {
    RuntimeError::Io(format!("{context}: {}", io::Error::last_os_error()))
}

fn set_nonblocking(fd: RawFd) -> Result<(), RuntimeError> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(last_io_error("fcntl(F_GETFL)"));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(last_io_error("fcntl(F_SETFL)"));
    }
    Ok(())
}

impl PollPoller {
    pub fn new() -> Result<Self, RuntimeError> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(last_io_error("pipe"));
        }
        let [wake_read, wake_write] = fds;

        if let Err(error) = set_nonblocking(wake_read).and_then(|()| set_nonblocking(wake_write)) {
            unsafe {
                libc::close(wake_read);
                libc::close(wake_write);
            }
            return Err(error);
        }

        Ok(Self {
            wake_read,
            wake_write,
            watches: HashMap::new(),
        })
    }

    fn drain_wake_pipe(&self) {
        let mut buffer = [0u8; 64];
        loop {
            let read = unsafe {
                libc::read(
                    self.wake_read,
                    buffer.as_mut_ptr() as *mut libc::c_void,
                    buffer.len(),
                )
            };
            if read <= 0 {
                break;
            }
        }
    }
}

// Rounded up so a 1ns timeout does not busy-spin at zero.
fn to_millis(duration: Duration) -> libc::c_int {
    duration
        .as_nanos()
        .div_ceil(1_000_000)
        .min(libc::c_int::MAX as u128) as libc::c_int
}

impl Poller for PollPoller {
    fn register(&mut self, fd: RawFd, interest: Interest, token: u64) -> Result<(), RuntimeError> {
        self.watches.insert(token, (fd, interest));
        Ok(())
    }

    fn deregister(&mut self, token: u64) -> Result<(), RuntimeError> {
        self.watches.remove(&token);
        Ok(())
    }

    fn poll(&mut self, timeout: Option<Duration>, ready: &mut Vec<u64>) -> Result<(), RuntimeError> {
        let mut fds = Vec::with_capacity(self.watches.len() + 1);
        fds.push(pollfd {
            fd: self.wake_read,
            events: POLLIN,
            revents: 0,
        });

        // One pollfd per descriptor, interests merged across its watches.
        let mut slots: HashMap<RawFd, usize> = HashMap::with_capacity(self.watches.len());
        for &(fd, interest) in self.watches.values() {
            let mut events = 0;
            if interest.read {
                events |= POLLIN;
            }
            if interest.write {
                events |= POLLOUT;
            }
            match slots.get(&fd) {
                Some(&slot) => fds[slot].events |= events,
                None => {
                    slots.insert(fd, fds.len());
                    fds.push(pollfd {
                        fd,
                        events,
                        revents: 0,
                    });
                }
            }
        }

        let timeout = timeout.map(to_millis).unwrap_or(-1);
        let count = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
        if count < 0 {
            // A signal interrupting the wait is not an error; the loop
            // simply takes another turn.
            if io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                return Ok(());
            }
            return Err(last_io_error("poll"));
        }

        if fds[0].revents & POLLIN != 0 {
            self.drain_wake_pipe();
        }

        // Fan the per-descriptor result back out to every watch whose
        // interest it satisfies.
        for (&token, &(fd, interest)) in &self.watches {
            let Some(&slot) = slots.get(&fd) else {
                continue;
            };
            let mut wanted = POLLERR | POLLHUP | POLLNVAL;
            if interest.read {
                wanted |= POLLIN;
            }
            if interest.write {
                wanted |= POLLOUT;
            }
            if fds[slot].revents & wanted != 0 {
                ready.push(token);
            }
        }

        Ok(())
    }

    fn wake_handle(&self) -> WakeHandle {
        let fd = self.wake_write;
        WakeHandle::new(move || {
            // One byte is enough; a full pipe already guarantees a pending
            // wakeup.
            let byte = [1u8];
            unsafe {
                libc::write(fd, byte.as_ptr() as *const libc::c_void, 1);
            }
        })
    }
}

impl Drop for PollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wake_read);
            libc::close(self.wake_write);
        }
    }
}
