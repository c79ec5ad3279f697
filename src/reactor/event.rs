use crate::reactor::interest::Interest;

use libc::{
    EPOLL_CLOEXEC, F_GETFL, F_SETFL, O_NONBLOCK, c_int, epoll_create1, epoll_ctl, epoll_event,
    epoll_wait, fcntl,
};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// One epoll event record, carrying the registered file descriptor as its data.
#[repr(transparent)]
#[derive(Clone, Copy)]
pub(crate) struct Event(epoll_event);

impl Event {
    pub(crate) const EMPTY: Self = Self(epoll_event { events: 0, u64: 0 });

    pub(crate) fn new(file_descriptor: RawFd, interest: Interest) -> Self {
        Self(epoll_event {
            events: interest.bits(),
            u64: file_descriptor as u64,
        })
    }

    pub(crate) fn file_descriptor(&self) -> RawFd {
        let data = self.0.u64;
        data as RawFd
    }

    pub(crate) fn interest(&self) -> Interest {
        let events = self.0.events;
        Interest::from_bits(events)
    }
}

/// Creates a close-on-exec epoll instance.
pub(crate) fn create() -> io::Result<RawFd> {
    let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
    if epoll < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(epoll)
}

/// Runs `epoll_ctl` with `operation` for `file_descriptor`.
pub(crate) fn control(
    epoll: RawFd,
    operation: c_int,
    file_descriptor: RawFd,
    interest: Interest,
) -> io::Result<()> {
    let mut event = Event::new(file_descriptor, interest);
    let ret = unsafe { epoll_ctl(epoll, operation, file_descriptor, &mut event.0) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Waits up to `timeout` for events, filling the front of `events`.
///
/// An interrupted wait reports zero events.
pub(crate) fn wait(epoll: RawFd, events: &mut [Event], timeout: Duration) -> io::Result<usize> {
    let timeout_ms = timeout.as_millis().min(c_int::MAX as u128) as c_int;
    let capacity = events.len().min(c_int::MAX as usize) as c_int;

    let ready = unsafe {
        epoll_wait(
            epoll,
            events.as_mut_ptr().cast::<epoll_event>(),
            capacity,
            timeout_ms,
        )
    };

    if ready < 0 {
        let error = io::Error::last_os_error();
        if error.kind() == io::ErrorKind::Interrupted {
            return Ok(0);
        }
        return Err(error);
    }

    Ok(ready as usize)
}

/// Closes an epoll instance.
pub(crate) fn close(epoll: RawFd) {
    unsafe {
        libc::close(epoll);
    }
}

/// Switches `file_descriptor` to non-blocking mode.
pub(crate) fn set_nonblocking(file_descriptor: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(file_descriptor, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { fcntl(file_descriptor, F_SETFL, flags | O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
