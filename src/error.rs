//! Errors reported by the reactor.
//!
//! Only registration bookkeeping and failed syscalls surface here. A signal that
//! dies resolves to `false`, and a device reports OS failures inside its result
//! tuple, so neither of them goes through this type.

use std::io;
use std::os::unix::io::RawFd;

use thiserror::Error;

/// Failures produced by [`Poller`](crate::Poller) operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// An epoll syscall (`epoll_create1`, `epoll_ctl`, `epoll_wait`) failed.
    #[error("epoll syscall failed: {0}")]
    Io(#[from] io::Error),

    /// `add` was called for a file descriptor that already has a handler.
    #[error("file descriptor {0} is already registered")]
    AlreadyRegistered(RawFd),

    /// `modify` or `remove` was called for an unknown file descriptor.
    #[error("file descriptor {0} is not registered")]
    NotRegistered(RawFd),

    /// The poller was shut down and no longer accepts registrations.
    #[error("poller has been shut down")]
    Shutdown,
}

impl Error {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::AlreadyRegistered(_) => "already_registered",
            Error::NotRegistered(_) => "not_registered",
            Error::Shutdown => "shutdown",
        }
    }
}

/// Result alias used across the reactor API.
pub type Result<T> = std::result::Result<T, Error>;
