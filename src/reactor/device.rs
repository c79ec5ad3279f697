//! Asynchronous devices built on the reactor.
//!
//! A [`Device`] reads into and writes from byte buffers asynchronously. OS
//! failures are returned inside the [`DeviceResult`] tuple rather than raised.
//!
//! [`AsyncFd`] is the reference device: a non-blocking file descriptor that is
//! registered edge-triggered with a [`Poller`]. Its handler releases a
//! "readable" and a "writable" signal; a read or write that hits `EAGAIN`
//! awaits the matching signal and retries.
//!
//! # Example
//!
//! ```no_run
//! use coreactor::{AsyncFd, Device, Poller};
//! use std::os::fd::{FromRawFd, OwnedFd};
//! use std::sync::Arc;
//!
//! let poller = Arc::new(Poller::new().unwrap());
//! let mut fds = [0; 2];
//! assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
//! let reader = AsyncFd::new(unsafe { OwnedFd::from_raw_fd(fds[0]) }, poller.clone()).unwrap();
//!
//! # futures::executor::block_on(async {
//! let mut buffer = [0u8; 64];
//! let (read, error) = reader.read(&mut buffer).await;
//! # let _ = (read, error);
//! # });
//! ```

use crate::error::Result;
use crate::reactor::core::{Handler, PollHint, Poller};
use crate::reactor::event::set_nonblocking;
use crate::reactor::interest::Interest;
use crate::signal::{MpscStorage, Receiver, Sender, signal};

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::lock::Mutex;

use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use tracing::{debug, trace};

/// Bytes transferred, and the OS error that stopped the transfer if any.
pub type DeviceResult = (usize, Option<io::ErrorKind>);

/// Anything that can be read from and written to asynchronously.
pub trait Device {
    /// Reads into `buffer`. `(0, None)` means end of stream.
    fn read<'a>(&'a self, buffer: &'a mut [u8]) -> BoxFuture<'a, DeviceResult>;

    /// Writes from `buffer`, returning how many bytes were accepted.
    fn write<'a>(&'a self, buffer: &'a [u8]) -> BoxFuture<'a, DeviceResult>;
}

/// Releases the readiness signals of one [`AsyncFd`].
struct Readiness {
    readable: Sender<MpscStorage>,
    writable: Sender<MpscStorage>,
}

impl Handler for Readiness {
    fn handle(&self, file_descriptor: RawFd, events: Interest) -> PollHint {
        if events.is_empty() {
            self.readable.stop();
            self.writable.stop();
            return PollHint::Delete;
        }

        trace!(file_descriptor, ?events, "readiness");
        if events.is_readable() {
            self.readable.release();
        }
        if events.is_writable() {
            self.writable.release();
        }

        PollHint::None
    }
}

/// A non-blocking file descriptor driven by a [`Poller`].
///
/// The descriptor is closed when the device is dropped.
pub struct AsyncFd {
    poller: Arc<Poller>,
    readable: Mutex<Receiver<MpscStorage>>,
    writable: Mutex<Receiver<MpscStorage>>,
    fd: OwnedFd,
}

impl AsyncFd {
    /// Switches `fd` to non-blocking mode and registers it with `poller`.
    ///
    /// # Errors
    /// Returns an error if the descriptor cannot be made non-blocking or the
    /// poller rejects the registration.
    pub fn new(fd: OwnedFd, poller: Arc<Poller>) -> Result<Self> {
        set_nonblocking(fd.as_raw_fd())?;

        let (readable_tx, readable_rx) = signal::<MpscStorage>();
        let (writable_tx, writable_rx) = signal::<MpscStorage>();
        let readiness = Readiness {
            readable: readable_tx,
            writable: writable_tx,
        };

        poller.add(
            fd.as_raw_fd(),
            Interest::READ | Interest::WRITE | Interest::HANGUP | Interest::EDGE,
            readiness,
        )?;
        debug!(file_descriptor = fd.as_raw_fd(), "async fd registered");

        Ok(Self {
            poller,
            readable: Mutex::new(readable_rx),
            writable: Mutex::new(writable_rx),
            fd,
        })
    }

    /// Retries `operation` until it stops reporting `EAGAIN`, awaiting
    /// `readiness` in between.
    async fn retry(
        readiness: &Mutex<Receiver<MpscStorage>>,
        mut operation: impl FnMut() -> isize,
    ) -> DeviceResult {
        loop {
            let transferred = operation();
            if transferred >= 0 {
                return (transferred as usize, None);
            }

            match io::Error::last_os_error().kind() {
                io::ErrorKind::WouldBlock => {
                    if !readiness.lock().await.recv().await {
                        return (0, Some(io::ErrorKind::NotConnected));
                    }
                }
                io::ErrorKind::Interrupted => {}
                kind => return (0, Some(kind)),
            }
        }
    }
}

impl Device for AsyncFd {
    fn read<'a>(&'a self, buffer: &'a mut [u8]) -> BoxFuture<'a, DeviceResult> {
        let fd = self.fd.as_raw_fd();

        async move {
            Self::retry(&self.readable, || unsafe {
                libc::read(fd, buffer.as_mut_ptr().cast(), buffer.len())
            })
            .await
        }
        .boxed()
    }

    fn write<'a>(&'a self, buffer: &'a [u8]) -> BoxFuture<'a, DeviceResult> {
        let fd = self.fd.as_raw_fd();

        async move {
            Self::retry(&self.writable, || unsafe {
                libc::write(fd, buffer.as_ptr().cast(), buffer.len())
            })
            .await
        }
        .boxed()
    }
}

impl AsRawFd for AsyncFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for AsyncFd {
    fn drop(&mut self) {
        // Deregister before `fd` closes the descriptor.
        let _ = self.poller.remove(self.fd.as_raw_fd());
    }
}

impl fmt::Debug for AsyncFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFd")
            .field("fd", &self.fd.as_raw_fd())
            .finish_non_exhaustive()
    }
}
