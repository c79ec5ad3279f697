//! Owning and pinned handles over a signal storage.
//!
//! [`signal`] creates the pair. Both owning handles stop the storage when they
//! are dropped, so a consumer never waits forever on a sender that is gone, and
//! a sender stops delivering once its consumer is gone.
//!
//! A [`Pinned`] sender borrows the storage of an owning handle. It can release
//! and stop like the owner, but dropping it does nothing, and the borrow checker
//! keeps it from outliving the owner it was taken from.

use super::{SignalStorage, Wakeup};

use futures::Stream;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Creates a connected sender/receiver pair over a fresh storage `S`.
pub fn signal<S: SignalStorage>() -> (Sender<S>, Receiver<S>) {
    let storage = Arc::new(S::default());

    (
        Sender {
            storage: storage.clone(),
        },
        Receiver { storage },
    )
}

/// Owning producer side of a signal.
#[derive(Debug)]
pub struct Sender<S: SignalStorage> {
    storage: Arc<S>,
}

impl<S: SignalStorage> Sender<S> {
    /// Adds one release, resuming the consumer directly if it is waiting.
    ///
    /// Returns `true` when the consumer was resumed directly.
    pub fn release(&self) -> bool {
        self.storage.release()
    }

    /// Stops the signal. Returns `true` only for the first stop.
    pub fn stop(&self) -> bool {
        self.storage.stop()
    }

    /// Stops the signal and discards buffered releases.
    ///
    /// See [`SignalStorage::force_stop`].
    pub fn force_stop(&self) -> Option<usize> {
        self.storage.force_stop()
    }

    /// Returns whether the signal was stopped by either side.
    pub fn is_stopped(&self) -> bool {
        self.storage.is_stopped()
    }

    /// Borrows a non-owning sender over the same storage.
    pub fn pin(&self) -> Pinned<'_, S> {
        Pinned {
            storage: &self.storage,
        }
    }
}

impl<S: SignalStorage> Drop for Sender<S> {
    fn drop(&mut self) {
        self.storage.stop();
    }
}

/// Non-owning sender borrowed from a [`Sender`].
///
/// Dropping a pinned sender never stops the signal.
#[derive(Debug)]
pub struct Pinned<'a, S: SignalStorage> {
    storage: &'a S,
}

impl<S: SignalStorage> Clone for Pinned<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: SignalStorage> Copy for Pinned<'_, S> {}

impl<S: SignalStorage> Pinned<'_, S> {
    /// Adds one release. See [`Sender::release`].
    pub fn release(&self) -> bool {
        self.storage.release()
    }

    /// Adds one release and defers waking the consumer to the returned [`Wakeup`].
    pub fn release_deferred(&self) -> Wakeup {
        self.storage.release_deferred()
    }

    /// Stops the signal. See [`Sender::stop`].
    pub fn stop(&self) -> bool {
        self.storage.stop()
    }

    /// Stops the signal and defers waking the consumer to the returned [`Wakeup`].
    pub fn stop_deferred(&self) -> Option<Wakeup> {
        self.storage.stop_deferred()
    }

    /// Stops the signal and discards buffered releases.
    pub fn force_stop(&self) -> Option<usize> {
        self.storage.force_stop()
    }

    /// Returns whether the signal was stopped.
    pub fn is_stopped(&self) -> bool {
        self.storage.is_stopped()
    }
}

/// Owning consumer side of a signal.
#[derive(Debug)]
pub struct Receiver<S: SignalStorage> {
    storage: Arc<S>,
}

impl<S: SignalStorage> Receiver<S> {
    /// Waits for the next release.
    ///
    /// Resolves to `true` for every release and to `false` once the signal is
    /// stopped and nothing buffered is left.
    pub fn recv(&mut self) -> Recv<'_, S> {
        Recv { receiver: self }
    }

    /// Poll-based form of [`Receiver::recv`].
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
        loop {
            if self.storage.ready() || self.storage.is_stopped() {
                return Poll::Ready(self.storage.resume());
            }

            if self.storage.suspend(cx.waker()) {
                return Poll::Pending;
            }
        }
    }

    /// Consumes a release without suspending.
    ///
    /// Returns `None` when the caller would have to wait.
    pub fn try_recv(&mut self) -> Option<bool> {
        if self.storage.ready() || self.storage.is_stopped() {
            Some(self.storage.resume())
        } else {
            None
        }
    }

    /// Stops the signal from the consumer side.
    pub fn stop(&self) -> bool {
        self.storage.stop()
    }

    /// Stops the signal and discards buffered releases.
    pub fn force_stop(&self) -> Option<usize> {
        self.storage.force_stop()
    }

    /// Returns whether the signal was stopped by either side.
    pub fn is_stopped(&self) -> bool {
        self.storage.is_stopped()
    }
}

impl<S: SignalStorage> Drop for Receiver<S> {
    fn drop(&mut self) {
        self.storage.stop();
    }
}

impl<S: SignalStorage> Stream for Receiver<S> {
    type Item = ();

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<()>> {
        self.get_mut().poll_recv(cx).map(|alive| alive.then_some(()))
    }
}

/// Future returned by [`Receiver::recv`].
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct Recv<'a, S: SignalStorage> {
    receiver: &'a mut Receiver<S>,
}

impl<S: SignalStorage> Future for Recv<'_, S> {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
