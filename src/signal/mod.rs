//! Counting wake primitives bridging producers to one suspended consumer.
//!
//! A signal is a pair of handles over a shared storage. The [`Sender`] releases,
//! the [`Receiver`] awaits. A release either bumps a counter (nobody is waiting)
//! or wakes the waiting consumer directly. Awaiting resolves to `true` while
//! releases are available and to `false` once the signal is stopped and drained,
//! which is how "no more data will ever arrive" is reported.
//!
//! # Storages
//!
//! | Storage            | Synchronization                  | Valid for                          |
//! | :----------------- | :------------------------------- | :--------------------------------- |
//! | [`UnsyncStorage`]  | none (`RefCell`, `!Sync`)        | producer and consumer on one thread |
//! | [`SpscStorage`]    | one packed atomic + atomic waker | one producer, one consumer         |
//! | [`MpscStorage`]    | a mutex around the unsync state  | many producers, one consumer       |
//!
//! The storage is picked through the type parameter when the pair is created, so
//! the cost of synchronization is only paid where the concurrency shape needs it.
//!
//! # Example
//!
//! ```no_run
//! use coreactor::{MpscStorage, signal};
//!
//! let (tx, mut rx) = signal::<MpscStorage>();
//! let producer = std::thread::spawn(move || {
//!     for _ in 0..3 {
//!         tx.release();
//!     }
//! });
//!
//! let received = futures::executor::block_on(async move {
//!     let mut received = 0;
//!     while rx.recv().await {
//!         received += 1;
//!     }
//!     received
//! });
//! producer.join().unwrap();
//! assert_eq!(received, 3);
//! ```

mod handle;
mod mpsc;
mod spsc;
mod state;
mod unsync;

pub use handle::{Pinned, Receiver, Recv, Sender, signal};
pub use mpsc::MpscStorage;
pub use spsc::{DEFAULT_MAX_SIGNALS, SpscStorage};
pub use unsync::UnsyncStorage;

use std::task::Waker;

/// A wake-up taken out of a storage, to be delivered once no lock is held.
///
/// Storages hand out a `Wakeup` instead of waking inside their critical
/// section, so a consumer that is polled synchronously by its waker never
/// observes the storage (or an outer registry lock) still held.
#[must_use = "a wakeup does nothing until it is fired"]
#[derive(Debug, Default)]
pub struct Wakeup {
    waker: Option<Waker>,
}

impl Wakeup {
    pub(crate) fn new(waker: Option<Waker>) -> Self {
        Self { waker }
    }

    /// Returns whether firing will resume a suspended consumer.
    pub fn is_direct(&self) -> bool {
        self.waker.is_some()
    }

    /// Wakes the suspended consumer, if there was one.
    ///
    /// Returns `true` when a consumer was woken.
    pub fn fire(self) -> bool {
        match self.waker {
            Some(waker) => {
                waker.wake();
                true
            }
            None => false,
        }
    }
}

/// Shared state behind a [`Sender`]/[`Receiver`] pair.
///
/// At most one consumer waits on a storage at a time. `stop` and `force_stop`
/// move the storage into its terminal state; a waiting consumer is always woken
/// when that happens.
pub trait SignalStorage: Default {
    /// Adds one release and takes the waiting consumer's waker, if any.
    ///
    /// Releases on a stopped storage, or beyond the storage's capacity, are
    /// dropped and produce an empty [`Wakeup`].
    fn release_deferred(&self) -> Wakeup;

    /// Returns whether a release is available without suspending.
    fn ready(&self) -> bool;

    /// Registers `waker` as the waiting consumer.
    ///
    /// Returns `false` without suspending when a release is available or the
    /// storage is stopped, in which case the consumer must not wait.
    fn suspend(&self, waker: &Waker) -> bool;

    /// Consumes one release.
    ///
    /// Returns `false` once the storage is stopped and has nothing buffered.
    fn resume(&self) -> bool;

    /// Marks the storage stopped and takes the waiting consumer's waker.
    ///
    /// Returns `None` when the storage was already stopped.
    fn stop_deferred(&self) -> Option<Wakeup>;

    /// Stops the storage, discarding buffered releases.
    ///
    /// Returns how many buffered releases were discarded, or `None` when nothing
    /// was buffered and a waiting consumer had to be woken instead.
    fn force_stop(&self) -> Option<usize>;

    /// Returns whether `stop` or `force_stop` has been called.
    fn is_stopped(&self) -> bool;

    /// Adds one release.
    ///
    /// Returns `true` when a waiting consumer was resumed directly and `false`
    /// when the release was buffered (or dropped on a stopped storage).
    fn release(&self) -> bool {
        self.release_deferred().fire()
    }

    /// Marks the storage stopped, waking a waiting consumer.
    ///
    /// Returns `true` for the call that performed the transition and `false`
    /// for every later one.
    fn stop(&self) -> bool {
        match self.stop_deferred() {
            Some(wakeup) => {
                wakeup.fire();
                true
            }
            None => false,
        }
    }
}
