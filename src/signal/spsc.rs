use super::{SignalStorage, Wakeup};

use futures::task::AtomicWaker;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::Waker;

/// High bit of the packed state: set once the storage is stopped.
const STOPPED: usize = 1 << (usize::BITS - 1);

/// Remaining bits of the packed state: the buffered release count.
const COUNT_MASK: usize = !STOPPED;

/// Default capacity of an [`SpscStorage`]: every count the packed state can hold.
pub const DEFAULT_MAX_SIGNALS: usize = COUNT_MASK;

/// Lock-free storage for exactly one producer and one consumer.
///
/// The release count and the stop bit live in a single atomic word, so a
/// release racing a stop is resolved by one compare-and-swap. The waiting
/// consumer parks its waker in an [`AtomicWaker`], which plays the role of the
/// wait/notify channel between the two sides.
///
/// At most `MAX` releases are buffered; further releases are dropped and
/// report `false`.
pub struct SpscStorage<const MAX: usize = DEFAULT_MAX_SIGNALS> {
    state: AtomicUsize,
    waiter: AtomicWaker,
}

impl<const MAX: usize> SpscStorage<MAX> {
    const LIMIT: usize = if MAX < COUNT_MASK { MAX } else { COUNT_MASK };

    fn count(state: usize) -> usize {
        state & COUNT_MASK
    }

    fn stopped(state: usize) -> bool {
        state & STOPPED != 0
    }
}

impl<const MAX: usize> Default for SpscStorage<MAX> {
    fn default() -> Self {
        Self {
            state: AtomicUsize::new(0),
            waiter: AtomicWaker::new(),
        }
    }
}

impl<const MAX: usize> SignalStorage for SpscStorage<MAX> {
    fn release_deferred(&self) -> Wakeup {
        let released = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                if Self::stopped(state) || Self::count(state) >= Self::LIMIT {
                    None
                } else {
                    Some(state + 1)
                }
            });

        match released {
            Ok(_) => Wakeup::new(self.waiter.take()),
            Err(_) => Wakeup::default(),
        }
    }

    fn ready(&self) -> bool {
        Self::count(self.state.load(Ordering::Acquire)) > 0
    }

    fn suspend(&self, waker: &Waker) -> bool {
        self.waiter.register(waker);

        // A release or stop may have landed between the caller's readiness
        // check and the registration above.
        let state = self.state.load(Ordering::Acquire);
        if Self::count(state) > 0 || Self::stopped(state) {
            self.waiter.take();
            return false;
        }

        true
    }

    fn resume(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (Self::count(state) > 0).then(|| state - 1)
            })
            .is_ok()
    }

    fn stop_deferred(&self) -> Option<Wakeup> {
        let previous = self.state.fetch_or(STOPPED, Ordering::AcqRel);
        if Self::stopped(previous) {
            return None;
        }

        Some(Wakeup::new(self.waiter.take()))
    }

    fn force_stop(&self) -> Option<usize> {
        let previous = self.state.swap(STOPPED, Ordering::AcqRel);
        let residual = Self::count(previous);

        let woke = Wakeup::new(self.waiter.take()).fire();
        if residual == 0 && woke {
            None
        } else {
            Some(residual)
        }
    }

    fn is_stopped(&self) -> bool {
        Self::stopped(self.state.load(Ordering::Acquire))
    }
}

impl<const MAX: usize> fmt::Debug for SpscStorage<MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Ordering::Acquire);

        f.debug_struct("SpscStorage")
            .field("count", &Self::count(state))
            .field("stopped", &Self::stopped(state))
            .field("max", &Self::LIMIT)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::task::noop_waker;

    #[test]
    fn capacity_bounds_buffered_releases() {
        let storage = SpscStorage::<2>::default();

        assert!(!storage.release());
        assert!(!storage.release());
        assert!(!storage.release());
        assert_eq!(storage.force_stop(), Some(2));
    }

    #[test]
    fn waiter_is_taken_by_release() {
        let storage = SpscStorage::<4>::default();

        assert!(storage.suspend(&noop_waker()));
        assert!(storage.release());
        // The waker was consumed; the next release only buffers.
        assert!(!storage.release());
        assert!(storage.resume());
        assert!(storage.resume());
        assert!(!storage.resume());
    }

    #[test]
    fn stop_keeps_buffered_releases_consumable() {
        let storage = SpscStorage::<DEFAULT_MAX_SIGNALS>::default();
        storage.release();
        storage.release();

        assert!(storage.stop());
        assert!(!storage.stop());
        assert!(!storage.release());
        assert!(storage.resume());
        assert!(storage.resume());
        assert!(!storage.resume());
    }

    #[test]
    fn suspend_after_stop_does_not_wait() {
        let storage = SpscStorage::<4>::default();
        storage.stop();

        assert!(!storage.suspend(&noop_waker()));
    }

    #[test]
    fn force_stop_on_waiting_consumer_reports_none() {
        let storage = SpscStorage::<4>::default();
        assert!(storage.suspend(&noop_waker()));

        assert_eq!(storage.force_stop(), None);
        assert!(storage.is_stopped());
    }
}
