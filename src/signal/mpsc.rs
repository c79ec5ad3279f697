use super::state::SignalState;
use super::{SignalStorage, Wakeup};

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::Waker;

/// Storage for many producer threads and one consumer.
///
/// Wraps the unsynchronized state in a mutex. Wake-ups are fired after the
/// mutex is released.
#[derive(Debug, Default)]
pub struct MpscStorage {
    state: Mutex<SignalState>,
}

impl MpscStorage {
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SignalStorage for MpscStorage {
    fn release_deferred(&self) -> Wakeup {
        self.lock().release()
    }

    fn ready(&self) -> bool {
        self.lock().ready()
    }

    fn suspend(&self, waker: &Waker) -> bool {
        self.lock().suspend(waker)
    }

    fn resume(&self) -> bool {
        self.lock().resume()
    }

    fn stop_deferred(&self) -> Option<Wakeup> {
        self.lock().stop()
    }

    fn force_stop(&self) -> Option<usize> {
        let (residual, wakeup) = self.lock().force_stop();
        wakeup.fire();

        residual
    }

    fn is_stopped(&self) -> bool {
        self.lock().is_stopped()
    }
}
