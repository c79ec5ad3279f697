use super::state::SignalState;
use super::{SignalStorage, Wakeup};

use std::cell::RefCell;
use std::task::Waker;

/// Storage without any synchronization.
///
/// The type is `!Sync`, so the compiler keeps both handles of the pair on one
/// thread (or behind a caller's own serialization, such as a registry that
/// never leaves its thread).
#[derive(Debug, Default)]
pub struct UnsyncStorage {
    state: RefCell<SignalState>,
}

impl SignalStorage for UnsyncStorage {
    fn release_deferred(&self) -> Wakeup {
        self.state.borrow_mut().release()
    }

    fn ready(&self) -> bool {
        self.state.borrow().ready()
    }

    fn suspend(&self, waker: &Waker) -> bool {
        self.state.borrow_mut().suspend(waker)
    }

    fn resume(&self) -> bool {
        self.state.borrow_mut().resume()
    }

    fn stop_deferred(&self) -> Option<Wakeup> {
        self.state.borrow_mut().stop()
    }

    fn force_stop(&self) -> Option<usize> {
        let (residual, wakeup) = self.state.borrow_mut().force_stop();
        wakeup.fire();

        residual
    }

    fn is_stopped(&self) -> bool {
        self.state.borrow().is_stopped()
    }
}
