//! Counter-and-waiter state shared by the unsync and mpsc storages.

use super::Wakeup;

use std::mem;
use std::task::Waker;

#[derive(Debug, Default)]
pub(crate) struct SignalState {
    count: usize,
    waiter: Option<Waker>,
    stopped: bool,
}

impl SignalState {
    pub(crate) fn release(&mut self) -> Wakeup {
        if self.stopped {
            return Wakeup::default();
        }

        let Some(count) = self.count.checked_add(1) else {
            return Wakeup::default();
        };
        self.count = count;

        Wakeup::new(self.waiter.take())
    }

    pub(crate) fn ready(&self) -> bool {
        self.count > 0
    }

    pub(crate) fn suspend(&mut self, waker: &Waker) -> bool {
        if self.count > 0 || self.stopped {
            return false;
        }

        match &mut self.waiter {
            Some(waiter) => waiter.clone_from(waker),
            None => self.waiter = Some(waker.clone()),
        }

        true
    }

    pub(crate) fn resume(&mut self) -> bool {
        if self.count == 0 {
            return false;
        }

        self.count -= 1;
        true
    }

    pub(crate) fn stop(&mut self) -> Option<Wakeup> {
        if mem::replace(&mut self.stopped, true) {
            return None;
        }

        Some(Wakeup::new(self.waiter.take()))
    }

    pub(crate) fn force_stop(&mut self) -> (Option<usize>, Wakeup) {
        self.stopped = true;
        let residual = mem::take(&mut self.count);
        let wakeup = Wakeup::new(self.waiter.take());

        if residual == 0 && wakeup.is_direct() {
            (None, wakeup)
        } else {
            (Some(residual), wakeup)
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }
}
