//! Thread-local record of the executor driving the current poll.
//!
//! A dispatched task enters its executor's context for the duration of every poll
//! of its body. Code running inside that poll (a nested task that has no executor
//! of its own, or a `detach()` call without an explicit executor) can then find
//! the executor it is already running on through [`current_executor`].
//!
//! Contexts nest: entering a new one stashes the previous executor and the guard
//! puts it back when dropped, including during unwinding.

use crate::runtime::executor::Executor;

use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// Executor of the job being polled on this thread, if any.
    static CURRENT_EXECUTOR: RefCell<Option<Arc<dyn Executor>>> = const { RefCell::new(None) };
}

/// Restores the previous executor context when dropped.
pub(crate) struct ContextGuard {
    previous: Option<Arc<dyn Executor>>,
}

/// Makes `executor` the current executor until the returned guard is dropped.
pub(crate) fn enter_context(executor: Arc<dyn Executor>) -> ContextGuard {
    let previous = CURRENT_EXECUTOR.with(|current| current.borrow_mut().replace(executor));

    ContextGuard { previous }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_EXECUTOR.with(|current| *current.borrow_mut() = previous);
    }
}

/// Returns the executor whose job is being polled on this thread.
///
/// Returns `None` outside of any dispatched task, for example on a thread that
/// drives a task through [`Task::block`](crate::Task::block) directly.
pub fn current_executor() -> Option<Arc<dyn Executor>> {
    CURRENT_EXECUTOR.with(|current| current.borrow().clone())
}
