//! Executor-driven execution of a task body.
//!
//! A [`Harness`] owns a task's boxed future once the task has been handed to an
//! executor. Every wake reschedules the harness through that executor, and the
//! harness keeps the output until the awaiting side collects it.
//!
//! # State machine
//!
//! ```text
//!            wake                 executor runs
//!   IDLE ───────────► SCHEDULED ───────────────► RUNNING ──► DONE
//!    ▲                                             │  ▲
//!    │            Pending, no wake during poll     │  │ re-poll
//!    └─────────────────────────────────────────────┘  │
//!                         wake during poll ──► NOTIFIED
//! ```
//!
//! A wake that lands while the body is being polled only flips the state to
//! `NOTIFIED`; the running poll then loops once more instead of scheduling a
//! second, concurrent poll.

use crate::runtime::context::enter_context;
use crate::runtime::executor::Executor;
use crate::runtime::waker::make_waker;

use futures::future::BoxFuture;
use futures::task::AtomicWaker;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::thread;

const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const RUNNING: u8 = 2;
const NOTIFIED: u8 = 3;
const DONE: u8 = 4;

/// Output of a task body, with a captured panic in place of a value.
pub(crate) type Outcome<T> = thread::Result<T>;

/// Objects that can be rescheduled by a waker.
pub(crate) trait Runnable: Send + Sync {
    /// Requests another poll.
    fn schedule(self: Arc<Self>);
}

/// A task body bound to an executor.
pub(crate) struct Harness<T> {
    future: Mutex<Option<BoxFuture<'static, Outcome<T>>>>,
    output: Mutex<Option<Outcome<T>>>,
    state: AtomicU8,
    waiter: AtomicWaker,
    executor: Arc<dyn Executor>,
}

impl<T: Send + 'static> Harness<T> {
    /// Binds `future` to `executor` and schedules its first poll.
    pub(crate) fn spawn(
        future: BoxFuture<'static, Outcome<T>>,
        executor: Arc<dyn Executor>,
    ) -> Arc<Self> {
        let harness = Arc::new(Self {
            future: Mutex::new(Some(future)),
            output: Mutex::new(None),
            state: AtomicU8::new(SCHEDULED),
            waiter: AtomicWaker::new(),
            executor,
        });

        harness.clone().dispatch();
        harness
    }

    fn dispatch(self: Arc<Self>) {
        let executor = self.executor.clone();
        executor.schedule(Box::new(move || self.run()));
    }

    /// Polls the body until it is pending without a concurrent wake, or done.
    fn run(self: Arc<Self>) {
        let scheduled = self
            .state
            .compare_exchange(SCHEDULED, RUNNING, Ordering::AcqRel, Ordering::Acquire);
        debug_assert!(scheduled.is_ok(), "harness ran without being scheduled");

        let waker = make_waker(self.clone());
        let mut context = Context::from_waker(&waker);
        let _guard = enter_context(self.executor.clone());

        loop {
            let mut slot = self.future.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(future) = slot.as_mut() else {
                return;
            };

            match future.as_mut().poll(&mut context) {
                Poll::Ready(outcome) => {
                    *slot = None;
                    drop(slot);

                    *self.output.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
                    self.state.store(DONE, Ordering::Release);
                    self.waiter.wake();
                    return;
                }
                Poll::Pending => {
                    drop(slot);

                    match self.state.compare_exchange(
                        RUNNING,
                        IDLE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return,
                        Err(_) => self.state.store(RUNNING, Ordering::Release),
                    }
                }
            }
        }
    }

    /// Collects the output once the body has completed.
    ///
    /// # Panics
    /// Panics if the output was already collected.
    pub(crate) fn poll_output(&self, cx: &mut Context<'_>) -> Poll<Outcome<T>> {
        if self.state.load(Ordering::Acquire) != DONE {
            self.waiter.register(cx.waker());

            if self.state.load(Ordering::Acquire) != DONE {
                return Poll::Pending;
            }
        }

        let outcome = self
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .expect("task completed but output missing");

        Poll::Ready(outcome)
    }
}

impl<T: Send + 'static> Runnable for Harness<T> {
    fn schedule(self: Arc<Self>) {
        let mut current = self.state.load(Ordering::Acquire);

        loop {
            let next = match current {
                IDLE => SCHEDULED,
                RUNNING => NOTIFIED,
                _ => return,
            };

            match self
                .state
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) if next == SCHEDULED => return self.dispatch(),
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}
