//! The task type: one owned asynchronous computation.
//!
//! A [`Task`] wraps a future together with an optional [`Executor`]. It is a
//! future itself, so awaiting it consumes it and the compiler enforces that its
//! result is collected once. Alternatively, [`Task::detach`] lets it run to
//! completion unobserved and [`Task::block`] drives it from synchronous code.
//!
//! # Life cycle
//!
//! ```text
//!   Created ──await──► (inline poll) ─────────────────┐
//!      │                                              ▼
//!      └──await with executor──► Dispatched ──► output collected ──► Consumed
//! ```
//!
//! A task without an executor is polled inline by whoever awaits it, so it runs
//! on the caller's thread and inherits the caller's executor context. A task
//! bound to an executor through [`Task::by`] is handed to that executor on its
//! first poll; every later wake goes through the executor again.
//!
//! # Panics
//!
//! A panic inside the task body is captured and resumed where the result is
//! consumed: at the `.await`, or in the thread calling [`Task::block`]. A
//! detached task has no consumer, so its panic is logged and dropped.
//!
//! # Example
//!
//! ```no_run
//! use coreactor::{NewThreadExecutor, Task};
//! use std::sync::Arc;
//!
//! let task = Task::new(async { 20 })
//!     .by(Arc::new(NewThreadExecutor))
//!     .then(|value| value + 1)
//!     .then(|value| value * 2);
//!
//! assert_eq!(task.block(), 42);
//! ```

use crate::runtime::context::current_executor;
use crate::runtime::executor::{Executor, InlineExecutor};
use crate::runtime::job::{Harness, Outcome};

use futures::FutureExt;
use futures::future::{BoxFuture, poll_fn};

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use tracing::error;

enum TaskState<T> {
    Created(BoxFuture<'static, Outcome<T>>),
    Dispatched(Arc<Harness<T>>),
    Consumed,
}

/// An owned, move-only asynchronous computation producing `T`.
#[must_use = "a task does nothing unless awaited, detached or blocked on"]
pub struct Task<T> {
    state: TaskState<T>,
    executor: Option<Arc<dyn Executor>>,
}

impl<T: Send + 'static> Task<T> {
    /// Wraps `future` into a task without an executor.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            state: TaskState::Created(AssertUnwindSafe(future).catch_unwind().boxed()),
            executor: None,
        }
    }

    /// Creates a task that completes immediately with `value`.
    pub fn ready(value: T) -> Self {
        Self::new(futures::future::ready(value))
    }

    /// Binds the task to `executor`.
    ///
    /// The first poll hands the body to the executor instead of running it on
    /// the awaiting thread. Binding a task that is already dispatched has no
    /// effect.
    ///
    /// # Arguments
    /// - `executor`: Where the body is polled, now and after every wake.
    ///
    /// # Returns
    /// The same task, bound to `executor`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use coreactor::{NewThreadExecutor, Task};
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// let caller = thread::current().id();
    /// let worker = Task::new(async { thread::current().id() })
    ///     .by(Arc::new(NewThreadExecutor))
    ///     .block();
    ///
    /// assert_ne!(caller, worker);
    /// ```
    pub fn by(mut self, executor: Arc<dyn Executor>) -> Self {
        if matches!(self.state, TaskState::Created(_)) {
            self.executor = Some(executor);
        }
        self
    }

    /// Returns the executor the task is bound to.
    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref()
    }

    /// Applies `transform` to the result once it is awaited.
    ///
    /// Transforms compose left to right: `task.then(f).then(g)` yields
    /// `g(f(value))`. They run on the awaiting side, after the task itself
    /// completed on its own executor.
    pub fn then<U, F>(self, transform: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Task::new(async move { transform(self.await) })
    }

    /// Continues with the task returned by `transform`.
    pub fn chain<U, F>(self, transform: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Task<U> + Send + 'static,
    {
        Task::new(async move { transform(self.await).await })
    }

    /// Runs the task to completion without an observer.
    ///
    /// The task runs on its own executor if it has one, otherwise on the
    /// executor of the current context, otherwise inline until its first
    /// suspension. The result is dropped; a panic is logged.
    pub fn detach(self) {
        let executor = self
            .executor
            .clone()
            .or_else(current_executor)
            .unwrap_or_else(|| Arc::new(InlineExecutor));

        self.detach_by(executor);
    }

    /// Like [`Task::detach`], with an explicit executor.
    pub fn detach_by(mut self, executor: Arc<dyn Executor>) {
        let body = match mem::replace(&mut self.state, TaskState::Consumed) {
            TaskState::Created(body) => body,
            TaskState::Dispatched(harness) => poll_fn(move |cx| harness.poll_output(cx)).boxed(),
            TaskState::Consumed => panic!("`Task` detached after it was consumed"),
        };

        let logged = body
            .map(|outcome| {
                if let Err(payload) = outcome {
                    error!(panic = panic_message(&*payload), "detached task panicked");
                }
                Ok(())
            })
            .boxed();

        // The harness keeps itself alive through its executor and wakers.
        drop(Harness::<()>::spawn(logged, executor));
    }

    /// Blocks the calling thread until the task completes and returns its value.
    ///
    /// This is the bridge from synchronous code into tasks. A panic raised by
    /// the task body is resumed on the calling thread.
    pub fn block(self) -> T {
        futures::executor::block_on(self)
    }
}

impl<T: Send + 'static> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();

        if matches!(this.state, TaskState::Created(_))
            && let Some(executor) = this.executor.clone()
            && let TaskState::Created(body) = mem::replace(&mut this.state, TaskState::Consumed)
        {
            this.state = TaskState::Dispatched(Harness::spawn(body, executor));
        }

        let outcome = match &mut this.state {
            TaskState::Created(body) => ready!(body.as_mut().poll(cx)),
            TaskState::Dispatched(harness) => ready!(harness.poll_output(cx)),
            TaskState::Consumed => panic!("`Task` polled after it was consumed"),
        };
        this.state = TaskState::Consumed;

        match outcome {
            Ok(value) => Poll::Ready(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                matches!(self.state, TaskState::Consumed),
                "`Task` dropped before it was awaited, detached or blocked on"
            );
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            TaskState::Created(_) => "created",
            TaskState::Dispatched(_) => "dispatched",
            TaskState::Consumed => "consumed",
        };

        f.debug_struct("Task")
            .field("state", &state)
            .field("has_executor", &self.executor.is_some())
            .finish()
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
