//! Executors decide where a resumption runs.
//!
//! An executor receives a boxed callback and guarantees it runs exactly once. The
//! crate ships two of them: [`InlineExecutor`] runs the callback before `schedule`
//! returns, and [`NewThreadExecutor`] hands every callback to a fresh OS thread.
//! There is no pool and no work stealing; callers that need ordering between
//! callbacks must not rely on either executor to provide it.

use std::fmt;
use std::sync::Arc;
use std::thread;

/// A unit of work handed to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Abstraction over where a scheduled callback runs.
pub trait Executor: Send + Sync + 'static {
    /// Takes ownership of `job` and runs it exactly once, now or later.
    fn schedule(&self, job: Job);
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn schedule(&self, job: Job) {
        (**self).schedule(job);
    }
}

/// Runs every job synchronously on the calling thread.
///
/// Useful for tests and for deterministic single-threaded setups.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn schedule(&self, job: Job) {
        job();
    }
}

/// Spawns a detached OS thread for every scheduled job.
#[derive(Clone, Copy, Default)]
pub struct NewThreadExecutor;

impl NewThreadExecutor {
    const THREAD_NAME: &'static str = "coreactor-job";
}

impl Executor for NewThreadExecutor {
    fn schedule(&self, job: Job) {
        thread::Builder::new()
            .name(Self::THREAD_NAME.to_owned())
            .spawn(job)
            .expect("failed to spawn executor thread");
    }
}

impl fmt::Debug for NewThreadExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewThreadExecutor")
            .field("thread_name", &Self::THREAD_NAME)
            .finish()
    }
}
