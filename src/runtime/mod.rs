//! Execution plumbing: executors, the executor context, and dispatched jobs.

pub(crate) mod context;
pub(crate) mod executor;
pub(crate) mod job;
pub(crate) mod waker;

pub use context::current_executor;
pub use executor::{Executor, InlineExecutor, Job, NewThreadExecutor};
