//! Waker implementation for dispatched tasks.
//!
//! Waking a dispatched task does not poll it directly: the waker asks the job to
//! reschedule itself, and the job decides through its state machine whether a
//! new poll must go through the executor or whether the running poll will pick
//! the notification up.

use crate::runtime::job::Runnable;

use futures::task::{self, ArcWake};

use std::sync::Arc;
use std::task::Waker;

/// Waker payload pointing back at the job to reschedule.
pub(crate) struct JobWaker {
    job: Arc<dyn Runnable>,
}

impl ArcWake for JobWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.job.clone().schedule();
    }
}

/// Creates a [`Waker`] that reschedules `job` when woken.
///
/// # Arguments
/// - `job`: The job to reschedule. The waker and all of its clones keep it alive.
///
/// # Returns
/// A waker whose `wake` and `wake_by_ref` both call [`Runnable::schedule`].
pub(crate) fn make_waker(job: Arc<dyn Runnable>) -> Waker {
    task::waker(Arc::new(JobWaker { job }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl Runnable for Counting {
        fn schedule(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn wake_variants_reschedule_the_job() {
        let job = Arc::new(Counting(AtomicUsize::new(0)));
        let waker = make_waker(job.clone());

        waker.wake_by_ref();
        let cloned = waker.clone();
        cloned.wake();
        waker.wake();

        assert_eq!(job.0.load(Ordering::SeqCst), 3);
        // Every waker is gone, only the test's own handle remains.
        assert_eq!(Arc::strong_count(&job), 1);
    }
}
