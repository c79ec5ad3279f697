//! Fluent builder for [`Poller`] construction.

use crate::error::Result;
use crate::reactor::core::{Dispatch, Handler, PollHint, Poller, identity_dispatch};
use crate::reactor::interest::Interest;

use std::fmt;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`Poller`] instances.
///
/// # Example
/// ```no_run
/// use coreactor::PollerBuilder;
/// use std::time::Duration;
///
/// let poller = PollerBuilder::new()
///     .timeout(Duration::from_millis(10))
///     .max_events(16)
///     .build()
///     .unwrap();
/// assert!(poller.valid());
/// ```
pub struct PollerBuilder {
    timeout: Duration,
    max_events: usize,
    dispatch: Dispatch,
}

impl PollerBuilder {
    /// Upper bound on how long one [`Poller::poll`] call waits.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

    /// Number of ready events collected by one [`Poller::poll`] call.
    pub const DEFAULT_MAX_EVENTS: usize = 64;

    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            max_events: Self::DEFAULT_MAX_EVENTS,
            dispatch: identity_dispatch(),
        }
    }

    /// Sets the bounded wait of every [`Poller::poll`] call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how many ready events one poll can collect. Clamped to at least one.
    pub fn max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(1);
        self
    }

    /// Routes every handler invocation through `dispatch`.
    pub fn dispatch<F>(mut self, dispatch: F) -> Self
    where
        F: Fn(&dyn Handler, RawFd, Interest) -> PollHint + Send + Sync + 'static,
    {
        self.dispatch = Arc::new(dispatch);
        self
    }

    /// Creates the poller.
    ///
    /// # Errors
    /// Returns [`Error::Io`](crate::Error::Io) when the epoll instance cannot be created.
    pub fn build(self) -> Result<Poller> {
        Poller::from_parts(self.max_events, self.timeout, self.dispatch)
    }
}

impl Default for PollerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PollerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollerBuilder")
            .field("timeout", &self.timeout)
            .field("max_events", &self.max_events)
            .finish_non_exhaustive()
    }
}
