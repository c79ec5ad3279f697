//! The epoll reactor.
//!
//! A [`Poller`] owns one epoll instance and a map from file descriptor to
//! [`Handler`]. Exactly one driver thread calls [`Poller::poll`] in a loop; any
//! thread may register, modify or remove file descriptors in the meantime.
//!
//! Each ready file descriptor has its handler invoked with the reported events.
//! The handler typically releases a signal and returns a [`PollHint`] telling
//! the poller what to do with the registration afterwards.
//!
//! ```text
//!   add ──► registered(interest, handler) ──modify──► registered(..)
//!                     │                                    │
//!                     └──────────── remove / Delete ◄──────┘
//!                                        │
//!   shutdown: every remaining handler is called once with Interest::NONE,
//!   then the epoll instance is closed and `valid()` turns false.
//! ```

use crate::builder::PollerBuilder;
use crate::error::{Error, Result};
use crate::reactor::event::{self, Event};
use crate::reactor::interest::Interest;

use libc::{EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD};
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, trace, warn};

/// What to do with a registration after its handler ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollHint {
    /// Keep the registration unchanged.
    None,
    /// Replace the registration's interest.
    Modify(Interest),
    /// Remove the registration.
    Delete,
}

/// Reacts to readiness of a registered file descriptor.
///
/// Closures `Fn(RawFd, Interest) -> PollHint` implement this trait.
pub trait Handler: Send + Sync {
    /// Called with the ready events, or with [`Interest::NONE`] at shutdown.
    fn handle(&self, file_descriptor: RawFd, events: Interest) -> PollHint;
}

impl<F> Handler for F
where
    F: Fn(RawFd, Interest) -> PollHint + Send + Sync,
{
    fn handle(&self, file_descriptor: RawFd, events: Interest) -> PollHint {
        self(file_descriptor, events)
    }
}

/// Proxy through which every handler invocation goes.
///
/// The default proxy calls the handler directly; tests replace it to observe
/// or intercept dispatches.
pub type Dispatch = Arc<dyn Fn(&dyn Handler, RawFd, Interest) -> PollHint + Send + Sync>;

pub(crate) fn identity_dispatch() -> Dispatch {
    Arc::new(|handler: &dyn Handler, file_descriptor: RawFd, events: Interest| {
        handler.handle(file_descriptor, events)
    })
}

struct Registration {
    interest: Interest,
    handler: Arc<dyn Handler>,
}

/// The epoll reactor.
pub struct Poller {
    epoll: AtomicI32,
    registry: RwLock<HashMap<RawFd, Registration>>,
    events: Mutex<Vec<Event>>,
    timeout: Duration,
    dispatch: Dispatch,
}

impl Poller {
    /// Creates a poller with the default configuration.
    ///
    /// # Errors
    /// Returns [`Error::Io`] when the epoll instance cannot be created.
    pub fn new() -> Result<Self> {
        PollerBuilder::new().build()
    }

    /// Creates a poller configured through a [`PollerBuilder`].
    pub fn builder() -> PollerBuilder {
        PollerBuilder::new()
    }

    pub(crate) fn from_parts(
        max_events: usize,
        timeout: Duration,
        dispatch: Dispatch,
    ) -> Result<Self> {
        let epoll = event::create()?;
        debug!(epoll, max_events, ?timeout, "poller created");

        Ok(Self {
            epoll: AtomicI32::new(epoll),
            registry: RwLock::new(HashMap::new()),
            events: Mutex::new(vec![Event::EMPTY; max_events.max(1)]),
            timeout,
            dispatch,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<RawFd, Registration>> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RawFd, Registration>> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn epoll(&self) -> Result<RawFd> {
        match self.epoll.load(Ordering::Acquire) {
            epoll if epoll >= 0 => Ok(epoll),
            _ => Err(Error::Shutdown),
        }
    }

    /// Returns whether the poller has not been shut down.
    pub fn valid(&self) -> bool {
        self.epoll.load(Ordering::Acquire) >= 0
    }

    /// Returns whether `file_descriptor` is registered.
    pub fn contains(&self, file_descriptor: RawFd) -> bool {
        self.read().contains_key(&file_descriptor)
    }

    /// Returns the interest `file_descriptor` is registered for.
    pub fn interest(&self, file_descriptor: RawFd) -> Option<Interest> {
        self.read()
            .get(&file_descriptor)
            .map(|registration| registration.interest)
    }

    /// Returns the number of registered file descriptors.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns whether no file descriptor is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registers `file_descriptor` for `interest`, handled by `handler`.
    ///
    /// The handler runs on the thread calling [`Poller::poll`] every time the
    /// descriptor reports one of the requested events, and once more with
    /// [`Interest::NONE`] if the poller shuts down while it is registered.
    ///
    /// # Arguments
    /// - `file_descriptor`: The descriptor to watch. The caller keeps ownership
    ///   and must [`remove`](Poller::remove) it before closing it.
    /// - `interest`: The events to watch for, e.g. `Interest::READ | Interest::EDGE`.
    /// - `handler`: A [`Handler`], or a closure `Fn(RawFd, Interest) -> PollHint`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use coreactor::{Interest, MpscStorage, PollHint, Poller, signal};
    /// use std::os::unix::io::RawFd;
    ///
    /// let poller = Poller::new().unwrap();
    /// let (tx, _rx) = signal::<MpscStorage>();
    /// let fd: RawFd = 0;
    ///
    /// poller
    ///     .add(fd, Interest::READ, move |_fd: RawFd, events: Interest| {
    ///         if events.is_empty() {
    ///             tx.stop();
    ///             return PollHint::Delete;
    ///         }
    ///         tx.release();
    ///         PollHint::None
    ///     })
    ///     .unwrap();
    /// ```
    ///
    /// # Errors
    /// - [`Error::AlreadyRegistered`] if the file descriptor has a handler.
    /// - [`Error::Shutdown`] once the poller is shut down.
    /// - [`Error::Io`] if `epoll_ctl` rejects the file descriptor.
    pub fn add(
        &self,
        file_descriptor: RawFd,
        interest: Interest,
        handler: impl Handler + 'static,
    ) -> Result<()> {
        self.add_shared(file_descriptor, interest, Arc::new(handler))
    }

    /// Like [`Poller::add`], for a handler that is already shared.
    ///
    /// # Errors
    /// Same as [`Poller::add`].
    pub fn add_shared(
        &self,
        file_descriptor: RawFd,
        interest: Interest,
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        // `shutdown` drains the registry under this lock before closing the
        // epoll fd, so a valid fd seen here stays open until the lock is dropped.
        let mut registry = self.write();
        let epoll = self.epoll()?;

        if registry.contains_key(&file_descriptor) {
            return Err(Error::AlreadyRegistered(file_descriptor));
        }

        event::control(epoll, EPOLL_CTL_ADD, file_descriptor, interest)?;
        registry.insert(file_descriptor, Registration { interest, handler });
        debug!(file_descriptor, ?interest, "registered");

        Ok(())
    }

    /// Replaces the interest, and optionally the handler, of a registration.
    ///
    /// # Errors
    /// - [`Error::NotRegistered`] if the file descriptor is unknown.
    /// - [`Error::Shutdown`] once the poller is shut down.
    /// - [`Error::Io`] if `epoll_ctl` fails.
    pub fn modify(
        &self,
        file_descriptor: RawFd,
        interest: Interest,
        handler: Option<Arc<dyn Handler>>,
    ) -> Result<()> {
        let mut registry = self.write();
        let epoll = self.epoll()?;

        let registration = registry
            .get_mut(&file_descriptor)
            .ok_or(Error::NotRegistered(file_descriptor))?;

        event::control(epoll, EPOLL_CTL_MOD, file_descriptor, interest)?;
        registration.interest = interest;
        let replaced = handler.map(|handler| mem::replace(&mut registration.handler, handler));
        drop(registry);
        debug!(file_descriptor, ?interest, "modified");

        drop(replaced);

        Ok(())
    }

    /// Removes the registration of `file_descriptor`.
    ///
    /// The handler is not called. A file descriptor that was already closed is
    /// still removed from the map.
    ///
    /// # Errors
    /// - [`Error::NotRegistered`] if the file descriptor is unknown.
    /// - [`Error::Shutdown`] once the poller is shut down.
    pub fn remove(&self, file_descriptor: RawFd) -> Result<()> {
        let mut registry = self.write();
        let epoll = self.epoll()?;

        let Some(removed) = registry.remove(&file_descriptor) else {
            return Err(Error::NotRegistered(file_descriptor));
        };

        if let Err(error) = event::control(epoll, EPOLL_CTL_DEL, file_descriptor, Interest::NONE) {
            warn!(file_descriptor, %error, "epoll_ctl(DEL) failed");
        }
        drop(registry);
        debug!(file_descriptor, "removed");

        // The handler may own signals; stopping them wakes consumers outside the lock.
        drop(removed);

        Ok(())
    }

    /// Waits once for readiness and dispatches every ready file descriptor.
    ///
    /// Blocks for at most the configured timeout. Returns the number of ready
    /// events, zero when the wait timed out or was interrupted, or when the
    /// poller is shut down.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if `epoll_wait` fails.
    pub fn poll(&self) -> Result<usize> {
        let Ok(epoll) = self.epoll() else {
            return Ok(0);
        };

        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let ready = match event::wait(epoll, &mut events, self.timeout) {
            Ok(ready) => ready,
            Err(_) if !self.valid() => return Ok(0),
            Err(error) => return Err(error.into()),
        };

        for event in events.iter().take(ready) {
            let file_descriptor = event.file_descriptor();
            let ready_events = event.interest();

            let handler = match self.read().get(&file_descriptor) {
                Some(registration) => registration.handler.clone(),
                None => continue,
            };

            trace!(file_descriptor, events = ?ready_events, "dispatching");
            let hint = (self.dispatch)(&*handler, file_descriptor, ready_events);
            self.apply(file_descriptor, hint);
        }

        Ok(ready)
    }

    fn apply(&self, file_descriptor: RawFd, hint: PollHint) {
        match hint {
            PollHint::None => {}
            PollHint::Modify(interest) => {
                match self.modify(file_descriptor, interest, None) {
                    Ok(()) | Err(Error::NotRegistered(_) | Error::Shutdown) => {}
                    Err(error) => warn!(file_descriptor, %error, "applying modify hint failed"),
                }
            }
            PollHint::Delete => {
                if let Err(error @ Error::Io(_)) = self.remove(file_descriptor) {
                    warn!(file_descriptor, %error, "applying delete hint failed");
                }
            }
        }
    }

    /// Invalidates the poller.
    ///
    /// Every remaining handler is called once with [`Interest::NONE`], so
    /// signal-based waiters wake into their dead state, then the epoll instance
    /// is closed. Later calls do nothing.
    pub fn shutdown(&self) {
        let epoll = self.epoll.swap(-1, Ordering::AcqRel);
        if epoll < 0 {
            return;
        }

        let registrations: Vec<(RawFd, Registration)> = self.write().drain().collect();
        debug!(epoll, handlers = registrations.len(), "poller shutting down");

        for (file_descriptor, registration) in registrations {
            let _ = (self.dispatch)(&*registration.handler, file_descriptor, Interest::NONE);
        }

        event::close(epoll);
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("epoll", &self.epoll.load(Ordering::Acquire))
            .field("registered", &self.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
