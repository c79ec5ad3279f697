//! Event-driven I/O reactor module.
//!
//! This module bridges epoll readiness into signal releases:
//! - [`core`]: the [`Poller`] and its handler contract
//! - [`interest`]: epoll event sets
//! - [`event`]: epoll syscall wrappers
//! - [`device`]: the [`Device`] contract and the [`AsyncFd`] device

pub mod core;
pub mod device;
pub(crate) mod event;
pub mod interest;

pub use self::core::{Dispatch, Handler, PollHint, Poller};
pub use device::{AsyncFd, Device, DeviceResult};
pub use interest::Interest;
