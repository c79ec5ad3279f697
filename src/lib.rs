//! Coroutine-style asynchronous runtime core.
//!
//! This crate provides the concurrency core that socket wrappers, resolvers and
//! servers are built on: tasks, counting wake signals, a keyed publish/subscribe
//! layer over signals, and an epoll reactor that turns readiness into signal
//! releases.
//!
//! # Architecture
//!
//! - **Executor**: where a resumption runs (inline, or on a fresh thread)
//! - **Signal**: a counting wake primitive with three storages (unsync, SPSC, MPSC)
//! - **PubSub**: a registry of signal senders keyed for fan-out delivery
//! - **Task**: an owned future with executor dispatch, composition, `detach` and `block`
//! - **Poller**: the epoll reactor dispatching readiness to registered handlers
//! - **PollerBuilder**: fluent configuration of a poller
//!
//! # Control flow
//!
//! ```text
//!   Task ──await──► Receiver::recv ──suspend──► storage keeps the waker
//!                                                     ▲
//!   Poller::poll ──► Handler::handle ──► Sender::release ──► waker ──► Task resumes
//! ```

mod builder;
mod error;
mod pubsub;
pub mod reactor;
mod runtime;
pub mod signal;
mod task;

pub use builder::PollerBuilder;
pub use error::{Error, Result};
pub use pubsub::PubSub;
pub use reactor::{AsyncFd, Device, DeviceResult, Dispatch, Handler, Interest, PollHint, Poller};
pub use runtime::{Executor, InlineExecutor, Job, NewThreadExecutor, current_executor};
pub use signal::{
    DEFAULT_MAX_SIGNALS, MpscStorage, Pinned, Receiver, Recv, Sender, SignalStorage, SpscStorage,
    UnsyncStorage, Wakeup, signal,
};
pub use task::Task;
