//! Readiness interest and readiness report for a file descriptor.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// A set of epoll event bits.
///
/// Used both to describe what a registration waits for and to report what a
/// file descriptor became ready for. An empty set is delivered to every handler
/// when the poller shuts down.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u32);

impl Interest {
    /// No event at all.
    pub const NONE: Interest = Interest(0);
    /// Data is available to read.
    pub const READ: Interest = Interest(libc::EPOLLIN as u32);
    /// Writing will not block.
    pub const WRITE: Interest = Interest(libc::EPOLLOUT as u32);
    /// Urgent or out-of-band data is available.
    pub const PRIORITY: Interest = Interest(libc::EPOLLPRI as u32);
    /// An error condition is pending.
    pub const ERROR: Interest = Interest(libc::EPOLLERR as u32);
    /// The peer hung up or shut its writing half down.
    pub const HANGUP: Interest = Interest((libc::EPOLLHUP | libc::EPOLLRDHUP) as u32);
    /// Report edges instead of levels.
    pub const EDGE: Interest = Interest(libc::EPOLLET as u32);
    /// Disarm the registration after one report.
    pub const ONESHOT: Interest = Interest(libc::EPOLLONESHOT as u32);

    const NAMES: [(Interest, &'static str); 7] = [
        (Self::READ, "READ"),
        (Self::WRITE, "WRITE"),
        (Self::PRIORITY, "PRIORITY"),
        (Self::ERROR, "ERROR"),
        (Self::HANGUP, "HANGUP"),
        (Self::EDGE, "EDGE"),
        (Self::ONESHOT, "ONESHOT"),
    ];

    /// Builds a set from raw epoll bits.
    pub const fn from_bits(bits: u32) -> Self {
        Interest(bits)
    }

    /// Returns the raw epoll bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns whether the set is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns whether every bit of `other` is set.
    pub const fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns whether any bit of `other` is set.
    pub const fn intersects(self, other: Interest) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns whether a reader should retry: data, hang-up or error.
    pub const fn is_readable(self) -> bool {
        self.intersects(Interest(Self::READ.0 | Self::HANGUP.0 | Self::ERROR.0))
    }

    /// Returns whether a writer should retry: room, hang-up or error.
    pub const fn is_writable(self) -> bool {
        self.intersects(Interest(Self::WRITE.0 | Self::HANGUP.0 | Self::ERROR.0))
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Interest {
    type Output = Interest;

    fn bitand(self, rhs: Interest) -> Interest {
        Interest(self.0 & rhs.0)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }

        let mut remaining = self.0;
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.intersects(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                remaining &= !flag.0;
                first = false;
            }
        }

        if remaining != 0 {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{remaining:#x}")?;
        }

        Ok(())
    }
}
