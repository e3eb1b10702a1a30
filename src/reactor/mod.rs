//! Event Reactor
//!
//! A single-threaded readiness loop over `mio`. It is the only place the
//! server blocks: every socket is non-blocking and every handler runs to
//! completion before the next one starts.
//!
//! ## One Iteration
//!
//! ```text
//!        ┌──────────────────────────────────────────────┐
//!        │ timeout = 0 if re-fires pending              │
//!        │         = time to nearest timer otherwise    │
//!        └──────────────────────┬───────────────────────┘
//!                               ▼
//!                      poll(events, timeout)
//!                               │
//!            ┌──────────────────┴──────────────────┐
//!            ▼                                     ▼
//!   for each ready descriptor              for each due timer
//!     read handler                           run, then reschedule
//!     write handler (unless it is            or drop
//!       the same handler)
//! ```
//!
//! Handlers receive the loop and a caller-chosen context `C`, so they can
//! register or remove events while they run.

pub mod event_loop;

use mio::Interest;
use std::ops::BitOr;
use std::os::fd::RawFd;
use thiserror::Error;

pub use event_loop::{EventLoop, FileProc, TimeProc, TimerAction, TimerId, SET_SIZE};

/// Readiness interest of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mask(u8);

impl Mask {
    pub const NONE: Mask = Mask(0);
    pub const READABLE: Mask = Mask(1);
    pub const WRITABLE: Mask = Mask(2);

    #[inline]
    pub fn contains(self, other: Mask) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `self` without the bits of `other`.
    #[inline]
    pub fn remove(self, other: Mask) -> Mask {
        Mask(self.0 & !other.0)
    }

    /// The equivalent mio interest; `None` for an empty mask.
    pub fn to_interest(self) -> Option<Interest> {
        match (self.contains(Mask::READABLE), self.contains(Mask::WRITABLE)) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

impl BitOr for Mask {
    type Output = Mask;

    fn bitor(self, rhs: Mask) -> Mask {
        Mask(self.0 | rhs.0)
    }
}

/// Errors raised by the reactor.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// The descriptor does not fit in the slot array.
    #[error("descriptor {fd} is beyond the reactor capacity of {capacity}")]
    OutOfRange { fd: RawFd, capacity: usize },

    #[error("no timer with id {0}")]
    NoSuchTimer(TimerId),

    /// Polling or (de)registration failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_ops() {
        let both = Mask::READABLE | Mask::WRITABLE;
        assert!(both.contains(Mask::READABLE));
        assert!(both.contains(Mask::WRITABLE));
        assert!(!Mask::READABLE.contains(Mask::WRITABLE));
        assert!(!both.contains(Mask::NONE));

        assert_eq!(both.remove(Mask::WRITABLE), Mask::READABLE);
        assert!(both.remove(both).is_empty());
        assert!(Mask::NONE.to_interest().is_none());
        assert_eq!(Mask::WRITABLE.to_interest(), Some(Interest::WRITABLE));
    }
}
