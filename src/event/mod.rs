//! Event queues and callouts
//!
//! An event queue is a bounded FIFO of [`Event`]s with at most one blocked
//! consumer. A callout is a one-shot software timer that posts its event to
//! a queue when it expires; the tick handler does the posting.

mod callout;
mod queue;

pub use callout::{Callout, CalloutState, OsCallout};
pub use queue::{poll, EventQueue, OsEventQueue};

use crate::types::CalloutId;

/// Item carried by an event queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Posted by an expired callout
    Callout(CalloutId),
    /// Posted by application code
    Message { tag: u16, arg: usize },
}

impl Event {
    #[inline]
    pub const fn message(tag: u16, arg: usize) -> Self {
        Event::Message { tag, arg }
    }
}
