//! Timeout list
//!
//! One sorted list holds the deadlines of sleeping and pending tasks and of
//! armed callouts. Entries are kept in wrapping tick order, earliest first,
//! and entries with equal deadlines stay in insertion order.

use heapless::Vec;

use crate::config::CFG_TIMER_MAX;
use crate::fatal::{os_fatal, FatalError};
use crate::types::{tick_leq, tick_lt, CalloutId, OsTick, TaskId};

/// What an expired deadline refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerTarget {
    Task(TaskId),
    Callout(CalloutId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerEntry {
    pub(crate) deadline: OsTick,
    pub(crate) target: TimerTarget,
}

pub(crate) struct TimerList {
    entries: Vec<TimerEntry, CFG_TIMER_MAX>,
}

impl TimerList {
    pub(crate) const fn new() -> Self {
        TimerList { entries: Vec::new() }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn insert(&mut self, deadline: OsTick, target: TimerTarget) {
        let at = self
            .entries
            .iter()
            .position(|e| tick_lt(deadline, e.deadline))
            .unwrap_or(self.entries.len());

        // Capacity covers one entry per task and per callout
        if self.entries.insert(at, TimerEntry { deadline, target }).is_err() {
            os_fatal(FatalError::ListCorrupt);
        }
    }

    /// Drop the entry for `target`. Returns false if it had none.
    pub(crate) fn remove(&mut self, target: TimerTarget) -> bool {
        match self.entries.iter().position(|e| e.target == target) {
            Some(at) => {
                self.entries.remove(at);
                true
            }
            None => false,
        }
    }

    /// Take the earliest entry if its deadline is at or before `now`
    pub(crate) fn pop_expired(&mut self, now: OsTick) -> Option<TimerEntry> {
        match self.entries.first() {
            Some(e) if tick_leq(e.deadline, now) => Some(self.entries.remove(0)),
            _ => None,
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<OsTick> {
        self.entries.first().map(|e| e.deadline)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
