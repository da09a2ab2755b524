//! Callouts
//!
//! One-shot software timers. An armed callout sits on the kernel timeout
//! list; when its deadline passes the tick handler posts
//! [`Event::Callout`] to the callout's queue.

use crate::error::{OsError, OsResult};
use crate::event::Event;
use crate::kernel::{with_kernel, Kernel};
use crate::sched::{TimerTarget, MAX_TIMEOUT};
use crate::types::{tick_lt, CalloutId, EvqId, OsTick};

/// Life cycle of a callout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalloutState {
    /// Not armed, no event outstanding
    Idle,
    /// Waiting for its deadline
    Armed(OsTick),
    /// Event sits in the target queue
    Posted,
}

pub struct OsCallout {
    pub(crate) evq: EvqId,
    pub(crate) state: CalloutState,
}

impl Kernel {
    #[inline]
    fn check_callout(&self, c: CalloutId) -> OsResult<usize> {
        if c.index() < self.callouts.len() {
            Ok(c.index())
        } else {
            Err(OsError::ObjInvalid)
        }
    }

    /// Create an idle callout that posts to `evq`
    pub fn callout_create(&mut self, evq: EvqId) -> OsResult<CalloutId> {
        self.check_evq(evq)?;

        let id = CalloutId(self.callouts.len() as u8);
        self.callouts
            .push(OsCallout {
                evq,
                state: CalloutState::Idle,
            })
            .map_err(|_| OsError::ObjNoMore)?;
        Ok(id)
    }

    /// Arm the callout to fire `ticks` ticks from now
    ///
    /// A pending deadline or an unconsumed event from an earlier arming is
    /// withdrawn first.
    ///
    /// # Returns
    /// * `Ok(())` - Armed
    /// * `Err(OsError::TmrInvalidDly)` - `ticks` exceeds the comparable range
    pub fn callout_reset(&mut self, c: CalloutId, ticks: OsTick) -> OsResult<()> {
        self.check_callout(c)?;
        if ticks > MAX_TIMEOUT {
            return Err(OsError::TmrInvalidDly);
        }

        self.callout_stop(c)?;

        let deadline = self.now.wrapping_add(ticks);
        self.timers.insert(deadline, TimerTarget::Callout(c));
        self.callouts[c.index()].state = CalloutState::Armed(deadline);
        Ok(())
    }

    /// Disarm the callout
    ///
    /// Also withdraws its event if it was posted but not yet consumed.
    pub fn callout_stop(&mut self, c: CalloutId) -> OsResult<()> {
        let i = self.check_callout(c)?;

        match self.callouts[i].state {
            CalloutState::Idle => {}
            CalloutState::Armed(_) => {
                self.timers.remove(TimerTarget::Callout(c));
            }
            CalloutState::Posted => {
                let evq = self.callouts[i].evq;
                self.evq_remove(evq, Event::Callout(c))?;
            }
        }

        self.callouts[i].state = CalloutState::Idle;
        Ok(())
    }

    pub fn callout_state(&self, c: CalloutId) -> OsResult<CalloutState> {
        self.check_callout(c).map(|i| self.callouts[i].state)
    }

    /// Whether the callout waits for its deadline
    pub fn callout_is_armed(&self, c: CalloutId) -> OsResult<bool> {
        self.callout_state(c)
            .map(|s| matches!(s, CalloutState::Armed(_)))
    }

    /// Ticks left until the callout fires, `None` if it is not armed
    pub fn callout_remaining_ticks(&self, c: CalloutId) -> OsResult<Option<OsTick>> {
        Ok(match self.callout_state(c)? {
            CalloutState::Armed(deadline) if tick_lt(self.now, deadline) => {
                Some(deadline.wrapping_sub(self.now))
            }
            CalloutState::Armed(_) => Some(0),
            _ => None,
        })
    }

    /// Deadline reached: post the event
    ///
    /// If the queue is full the callout stays armed and tries again on the
    /// next tick.
    pub(crate) fn fire_callout(&mut self, c: CalloutId) {
        let i = c.index();
        let evq = self.callouts[i].evq;

        self.callouts[i].state = CalloutState::Posted;
        match self.evq_put(evq, Event::Callout(c)) {
            Ok(()) => crate::trace!("callout {} posted to {}", c, evq),
            Err(_) => {
                crate::warn!("callout {}: queue {} full, retrying", c, evq);
                self.timers.insert(self.now, TimerTarget::Callout(c));
                self.callouts[i].state = CalloutState::Armed(self.now);
            }
        }
    }
}

// ============ Safe Wrapper ============

/// Callout of the global kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Callout {
    id: CalloutId,
}

impl Callout {
    pub fn create(evq: EvqId) -> OsResult<Self> {
        with_kernel(|k| k.callout_create(evq)).map(|id| Callout { id })
    }

    #[inline]
    pub fn id(&self) -> CalloutId {
        self.id
    }

    pub fn reset(&self, ticks: OsTick) -> OsResult<()> {
        with_kernel(|k| k.callout_reset(self.id, ticks))
    }

    pub fn stop(&self) -> OsResult<()> {
        with_kernel(|k| k.callout_stop(self.id))
    }

    pub fn is_armed(&self) -> bool {
        with_kernel(|k| k.callout_is_armed(self.id)).unwrap_or(false)
    }

    pub fn remaining_ticks(&self) -> Option<OsTick> {
        with_kernel(|k| k.callout_remaining_ticks(self.id)).ok().flatten()
    }
}
