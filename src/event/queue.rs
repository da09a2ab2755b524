//! Event queue
//!
//! Posting to a queue with a blocked consumer hands the event straight to
//! that consumer; the queue itself never sees it.

use heapless::Deque;

use crate::config::CFG_EVQ_DEPTH;
use crate::error::{OsError, OsResult};
use crate::event::{CalloutState, Event};
use crate::fatal::{os_fatal, FatalError};
use crate::kernel::{block_on, with_kernel, Kernel};
use crate::types::{EvqId, EvqSet, OsPendOn, OsPendStatus, OsTaskState, OsTick, Pend, TaskId, OS_NO_WAIT};

pub struct OsEventQueue {
    pub(crate) events: Deque<Event, CFG_EVQ_DEPTH>,
    /// Task blocked in get or poll on this queue
    pub(crate) waiter: Option<TaskId>,
}

impl OsEventQueue {
    const fn new() -> Self {
        OsEventQueue {
            events: Deque::new(),
            waiter: None,
        }
    }
}

impl Kernel {
    #[inline]
    pub(crate) fn check_evq(&self, evq: EvqId) -> OsResult<usize> {
        if evq.index() < self.evqs.len() {
            Ok(evq.index())
        } else {
            Err(OsError::ObjInvalid)
        }
    }

    /// Create an empty event queue
    pub fn evq_create(&mut self) -> OsResult<EvqId> {
        let id = EvqId(self.evqs.len() as u8);
        self.evqs
            .push(OsEventQueue::new())
            .map_err(|_| OsError::ObjNoMore)?;
        Ok(id)
    }

    /// The queue created at init for general use
    #[inline]
    pub fn evq_dflt(&self) -> Option<EvqId> {
        self.dflt_evq
    }

    /// An event left its queue
    fn event_consumed(&mut self, ev: Event) {
        if let Event::Callout(c) = ev {
            if let Some(callout) = self.callouts.get_mut(c.index()) {
                if callout.state == CalloutState::Posted {
                    callout.state = CalloutState::Idle;
                }
            }
        }
    }

    fn evq_pop(&mut self, i: usize) -> Option<Event> {
        let ev = self.evqs[i].events.pop_front()?;
        self.event_consumed(ev);
        Some(ev)
    }

    /// Post an event
    ///
    /// Callable from interrupt context.
    ///
    /// # Returns
    /// * `Ok(())` - Delivered to the waiting consumer or queued
    /// * `Err(OsError::QFull)` - No consumer waiting and the queue is full
    pub fn evq_put(&mut self, evq: EvqId, ev: Event) -> OsResult<()> {
        let i = self.check_evq(evq)?;

        if let Some(waiter) = self.evqs[i].waiter {
            self.make_ready(waiter, OsPendStatus::Ok);
            self.tasks[waiter.index()].delivered = Some((evq, ev));
            self.event_consumed(ev);
            self.schedule();
            return Ok(());
        }

        self.evqs[i].events.push_back(ev).map_err(|_| OsError::QFull)
    }

    /// Take the next event, waiting up to `timeout` ticks for one
    ///
    /// # Returns
    /// * `Ok(Pend::Ready(event))` - An event was queued
    /// * `Ok(Pend::Blocked)` - The caller waits; the event is collected
    ///   with [`take_delivered`](Self::take_delivered)
    /// * `Err(OsError::Timeout)` - Queue empty and `timeout` is 0
    /// * `Err(OsError::EvqBusy)` - Another task already waits on the queue
    pub fn evq_get(&mut self, evq: EvqId, timeout: OsTick) -> OsResult<Pend<Event>> {
        self.evq_poll(&[evq], timeout)
            .map(|p| match p {
                Pend::Ready((_, ev)) => Pend::Ready(ev),
                Pend::Blocked => Pend::Blocked,
            })
    }

    /// Take the next event if there is one
    pub fn evq_get_no_wait(&mut self, evq: EvqId) -> OsResult<Option<Event>> {
        let i = self.check_evq(evq)?;
        Ok(self.evq_pop(i))
    }

    /// Wait on several queues at once
    ///
    /// Queues are checked in the order given; the first non-empty one
    /// supplies the event. Otherwise the caller blocks until any of them
    /// receives a post or the timeout elapses.
    pub fn evq_poll(&mut self, queues: &[EvqId], timeout: OsTick) -> OsResult<Pend<(EvqId, Event)>> {
        if self.int_nesting > 0 && timeout != OS_NO_WAIT {
            os_fatal(FatalError::BlockingInIsr);
        }

        let mut set = EvqSet::EMPTY;
        for &q in queues {
            self.check_evq(q)?;
            set = set.with(q);
        }

        for &q in queues {
            if let Some(ev) = self.evq_pop(q.index()) {
                return Ok(Pend::Ready((q, ev)));
            }
        }

        if timeout == OS_NO_WAIT || set.is_empty() {
            return Err(OsError::Timeout);
        }

        let cur = self.cur_or_err()?;
        if set
            .iter()
            .any(|q| matches!(self.evqs[q.index()].waiter, Some(w) if w != cur))
        {
            return Err(OsError::EvqBusy);
        }

        for q in set.iter() {
            self.evqs[q.index()].waiter = Some(cur);
        }
        self.block_current(OsTaskState::PendEvent, OsPendOn::Queues(set), timeout);
        Ok(Pend::Blocked)
    }

    /// Withdraw the first queued copy of `ev`
    ///
    /// Returns whether an event was removed.
    pub fn evq_remove(&mut self, evq: EvqId, ev: Event) -> OsResult<bool> {
        let i = self.check_evq(evq)?;

        let events = &mut self.evqs[i].events;
        let mut found = false;
        for _ in 0..events.len() {
            if let Some(e) = events.pop_front() {
                if !found && e == ev {
                    found = true;
                    continue;
                }
                // A slot was just freed
                let pushed = events.push_back(e);
                debug_assert!(pushed.is_ok());
            }
        }

        if found {
            self.event_consumed(ev);
        }
        Ok(found)
    }

    /// Number of queued events
    pub fn evq_len(&self, evq: EvqId) -> OsResult<usize> {
        self.check_evq(evq).map(|i| self.evqs[i].events.len())
    }
}

// ============ Safe Wrapper ============

/// Event queue of the global kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQueue {
    id: EvqId,
}

impl EventQueue {
    pub fn create() -> OsResult<Self> {
        with_kernel(|k| k.evq_create()).map(|id| EventQueue { id })
    }

    /// The default queue
    pub fn dflt() -> OsResult<Self> {
        with_kernel(|k| k.evq_dflt())
            .map(|id| EventQueue { id })
            .ok_or(OsError::OsNotInit)
    }

    #[inline]
    pub fn id(&self) -> EvqId {
        self.id
    }

    pub fn put(&self, ev: Event) -> OsResult<()> {
        with_kernel(|k| k.evq_put(self.id, ev))
    }

    pub fn get(&self, timeout: OsTick) -> OsResult<Event> {
        poll(&[self.id], timeout).map(|(_, ev)| ev)
    }

    pub fn get_no_wait(&self) -> OsResult<Option<Event>> {
        with_kernel(|k| k.evq_get_no_wait(self.id))
    }

    pub fn remove(&self, ev: Event) -> OsResult<bool> {
        with_kernel(|k| k.evq_remove(self.id, ev))
    }

    pub fn len(&self) -> usize {
        with_kernel(|k| k.evq_len(self.id)).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the next event and hand it to `handler`
    pub fn run(&self, handler: impl FnOnce(Event)) -> OsResult<()> {
        let ev = self.get(crate::types::OS_TIMEOUT_NEVER)?;
        handler(ev);
        Ok(())
    }
}

/// Wait on several queues of the global kernel
pub fn poll(queues: &[EvqId], timeout: OsTick) -> OsResult<(EvqId, Event)> {
    block_on(
        timeout,
        |k| k.evq_poll(queues, timeout),
        |k, me| {
            k.pend_result(me)?;
            k.take_delivered(me).ok_or(OsError::PendWouldBlock)
        },
    )
}
