//! Scheduler module
//!
//! Strict priority preemptive scheduler. The running task is never on the
//! ready list; the ready list holds every other runnable task ordered by
//! effective priority, FIFO among equals. A running task is only displaced
//! by a task of strictly higher priority.

mod timer_list;

pub(crate) use timer_list::{TimerList, TimerTarget};

use crate::config::InheritUnwind;
use crate::error::{OsError, OsResult};
use crate::fatal::{os_fatal, FatalError};
use crate::kernel::{with_kernel, Kernel};
use crate::task::list::{RdyLink, TaskList};
use crate::task::TaskContext;
use crate::types::{
    OsPendOn, OsPendStatus, OsTaskState, OsTick, TaskId, OS_TIMEOUT_NEVER,
};

pub(crate) type ReadyList = TaskList<RdyLink>;

/// Longest finite timeout; tick comparisons are only valid within half the
/// counter range.
pub(crate) const MAX_TIMEOUT: OsTick = i32::MAX as OsTick;

impl Kernel {
    /// Dispatch the first task
    ///
    /// # Returns
    /// * `Ok(TaskId)` - The task that now runs
    /// * `Err(OsError::OsNotInit)` - Kernel not initialized
    /// * `Err(OsError::OsRunning)` - Already started
    pub fn start(&mut self) -> OsResult<TaskId> {
        if !self.initialized {
            return Err(OsError::OsNotInit);
        }
        if self.started {
            return Err(OsError::OsRunning);
        }

        self.started = true;
        let first = self
            .rdy
            .pop_front(&mut self.tasks)
            .unwrap_or_else(|| os_fatal(FatalError::NoReadyTask));
        self.set_running(first);

        crate::info!("scheduler started, first task {}", first);
        Ok(first)
    }

    /// The task currently owning the CPU
    #[inline]
    pub fn current_task(&self) -> Option<TaskId> {
        self.current
    }

    pub(crate) fn cur_or_err(&self) -> OsResult<TaskId> {
        if !self.started {
            return Err(OsError::OsNotRunning);
        }
        self.current.ok_or(OsError::OsNotRunning)
    }

    /// Ready tasks in dispatch order, the running task excluded
    pub fn ready_tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.rdy.iter(&self.tasks)
    }

    /// Scheduling point
    ///
    /// Picks the task that should run and requests a context switch if it is
    /// not the current one. In interrupt context the decision is deferred
    /// to the outermost [`isr_exit`](Self::isr_exit).
    ///
    /// Returns the task switched to, if any.
    pub fn schedule(&mut self) -> Option<TaskId> {
        if !self.started {
            return None;
        }
        if self.int_nesting > 0 {
            self.switch_pending = true;
            return None;
        }
        self.switch_pending = false;

        let cur = self.current;
        if let Some(c) = cur {
            if self.tasks[c.index()].state == OsTaskState::Running {
                let c_prio = self.tasks[c.index()].prio;
                match self.rdy.head() {
                    Some(h) if self.tasks[h.index()].prio < c_prio => {
                        // Preempted: first in line among its peers
                        self.tasks[c.index()].state = OsTaskState::Ready;
                        self.rdy.insert_ahead_of_equals(c, &mut self.tasks);
                    }
                    _ => return None,
                }
            }
        }

        let next = self
            .rdy
            .pop_front(&mut self.tasks)
            .unwrap_or_else(|| os_fatal(FatalError::NoReadyTask));

        self.set_running(next);
        if cur == Some(next) {
            return None;
        }

        crate::trace!("switch {} -> {}", cur, next);

        let to = &mut self.tasks[next.index()].ctx as *mut TaskContext;
        crate::port::os_ctx_sw(to);
        Some(next)
    }

    fn set_running(&mut self, id: TaskId) {
        let tcb = &mut self.tasks[id.index()];
        tcb.state = OsTaskState::Running;
        tcb.ctx_sw_ctr = tcb.ctx_sw_ctr.wrapping_add(1);
        self.current = Some(id);
        self.ctx_sw_ctr = self.ctx_sw_ctr.wrapping_add(1);
    }

    pub(crate) fn deadline_after(&self, timeout: OsTick) -> Option<OsTick> {
        if timeout == OS_TIMEOUT_NEVER {
            None
        } else {
            Some(self.now.wrapping_add(timeout.min(MAX_TIMEOUT)))
        }
    }

    /// Take the running task off the CPU without choosing a successor.
    ///
    /// The caller links the task onto the object's wait list (if any) and
    /// calls [`schedule`](Self::schedule) once any priority changes caused by
    /// the wait are applied.
    pub(crate) fn park_current(&mut self, state: OsTaskState, pend_on: OsPendOn, timeout: OsTick) {
        let Some(cur) = self.current else {
            os_fatal(FatalError::NoReadyTask);
        };
        let deadline = self.deadline_after(timeout);

        let tcb = &mut self.tasks[cur.index()];
        tcb.state = state;
        tcb.pend_on = pend_on;
        tcb.pend_status = OsPendStatus::Pending;
        tcb.deadline = deadline;
        tcb.delivered = None;

        if let Some(deadline) = deadline {
            self.timers.insert(deadline, TimerTarget::Task(cur));
        }
    }

    pub(crate) fn block_current(&mut self, state: OsTaskState, pend_on: OsPendOn, timeout: OsTick) {
        self.park_current(state, pend_on, timeout);
        self.schedule();
    }

    /// Move a blocked task to the ready list with the given outcome.
    ///
    /// Unlinks it from its wait list and the timeout list. Does not
    /// reschedule.
    pub(crate) fn make_ready(&mut self, id: TaskId, status: OsPendStatus) {
        let pend_on = self.tasks[id.index()].pend_on;
        match pend_on {
            OsPendOn::Nothing => {}
            OsPendOn::Mutex(m) => self.mutexes[m.index()].wait.remove(id, &mut self.tasks),
            OsPendOn::Semaphore(s) => self.sems[s.index()].wait.remove(id, &mut self.tasks),
            OsPendOn::Queues(set) => {
                for q in set.iter() {
                    let evq = &mut self.evqs[q.index()];
                    if evq.waiter == Some(id) {
                        evq.waiter = None;
                    }
                }
            }
        }

        let tcb = &mut self.tasks[id.index()];
        if tcb.deadline.take().is_some() {
            self.timers.remove(TimerTarget::Task(id));
        }
        tcb.pend_on = OsPendOn::Nothing;
        tcb.pend_status = status;
        tcb.state = OsTaskState::Ready;

        self.rdy.insert_by_prio(id, &mut self.tasks);
    }

    /// Make a blocked task ready before its wait is satisfied
    ///
    /// A sleeper wakes with success. A task pending on a mutex, a semaphore
    /// or event queues was granted nothing and sees `Timeout`. Waking a task
    /// that is not blocked is fatal.
    pub fn wakeup(&mut self, id: TaskId) {
        let tcb = self
            .tasks
            .get(id.index())
            .unwrap_or_else(|| os_fatal(FatalError::BadTask(id)));
        if !tcb.is_blocked() {
            os_fatal(FatalError::TaskNotBlocked(id));
        }

        let status = match tcb.pend_on {
            OsPendOn::Nothing => OsPendStatus::Ok,
            _ => OsPendStatus::Timeout,
        };
        self.abort_wait(id, status);
        self.schedule();
    }

    /// End a wait early and undo what the wait caused
    ///
    /// A mutex waiter leaving the wait list retracts its boost on the owner
    /// under [`InheritUnwind::OnTimeout`]. Does not reschedule.
    pub(crate) fn abort_wait(&mut self, id: TaskId, status: OsPendStatus) {
        let pend_on = self.tasks[id.index()].pend_on;
        self.make_ready(id, status);

        if let OsPendOn::Mutex(m) = pend_on {
            if self.cfg.inherit_unwind == InheritUnwind::OnTimeout {
                if let Some(owner) = self.mutexes[m.index()].owner {
                    self.refresh_prio(owner);
                }
            }
        }
    }

    /// Re-position a task after its effective priority changed
    ///
    /// Applies to whichever ordered list the task is on: the ready list or
    /// the wait list of the mutex or semaphore it pends on.
    pub fn resort(&mut self, id: TaskId) {
        let tcb = &self.tasks[id.index()];
        match (tcb.state, tcb.pend_on) {
            (OsTaskState::Ready, _) => {
                self.rdy.remove(id, &mut self.tasks);
                self.rdy.insert_by_prio(id, &mut self.tasks);
            }
            (OsTaskState::PendMutex, OsPendOn::Mutex(m)) => {
                let wait = &mut self.mutexes[m.index()].wait;
                wait.remove(id, &mut self.tasks);
                wait.insert_by_prio(id, &mut self.tasks);
            }
            (OsTaskState::PendSem, OsPendOn::Semaphore(s)) => {
                let wait = &mut self.sems[s.index()].wait;
                wait.remove(id, &mut self.tasks);
                wait.insert_by_prio(id, &mut self.tasks);
            }
            _ => {}
        }
    }
}

/// Current task of the global kernel
pub fn os_sched_current() -> Option<TaskId> {
    with_kernel(|k| k.current_task())
}

/// Wake a blocked task of the global kernel
pub fn os_sched_wakeup(id: TaskId) {
    with_kernel(|k| k.wakeup(id))
}
