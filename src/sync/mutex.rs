//! Mutex implementation with priority inheritance
//!
//! Mutexes provide mutual exclusion with automatic priority boosting
//! to prevent priority inversion. A mutex may be taken again by its owner;
//! it is released when every acquire has been matched by a release.
//!
//! The effective priority of a task is the best of its base priority and
//! the priorities of the top waiters on every mutex it holds. Boosts travel
//! along chains of owners blocked on further mutexes.

use crate::config::CFG_TASK_MAX;
use crate::error::{OsError, OsResult};
use crate::fatal::{os_fatal, FatalError};
use crate::kernel::{block_on, with_kernel, Kernel};
use crate::sync::WaitList;
use crate::types::{
    MutexId, OsNestingCtr, OsPendOn, OsPendStatus, OsPrio, OsTaskState, OsTick, Pend, TaskId,
    OS_NO_WAIT,
};

/// Mutex with priority inheritance
pub struct OsMutex {
    /// Task that owns the mutex
    pub(crate) owner: Option<TaskId>,
    /// Nesting counter
    pub(crate) level: OsNestingCtr,
    /// Owner priority when it took the mutex
    pub(crate) saved_prio: OsPrio,
    /// List of tasks waiting on this mutex
    pub(crate) wait: WaitList,
}

impl OsMutex {
    const fn new() -> Self {
        OsMutex {
            owner: None,
            level: 0,
            saved_prio: 0,
            wait: WaitList::new(),
        }
    }
}

/// Snapshot of a mutex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexInfo {
    pub owner: Option<TaskId>,
    pub level: OsNestingCtr,
    pub saved_prio: OsPrio,
    pub waiters: usize,
    pub top_waiter: Option<TaskId>,
}

impl Kernel {
    #[inline]
    fn check_mutex(&self, mutex: MutexId) -> OsResult<usize> {
        if mutex.index() < self.mutexes.len() {
            Ok(mutex.index())
        } else {
            Err(OsError::ObjInvalid)
        }
    }

    /// Create an unowned mutex
    pub fn mutex_create(&mut self) -> OsResult<MutexId> {
        let id = MutexId(self.mutexes.len() as u8);
        self.mutexes
            .push(OsMutex::new())
            .map_err(|_| OsError::ObjNoMore)?;
        Ok(id)
    }

    /// Acquire the mutex
    ///
    /// If the mutex is owned by a lower-priority task, the owner's priority
    /// is temporarily boosted to prevent priority inversion.
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait (0 = do not wait)
    ///
    /// # Returns
    /// * `Ok(Pend::Ready(()))` - Acquired, or nesting level raised
    /// * `Ok(Pend::Blocked)` - The caller waits for the owner
    /// * `Err(OsError::Timeout)` - Held by another task and `timeout` is 0
    /// * `Err(OsError::MutexOvf)` - Nesting counter overflow
    pub fn mutex_pend(&mut self, mutex: MutexId, timeout: OsTick) -> OsResult<Pend<()>> {
        if self.int_nesting > 0 {
            os_fatal(FatalError::BlockingInIsr);
        }
        let i = self.check_mutex(mutex)?;
        let cur = self.cur_or_err()?;

        let owner = self.mutexes[i].owner;
        match owner {
            None => {
                let prio = self.tasks[cur.index()].prio;
                let m = &mut self.mutexes[i];
                m.owner = Some(cur);
                m.level = 1;
                m.saved_prio = prio;
                self.tasks[cur.index()].lock_count += 1;
                Ok(Pend::Ready(()))
            }
            Some(owner) if owner == cur => {
                let m = &mut self.mutexes[i];
                m.level = m.level.checked_add(1).ok_or(OsError::MutexOvf)?;
                Ok(Pend::Ready(()))
            }
            Some(owner) => {
                if timeout == OS_NO_WAIT {
                    return Err(OsError::Timeout);
                }

                self.mutexes[i].wait.insert_by_prio(cur, &mut self.tasks);
                self.park_current(OsTaskState::PendMutex, OsPendOn::Mutex(mutex), timeout);

                crate::trace!("task {} waits on mutex {} held by {}", cur, mutex, owner);
                self.refresh_prio(owner);
                self.schedule();
                Ok(Pend::Blocked)
            }
        }
    }

    /// Release the mutex
    ///
    /// When the last nesting level is released the highest priority waiter
    /// becomes the owner and the releaser drops to the priority its
    /// remaining mutexes justify.
    ///
    /// # Returns
    /// * `Ok(())` - Released
    /// * `Err(OsError::MutexNotOwner)` - Caller does not hold the mutex
    pub fn mutex_release(&mut self, mutex: MutexId) -> OsResult<()> {
        let i = self.check_mutex(mutex)?;
        if self.int_nesting > 0 {
            return Err(OsError::MutexNotOwner);
        }
        let cur = self.cur_or_err()?;

        let m = &mut self.mutexes[i];
        if m.level == 0 || m.owner != Some(cur) {
            return Err(OsError::MutexNotOwner);
        }

        m.level -= 1;
        if m.level > 0 {
            return Ok(());
        }

        m.owner = None;
        let next = m.wait.head();
        self.tasks[cur.index()].lock_count -= 1;

        if let Some(waiter) = next {
            self.make_ready(waiter, OsPendStatus::Ok);

            let prio = self.tasks[waiter.index()].prio;
            let m = &mut self.mutexes[i];
            m.owner = Some(waiter);
            m.level = 1;
            m.saved_prio = prio;
            self.tasks[waiter.index()].lock_count += 1;

            // Remaining waiters now boost the new owner
            self.refresh_prio(waiter);
        }

        self.refresh_prio(cur);
        self.schedule();
        Ok(())
    }

    /// Snapshot of a mutex
    pub fn mutex_info(&self, mutex: MutexId) -> OsResult<MutexInfo> {
        let m = &self.mutexes[self.check_mutex(mutex)?];
        Ok(MutexInfo {
            owner: m.owner,
            level: m.level,
            saved_prio: m.saved_prio,
            waiters: m.wait.len(),
            top_waiter: m.wait.head(),
        })
    }

    /// Priority `task` is entitled to: its base priority, raised to the top
    /// waiter of every mutex it holds.
    fn inherited_prio(&self, task: TaskId) -> OsPrio {
        let base = self.tasks[task.index()].base_prio;
        if self.tasks[task.index()].lock_count == 0 {
            return base;
        }

        self.mutexes
            .iter()
            .filter(|m| m.owner == Some(task))
            .filter_map(|m| m.wait.head())
            .map(|w| self.tasks[w.index()].prio)
            .fold(base, OsPrio::min)
    }

    /// Recompute the effective priority of `task` and of every owner down
    /// the chain of mutexes it is blocked on.
    pub(crate) fn refresh_prio(&mut self, task: TaskId) {
        let mut id = task;

        // A chain cannot be longer than the task table
        for _ in 0..CFG_TASK_MAX {
            let prio = self.inherited_prio(id);
            if self.tasks[id.index()].prio == prio {
                return;
            }

            crate::debug!(
                "task {} prio {} -> {}",
                id,
                self.tasks[id.index()].prio,
                prio
            );
            self.tasks[id.index()].prio = prio;
            self.resort(id);

            match self.tasks[id.index()].pend_on {
                OsPendOn::Mutex(m) => match self.mutexes[m.index()].owner {
                    Some(owner) => id = owner,
                    None => return,
                },
                _ => return,
            }
        }
    }
}

// ============ Safe Wrapper ============

/// Mutex of the global kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutex {
    id: MutexId,
}

impl Mutex {
    pub fn create() -> OsResult<Self> {
        with_kernel(|k| k.mutex_create()).map(|id| Mutex { id })
    }

    #[inline]
    pub fn id(&self) -> MutexId {
        self.id
    }

    pub fn lock(&self, timeout: OsTick) -> OsResult<()> {
        block_on(
            timeout,
            |k| k.mutex_pend(self.id, timeout),
            |k, me| k.pend_result(me),
        )
    }

    pub fn unlock(&self) -> OsResult<()> {
        with_kernel(|k| k.mutex_release(self.id))
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        with_kernel(|k| k.mutex_info(self.id))
            .map(|info| info.owner.is_some())
            .unwrap_or(false)
    }
}
