//! Semaphore implementation
//!
//! Counting semaphores for task synchronization and resource counting.

use crate::error::{OsError, OsResult};
use crate::fatal::{os_fatal, FatalError};
use crate::kernel::{block_on, with_kernel, Kernel};
use crate::sync::WaitList;
use crate::types::{OsPendOn, OsPendStatus, OsSemCtr, OsTaskState, OsTick, Pend, SemId, OS_NO_WAIT};

/// Counting semaphore
pub struct OsSem {
    /// Current count
    pub(crate) count: OsSemCtr,
    /// List of tasks waiting on this semaphore
    pub(crate) wait: WaitList,
}

impl OsSem {
    const fn new(count: OsSemCtr) -> Self {
        OsSem {
            count,
            wait: WaitList::new(),
        }
    }
}

impl Kernel {
    #[inline]
    fn check_sem(&self, sem: SemId) -> OsResult<usize> {
        if sem.index() < self.sems.len() {
            Ok(sem.index())
        } else {
            Err(OsError::ObjInvalid)
        }
    }

    /// Create a semaphore holding `count` tokens
    pub fn sem_create(&mut self, count: OsSemCtr) -> OsResult<SemId> {
        let id = SemId(self.sems.len() as u8);
        self.sems
            .push(OsSem::new(count))
            .map_err(|_| OsError::ObjNoMore)?;
        Ok(id)
    }

    /// Take a token
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait (0 = do not wait)
    ///
    /// # Returns
    /// * `Ok(Pend::Ready(()))` - Token taken without waiting
    /// * `Ok(Pend::Blocked)` - The caller waits for a release
    /// * `Err(OsError::Timeout)` - No token and `timeout` is 0
    pub fn sem_pend(&mut self, sem: SemId, timeout: OsTick) -> OsResult<Pend<()>> {
        if self.int_nesting > 0 && timeout != OS_NO_WAIT {
            os_fatal(FatalError::BlockingInIsr);
        }
        let i = self.check_sem(sem)?;

        let s = &mut self.sems[i];
        if s.count > 0 {
            s.count -= 1;
            return Ok(Pend::Ready(()));
        }

        if timeout == OS_NO_WAIT {
            return Err(OsError::Timeout);
        }

        let cur = self.cur_or_err()?;
        self.sems[i].wait.insert_by_prio(cur, &mut self.tasks);
        self.block_current(OsTaskState::PendSem, OsPendOn::Semaphore(sem), timeout);
        Ok(Pend::Blocked)
    }

    /// Give a token back
    ///
    /// The highest priority waiter receives it directly; without waiters the
    /// count goes up. Callable from interrupt context.
    ///
    /// # Returns
    /// * `Ok(())` - Token released
    /// * `Err(OsError::SemOvf)` - Counter overflow
    pub fn sem_release(&mut self, sem: SemId) -> OsResult<()> {
        let i = self.check_sem(sem)?;

        match self.sems[i].wait.head() {
            Some(waiter) => {
                debug_assert_eq!(self.sems[i].count, 0);
                self.make_ready(waiter, OsPendStatus::Ok);
                self.schedule();
            }
            None => {
                let s = &mut self.sems[i];
                s.count = s.count.checked_add(1).ok_or(OsError::SemOvf)?;
            }
        }

        Ok(())
    }

    /// Get current semaphore count
    pub fn sem_count(&self, sem: SemId) -> OsResult<OsSemCtr> {
        self.check_sem(sem).map(|i| self.sems[i].count)
    }

    /// Number of tasks waiting
    pub fn sem_waiters(&self, sem: SemId) -> OsResult<usize> {
        self.check_sem(sem).map(|i| self.sems[i].wait.len())
    }
}

// ============ Safe Wrapper ============

/// Semaphore of the global kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Semaphore {
    id: SemId,
}

impl Semaphore {
    pub fn create(count: OsSemCtr) -> OsResult<Self> {
        with_kernel(|k| k.sem_create(count)).map(|id| Semaphore { id })
    }

    #[inline]
    pub fn id(&self) -> SemId {
        self.id
    }

    pub fn wait(&self, timeout: OsTick) -> OsResult<()> {
        block_on(
            timeout,
            |k| k.sem_pend(self.id, timeout),
            |k, me| k.pend_result(me),
        )
    }

    pub fn signal(&self) -> OsResult<()> {
        with_kernel(|k| k.sem_release(self.id))
    }

    #[inline]
    pub fn count(&self) -> OsSemCtr {
        with_kernel(|k| k.sem_count(self.id)).unwrap_or(0)
    }
}
