//! Task management module
//!
//! Provides task creation and introspection.

mod tcb;
pub(crate) mod list;

pub use tcb::{OsTcb, TaskContext, TaskInfo};

use crate::config::{CFG_PRIO_MAX, CFG_STK_SIZE_MIN};
use crate::critical::is_isr_context;
use crate::error::{OsError, OsResult};
use crate::kernel::{with_kernel, Kernel};
use crate::types::{OsPrio, OsStkElement, TaskId};

/// Task entry point function type
pub type OsTaskFn = fn(usize) -> !;

impl Kernel {
    /// Register a task and make it ready
    ///
    /// Base priorities are unique; 0 is the highest. If the scheduler is
    /// running and the new task outranks the caller, it is dispatched
    /// immediately.
    ///
    /// # Returns
    /// * `Ok(TaskId)` - Handle of the new task
    /// * `Err(OsError::TaskCreateIsr)` - Called from interrupt context
    /// * `Err(OsError::OsNotInit)` - Kernel not initialized
    /// * `Err(OsError::PrioInvalid)` - Priority out of range
    /// * `Err(OsError::PrioExist)` - Another task already has this priority
    /// * `Err(OsError::TaskNoMoreTcb)` - Task table is full
    pub fn task_create(
        &mut self,
        name: &'static str,
        prio: OsPrio,
        ctx: TaskContext,
    ) -> OsResult<TaskId> {
        if self.int_nesting > 0 {
            return Err(OsError::TaskCreateIsr);
        }
        if !self.initialized {
            return Err(OsError::OsNotInit);
        }
        if prio as usize >= CFG_PRIO_MAX {
            return Err(OsError::PrioInvalid);
        }
        if self.prio_claimed.is_claimed(prio) {
            return Err(OsError::PrioExist);
        }
        if self.tasks.is_full() {
            return Err(OsError::TaskNoMoreTcb);
        }

        let id = TaskId(self.tasks.len() as u8);
        self.tasks
            .push(OsTcb::new(name, prio, ctx))
            .map_err(|_| OsError::TaskNoMoreTcb)?;
        self.prio_claimed.claim(prio);
        self.rdy.insert_by_prio(id, &mut self.tasks);

        crate::debug!("task {} '{}' created at prio {}", id, name, prio);

        self.schedule();
        Ok(id)
    }

    /// Number of tasks created since init, idle included
    #[inline]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Snapshot of a task
    pub fn task_info(&self, id: TaskId) -> Option<TaskInfo> {
        self.tasks.get(id.index()).map(|t| t.info(id))
    }

    /// Look a task up by name
    pub fn task_find(&self, name: &str) -> Option<TaskId> {
        self.tasks
            .iter()
            .position(|t| t.name == name)
            .map(|i| TaskId(i as u8))
    }
}

/// Create a new task
///
/// # Arguments
/// * `stack` - Static stack for the task
/// * `name` - Task name for debugging
/// * `task_fn` - Task entry point function
/// * `arg` - Argument passed to `task_fn`
/// * `prio` - Task priority (0 = highest)
///
/// # Example
/// ```ignore
/// static mut TASK_STK: [OsStkElement; 256] = [0; 256];
///
/// fn my_task(_: usize) -> ! {
///     loop { /* ... */ }
/// }
///
/// // In main:
/// os_task_create(
///     unsafe { &mut TASK_STK },
///     "MyTask",
///     my_task,
///     0,
///     5,
/// ).expect("Task creation failed");
/// ```
pub fn os_task_create(
    stack: &'static mut [OsStkElement],
    name: &'static str,
    task_fn: OsTaskFn,
    arg: usize,
    prio: OsPrio,
) -> OsResult<TaskId> {
    if stack.len() < CFG_STK_SIZE_MIN {
        return Err(OsError::StkSizeInvalid);
    }

    if is_isr_context() {
        return Err(OsError::TaskCreateIsr);
    }

    // SAFETY: the stack is 'static and exclusively ours from here on
    let ctx = unsafe { crate::port::os_task_stk_init(task_fn, arg, stack) };

    with_kernel(|k| k.task_create(name, prio, ctx))
}

/// Snapshot of a task of the global kernel
pub fn os_task_info(id: TaskId) -> Option<TaskInfo> {
    with_kernel(|k| k.task_info(id))
}
