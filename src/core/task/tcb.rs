//! Task Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a task. TCBs live
//! in the kernel task table and are never removed from it; every list a
//! task sits on refers to it by [`TaskId`].

use crate::event::Event;
use crate::types::{
    EvqId, OsNestingCtr, OsPendOn, OsPendStatus, OsPrio, OsStkElement, OsTaskState,
    OsTick, TaskId,
};

/// Saved execution context of a task
///
/// The port layer reads and writes `stk_ptr` from the context switch
/// handler; it must stay the first field.
#[repr(C)]
#[derive(Debug)]
pub struct TaskContext {
    /// Current stack pointer
    pub(crate) stk_ptr: *mut OsStkElement,
    /// Base of stack
    pub(crate) stk_base: *mut OsStkElement,
    /// Stack size in words
    pub(crate) stk_size: usize,
}

impl TaskContext {
    /// Context with no stack behind it, used for the host kernel model
    pub const fn detached() -> Self {
        TaskContext {
            stk_ptr: core::ptr::null_mut(),
            stk_base: core::ptr::null_mut(),
            stk_size: 0,
        }
    }

    pub(crate) fn new(stk_ptr: *mut OsStkElement, stk_base: *mut OsStkElement, stk_size: usize) -> Self {
        TaskContext { stk_ptr, stk_base, stk_size }
    }

    /// Stack size in words
    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stk_size
    }

    #[inline]
    pub fn is_detached(&self) -> bool {
        self.stk_base.is_null()
    }
}

/// Intrusive list linkage, by handle
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Link {
    pub(crate) prev: Option<TaskId>,
    pub(crate) next: Option<TaskId>,
    pub(crate) linked: bool,
}

impl Link {
    pub(crate) const UNLINKED: Link = Link {
        prev: None,
        next: None,
        linked: false,
    };
}

/// Task Control Block
pub struct OsTcb {
    // ============ Context ============
    pub(crate) ctx: TaskContext,

    // ============ Task identification ============
    pub(crate) name: &'static str,

    // ============ Priority ============
    /// Effective priority, raised by inheritance
    pub(crate) prio: OsPrio,
    /// Priority given at creation
    pub(crate) base_prio: OsPrio,

    // ============ State ============
    pub(crate) state: OsTaskState,

    // ============ List links ============
    /// Ready list
    pub(crate) rdy_link: Link,
    /// Wait list of the object in `pend_on`
    pub(crate) wait_link: Link,

    // ============ Pend ============
    pub(crate) pend_on: OsPendOn,
    pub(crate) pend_status: OsPendStatus,
    /// Absolute wake tick while on the timeout list
    pub(crate) deadline: Option<OsTick>,
    /// Event handed over by a post while blocked in get/poll
    pub(crate) delivered: Option<(EvqId, Event)>,

    // ============ Mutex priority inheritance ============
    /// Number of mutexes currently held
    pub(crate) lock_count: OsNestingCtr,

    // ============ Statistics ============
    pub(crate) ctx_sw_ctr: u32,
}

impl OsTcb {
    pub(crate) fn new(name: &'static str, prio: OsPrio, ctx: TaskContext) -> Self {
        OsTcb {
            ctx,
            name,
            prio,
            base_prio: prio,
            state: OsTaskState::Ready,
            rdy_link: Link::UNLINKED,
            wait_link: Link::UNLINKED,
            pend_on: OsPendOn::Nothing,
            pend_status: OsPendStatus::Ok,
            deadline: None,
            delivered: None,
            lock_count: 0,
            ctx_sw_ctr: 0,
        }
    }

    /// Check if task is ready to run
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == OsTaskState::Ready
    }

    /// Check if task is blocked on an object or a delay
    #[inline]
    pub fn is_blocked(&self) -> bool {
        matches!(
            self.state,
            OsTaskState::Sleeping
                | OsTaskState::PendMutex
                | OsTaskState::PendSem
                | OsTaskState::PendEvent
        )
    }

    pub(crate) fn info(&self, id: TaskId) -> TaskInfo {
        TaskInfo {
            id,
            name: self.name,
            prio: self.prio,
            base_prio: self.base_prio,
            state: self.state,
            pend_on: self.pend_on,
            deadline: self.deadline,
            lock_count: self.lock_count,
            ctx_sw_ctr: self.ctx_sw_ctr,
            stk_size: self.ctx.stk_size,
        }
    }
}

/// Snapshot of a task, for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: &'static str,
    pub prio: OsPrio,
    pub base_prio: OsPrio,
    pub state: OsTaskState,
    pub pend_on: OsPendOn,
    pub deadline: Option<OsTick>,
    pub lock_count: OsNestingCtr,
    pub ctx_sw_ctr: u32,
    pub stk_size: usize,
}
