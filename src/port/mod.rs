//! Port layer - CPU-specific implementations
//!
//! This module provides the hardware abstraction layer for context switching
//! and other CPU-specific operations.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::*;

// Stub implementations for non-ARM targets (for testing)
#[cfg(not(target_arch = "arm"))]
pub mod stub {
    use crate::task::{OsTaskFn, TaskContext};
    use crate::types::OsStkElement;

    /// # Safety
    /// Never returns on a real port; here it only reports the missing port.
    pub unsafe fn os_start_high_rdy(_first: *mut TaskContext) {
        panic!("os_start_high_rdy not available on this platform");
    }

    pub fn os_ctx_sw(_to: *mut TaskContext) {
        // No-op for testing
    }

    /// # Safety
    /// `stack` must not be used by anything else for the life of the task.
    pub unsafe fn os_task_stk_init(
        _task_fn: OsTaskFn,
        _arg: usize,
        stack: &'static mut [OsStkElement],
    ) -> TaskContext {
        let stk_base = stack.as_mut_ptr();
        let stk_size = stack.len();
        // Return top of stack for testing
        TaskContext::new(unsafe { stk_base.add(stk_size - 1) }, stk_base, stk_size)
    }

    pub fn os_cpu_systick_init(_cpu_hz: u32, _tick_hz: u32) {}
}

#[cfg(not(target_arch = "arm"))]
pub use stub::*;
