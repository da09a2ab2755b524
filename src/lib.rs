//! tickos: a small preemptive RTOS core
//!
//! A real-time operating system kernel providing:
//! - Strict priority preemptive scheduling with tick based sleeps
//! - Priority inheriting recursive mutexes and counting semaphores
//! - Event queues and callouts (one-shot software timers)
//! - A staged device registry for boot ordering of drivers
//! - Context switching for ARM Cortex-M
//!
//! The whole kernel state is a [`kernel::Kernel`] value. On the target one
//! global instance is driven through the `os_*` functions and the wrapper
//! types; on the host a `Kernel` can be driven directly, which is how the
//! state machine is tested.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod sync;
pub mod event;
pub mod dev;
pub mod port;

// ============ Re-exports ============

pub use self::core::config;
pub use self::core::config::*;
pub use self::core::critical;
pub use self::core::error;
pub use self::core::error::{OsError, OsResult};
pub use self::core::fatal;
pub use self::core::fatal::{os_fatal, set_fatal_hook, FatalError};
pub use self::core::kernel;
pub use self::core::kernel::{os_init, os_init_with, os_int_enter, os_int_exit, os_start, Kernel};
pub use self::core::prio;
pub use self::core::types;
pub use self::core::types::*;
pub use self::core::task;
pub use self::core::task::os_task_create;
pub use self::core::sched;
pub use self::core::time;
pub use self::core::time::{os_time_delay, os_time_get, os_time_ms_to_ticks, os_time_ticks_to_ms};

pub use sync::{mutex, sem, Mutex, Semaphore};
pub use event::{Callout, Event, EventQueue};
