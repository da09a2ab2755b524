//! Compile-time and boot-time configuration
//!
//! The constants size every kernel arena; [`KernelConfig`] carries the few
//! policies that are chosen when the kernel is initialized.

/// Maximum number of priority levels
pub const CFG_PRIO_MAX: usize = 64;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Core clock feeding SysTick, HSI on reset
pub const CFG_CPU_CLOCK_HZ: u32 = 16_000_000;

/// Minimum task stack size
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Idle task priority
pub const CFG_PRIO_IDLE: u8 = (CFG_PRIO_MAX - 1) as u8;

/// Maximum number of tasks, idle task included
pub const CFG_TASK_MAX: usize = 16;

/// Maximum number of semaphores
pub const CFG_SEM_MAX: usize = 16;

/// Maximum number of mutexes
pub const CFG_MUTEX_MAX: usize = 16;

/// Maximum number of event queues, default queue included
pub const CFG_EVQ_MAX: usize = 8;

/// Capacity of a single event queue
pub const CFG_EVQ_DEPTH: usize = 16;

/// Maximum number of callouts
pub const CFG_CALLOUT_MAX: usize = 16;

/// Maximum number of registered devices
pub const CFG_DEV_MAX: usize = 32;

/// Every task and every callout can hold at most one timeout entry
pub const CFG_TIMER_MAX: usize = CFG_TASK_MAX + CFG_CALLOUT_MAX;

/// What happens to an inherited priority when the waiter that caused it
/// gives up on the mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InheritUnwind {
    /// The owner drops back as soon as the waiter times out
    OnTimeout,
    /// The owner keeps the boost until it fully releases a mutex
    OnRelease,
}

/// Policies fixed at [`Kernel::init`](crate::kernel::Kernel::init)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub inherit_unwind: InheritUnwind,
}

impl KernelConfig {
    pub const DEFAULT: Self = Self {
        inherit_unwind: InheritUnwind::OnTimeout,
    };
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
