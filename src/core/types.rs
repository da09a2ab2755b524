//! Core type definitions
//!
//! Kernel objects are owned by the kernel arenas and named by small handles.
//! Handles are plain indices: copying one never copies or borrows the object.

/// Task priority (0 = highest priority)
pub type OsPrio = u8;

/// Tick counter type
pub type OsTick = u32;

/// Semaphore counter type
pub type OsSemCtr = u16;

/// Nesting counter
pub type OsNestingCtr = u8;

/// Stack element type
pub type OsStkElement = u32;

/// Timeout value that never expires
pub const OS_TIMEOUT_NEVER: OsTick = OsTick::MAX;

/// Timeout value for a non-blocking attempt
pub const OS_NO_WAIT: OsTick = 0;

macro_rules! os_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(pub(crate) u8);

        impl $name {
            #[inline(always)]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

os_handle!(
    /// Handle to a task in the kernel task table
    TaskId
);
os_handle!(
    /// Handle to a counting semaphore
    SemId
);
os_handle!(
    /// Handle to a priority-inheriting mutex
    MutexId
);
os_handle!(
    /// Handle to an event queue
    EvqId
);
os_handle!(
    /// Handle to a callout
    CalloutId
);
os_handle!(
    /// Handle to a device registry entry
    DevId
);

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OsTaskState {
    /// Task is ready to run
    Ready = 0,
    /// Task is the one executing
    Running = 1,
    /// Task is delayed
    Sleeping = 2,
    /// Task is pending on a mutex
    PendMutex = 3,
    /// Task is pending on a semaphore
    PendSem = 4,
    /// Task is pending on one or more event queues
    PendEvent = 5,
}

/// Bit set of event queues a task is polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EvqSet(pub(crate) u32);

impl EvqSet {
    pub const EMPTY: Self = Self(0);

    #[inline]
    pub fn with(self, evq: EvqId) -> Self {
        Self(self.0 | (1 << evq.0))
    }

    #[inline]
    pub fn contains(self, evq: EvqId) -> bool {
        self.0 & (1 << evq.0) != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the member queues in index order
    pub fn iter(self) -> impl Iterator<Item = EvqId> {
        (0..32u8).filter(move |i| self.0 & (1 << i) != 0).map(EvqId)
    }
}

/// What the task is pending on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OsPendOn {
    Nothing,
    Mutex(MutexId),
    Semaphore(SemId),
    Queues(EvqSet),
}

/// Pend status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OsPendStatus {
    /// Pend succeeded
    Ok = 0,
    /// Still blocked, no outcome yet
    Pending = 1,
    /// Timeout occurred
    Timeout = 3,
}

/// Outcome of a call that may suspend the caller.
///
/// `Blocked` means the caller has been parked and a context switch requested;
/// the final result is collected with
/// [`Kernel::pend_result`](crate::kernel::Kernel::pend_result) once the task
/// runs again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Pend<T> {
    Ready(T),
    Blocked,
}

impl<T> Pend<T> {
    #[inline]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Pend::Blocked)
    }

    /// The value if the call completed without blocking
    #[inline]
    pub fn ready(self) -> Option<T> {
        match self {
            Pend::Ready(v) => Some(v),
            Pend::Blocked => None,
        }
    }
}

/// Wrapping comparison of two tick values: `a` is strictly before `b`
#[inline(always)]
pub fn tick_lt(a: OsTick, b: OsTick) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// Wrapping comparison of two tick values: `a` is at or before `b`
#[inline(always)]
pub fn tick_leq(a: OsTick, b: OsTick) -> bool {
    (a.wrapping_sub(b) as i32) <= 0
}
