//! Error types
//!
//! Recoverable outcomes are `OsError` values returned through [`OsResult`].
//! Broken kernel invariants are not errors; they go through
//! [`os_fatal`](crate::fatal::os_fatal).

/// RTOS error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum OsError {
    // ============ Mutex errors ============
    /// Caller is not the mutex owner, or the mutex is not held
    MutexNotOwner = 22401,
    /// Mutex nesting overflow
    MutexOvf = 22404,

    // ============ Object errors ============
    /// Handle does not name a created object
    ObjInvalid = 24003,
    /// Object arena is exhausted
    ObjNoMore = 24005,

    // ============ OS state errors ============
    /// OS is not running
    OsNotRunning = 24201,
    /// OS is already running
    OsRunning = 24202,
    /// OS not initialized
    OsNotInit = 24203,

    // ============ Pend errors ============
    /// Task is still blocked; the pend has no outcome yet
    PendWouldBlock = 25008,

    // ============ Priority errors ============
    /// Priority already exists
    PrioExist = 25201,
    /// Invalid priority
    PrioInvalid = 25203,

    // ============ Queue errors ============
    /// Queue is full
    QFull = 26001,
    /// Another task is already waiting on the queue
    EvqBusy = 26005,

    // ============ Semaphore errors ============
    /// Semaphore overflow
    SemOvf = 28101,

    // ============ State errors ============
    /// Invalid stack size
    StkSizeInvalid = 28208,

    // ============ Task errors ============
    /// Cannot create task from ISR
    TaskCreateIsr = 29002,
    /// No more TCBs available
    TaskNoMoreTcb = 29008,

    // ============ Timeout ============
    /// Operation timed out
    Timeout = 29401,

    // ============ Timer errors ============
    /// Invalid callout delay
    TmrInvalidDly = 29503,

    // ============ Device errors ============
    /// No device registered under that name
    DevNotFound = 30001,
    /// Device exists but did not initialize
    DevNotReady = 30002,
    /// Device name already registered
    DevExists = 30003,
    /// Device registry is full
    DevFull = 30004,
    /// Close without a matching open
    DevNotOpen = 30005,
    /// A critical device failed to initialize
    DevInitCritical = 30006,
    /// Driver reported a failure
    DevFailed = 30007,
}

/// Result type alias for RTOS operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    /// Numeric code, stable across releases
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }
}
