//! Synchronization primitives
//!
//! Contains semaphores and mutexes. Both keep their waiters on a wait list
//! ordered by effective priority, FIFO among equals.

pub mod mutex;
pub mod sem;

pub use mutex::{Mutex, MutexInfo, OsMutex};
pub use sem::{OsSem, Semaphore};

use crate::task::list::{TaskList, WaitLink};

/// Tasks blocked on one kernel object
pub(crate) type WaitList = TaskList<WaitLink>;
