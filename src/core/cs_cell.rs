//! Critical section protected cell
//!
//! Wrapper for global kernel state that must be accessed within critical sections.

use core::cell::UnsafeCell;
use crate::critical::CriticalSection;

/// A cell that can only be accessed within a critical section.
pub struct CsCell<T>(UnsafeCell<T>);

// SAFETY: all access goes through `get`, which requires a live critical
// section on a single-core target.
unsafe impl<T> Sync for CsCell<T> {}

impl<T> CsCell<T> {
    /// Create a new CsCell
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Get a mutable reference to the inner value
    ///
    /// The returned borrow is tied to the guard, so it cannot outlive the
    /// critical section. Callers must not hold two borrows at once.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub fn get<'a>(&'a self, _cs: &'a CriticalSection) -> &'a mut T {
        unsafe { &mut *self.0.get() }
    }
}
