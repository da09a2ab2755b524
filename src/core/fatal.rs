//! Fatal error path
//!
//! Kernel invariant violations end here. The surrounding system may install
//! a hook (crash reporting, reset) that runs before the panic.

use core::cell::Cell;

use critical_section::Mutex;

use crate::types::TaskId;

/// Invariant violations and programmer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatalError {
    /// A blocking primitive was called from interrupt context
    BlockingInIsr,
    /// Dispatch found no ready task
    NoReadyTask,
    /// Wakeup of a task that is not blocked
    TaskNotBlocked(TaskId),
    /// A task handle that the task table does not contain
    BadTask(TaskId),
    /// Ready, wait or timeout list is inconsistent
    ListCorrupt,
    /// A critical device failed to initialize during boot
    DevInitFailed,
    /// `isr_exit` without a matching `isr_enter`
    IsrNesting,
}

/// Hook invoked with the fatal condition before the kernel panics
pub type FatalHook = fn(&FatalError);

static FATAL_HOOK: Mutex<Cell<Option<FatalHook>>> = Mutex::new(Cell::new(None));

/// Install the process-wide fatal hook, returning the previous one
pub fn set_fatal_hook(hook: Option<FatalHook>) -> Option<FatalHook> {
    critical_section::with(|cs| FATAL_HOOK.borrow(cs).replace(hook))
}

/// Report a fatal kernel condition. Never returns.
#[cold]
#[inline(never)]
pub fn os_fatal(err: FatalError) -> ! {
    crate::error!("os fatal: {}", err);

    let hook = critical_section::with(|cs| FATAL_HOOK.borrow(cs).get());
    if let Some(hook) = hook {
        hook(&err);
    }

    #[cfg(all(target_arch = "arm", not(feature = "defmt")))]
    cortex_m_semihosting::hprintln!("os fatal: {:?}", err);

    panic!("os fatal: {:?}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "NoReadyTask")]
    fn fatal_panics_with_reason() {
        os_fatal(FatalError::NoReadyTask);
    }

    #[test]
    fn hook_runs_before_panic() {
        extern crate std;
        use core::sync::atomic::{AtomicU32, Ordering};

        static HITS: AtomicU32 = AtomicU32::new(0);
        fn count(err: &FatalError) {
            if *err == FatalError::ListCorrupt {
                HITS.fetch_add(1, Ordering::Relaxed);
            }
        }

        assert!(set_fatal_hook(Some(count)).is_none());
        let r = std::panic::catch_unwind(|| os_fatal(FatalError::ListCorrupt));
        assert!(r.is_err());
        assert_eq!(HITS.load(Ordering::Relaxed), 1);
        set_fatal_hook(None);
    }
}
