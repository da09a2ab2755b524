//! Time management module
//!
//! Provides tick handling, time delays, and timeout management.

use heapless::Vec;

use crate::config::{CFG_CALLOUT_MAX, CFG_TICK_RATE_HZ};
use crate::critical::is_isr_context;
use crate::error::OsResult;
use crate::fatal::{os_fatal, FatalError};
use crate::kernel::{block_on, with_kernel, Kernel, OS_FLAGS};
use crate::sched::TimerTarget;
use crate::types::{tick_lt, CalloutId, OsPendOn, OsPendStatus, OsTaskState, OsTick, Pend, TaskId};

impl Kernel {
    /// Current tick count
    #[inline]
    pub fn now(&self) -> OsTick {
        self.now
    }

    /// Put the running task to sleep for `ticks` ticks
    ///
    /// `0` returns immediately. [`OS_TIMEOUT_NEVER`](crate::types::OS_TIMEOUT_NEVER)
    /// sleeps until an explicit [`wakeup`](Self::wakeup).
    ///
    /// # Returns
    /// * `Ok(Pend::Ready(()))` - Nothing to wait for
    /// * `Ok(Pend::Blocked)` - The task sleeps
    /// * `Err(OsError::OsNotRunning)` - Scheduler not started
    pub fn sleep(&mut self, ticks: OsTick) -> OsResult<Pend<()>> {
        if self.int_nesting > 0 {
            os_fatal(FatalError::BlockingInIsr);
        }
        if ticks == 0 {
            return Ok(Pend::Ready(()));
        }

        self.cur_or_err()?;
        self.block_current(OsTaskState::Sleeping, OsPendOn::Nothing, ticks);
        Ok(Pend::Blocked)
    }

    /// Advance time by one tick
    ///
    /// Every expired deadline fires: tasks wake with a timeout outcome, then
    /// expired callouts post their event. Reschedules once at the end.
    pub fn tick(&mut self) {
        self.now = self.now.wrapping_add(1);

        let mut fired: Vec<CalloutId, CFG_CALLOUT_MAX> = Vec::new();
        while let Some(entry) = self.timers.pop_expired(self.now) {
            match entry.target {
                TimerTarget::Task(id) => self.expire_task(id),
                TimerTarget::Callout(c) => {
                    // Each callout holds at most one entry
                    let pushed = fired.push(c);
                    debug_assert!(pushed.is_ok());
                }
            }
        }

        for c in fired {
            self.fire_callout(c);
        }

        self.schedule();
    }

    /// Ticks until the earliest deadline, `None` if nothing waits on time
    ///
    /// A tickless idle hook may sleep this long and then catch up with
    /// [`time_advance`](Self::time_advance).
    pub fn ticks_to_next_deadline(&self) -> Option<OsTick> {
        self.timers.next_deadline().map(|d| {
            if tick_lt(self.now, d) {
                d.wrapping_sub(self.now)
            } else {
                0
            }
        })
    }

    /// Number of armed deadlines, tasks and callouts together
    #[inline]
    pub fn pending_deadlines(&self) -> usize {
        self.timers.len()
    }

    /// Apply `ticks` ticks in one step, as after a tickless sleep
    pub fn time_advance(&mut self, ticks: OsTick) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    fn expire_task(&mut self, id: TaskId) {
        // The entry is already off the timeout list
        self.tasks[id.index()].deadline = None;

        crate::trace!("task {} timed out", id);
        self.abort_wait(id, OsPendStatus::Timeout);
    }
}

/// Time delay in ticks
///
/// Delays the calling task for the specified number of system ticks.
///
/// # Arguments
/// * `ticks` - Number of ticks to delay (0 = no delay)
///
/// # Returns
/// * `Ok(())` - Delay completed
/// * `Err(OsError::OsNotRunning)` - Scheduler not started
pub fn os_time_delay(ticks: OsTick) -> OsResult<()> {
    if is_isr_context() {
        os_fatal(FatalError::BlockingInIsr);
    }

    block_on(ticks, |k| k.sleep(ticks), |_, _| Ok(()))
}

/// Time delay in milliseconds, rounded up to whole ticks
pub fn os_time_delay_ms(ms: u32) -> OsResult<()> {
    os_time_delay(os_time_ms_to_ticks(ms))
}

/// Get current tick count
#[inline]
pub fn os_time_get() -> OsTick {
    OS_FLAGS.tick_get()
}

/// Convert milliseconds to ticks, rounding up
pub fn os_time_ms_to_ticks(ms: u32) -> OsTick {
    let ticks = (ms as u64 * CFG_TICK_RATE_HZ as u64).div_ceil(1000);
    ticks.min(OsTick::MAX as u64) as OsTick
}

/// Convert ticks to milliseconds, rounding down
pub fn os_time_ticks_to_ms(ticks: OsTick) -> u32 {
    let ms = ticks as u64 * 1000 / CFG_TICK_RATE_HZ as u64;
    ms.min(u32::MAX as u64) as u32
}

/// Tick handler
pub fn os_tick_handler() {
    if !OS_FLAGS.is_running() {
        return;
    }

    with_kernel(|k| {
        k.isr_enter();
        k.tick();
        OS_FLAGS.set_tick(k.now());
        k.isr_exit();
    });
}

/// SysTick interrupt handler
#[no_mangle]
pub extern "C" fn SysTick() {
    os_tick_handler();
}
