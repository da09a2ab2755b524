//! Global kernel state and initialization
//!
//! [`Kernel`] owns every task and kernel object in fixed arenas. All of its
//! methods take `&mut self`; on the target the single instance lives in
//! [`KERNEL`] and is only reached inside a critical section, while host tests
//! drive their own instances directly.

use heapless::Vec;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::{
    KernelConfig, CFG_CALLOUT_MAX, CFG_EVQ_MAX, CFG_MUTEX_MAX, CFG_PRIO_IDLE, CFG_SEM_MAX,
    CFG_TASK_MAX,
};
use crate::core::cs_cell::CsCell;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::event::{Event, OsCallout, OsEventQueue};
use crate::fatal::{os_fatal, FatalError};
use crate::prio::PrioSet;
use crate::sched::{ReadyList, TimerList};
use crate::sync::{OsMutex, OsSem};
use crate::task::{OsTaskFn, OsTcb, TaskContext};
use crate::types::{
    EvqId, OsNestingCtr, OsPendStatus, OsStkElement, OsTick, Pend, TaskId, OS_NO_WAIT,
};

const _: () = assert!(CFG_EVQ_MAX <= 32, "EvqSet is a 32-bit mask");
const _: () = assert!(CFG_TASK_MAX <= u8::MAX as usize);

// ============ Kernel State Structures ============

/// Lock-free kernel flags, readable without entering a critical section
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    tick_counter: AtomicU32,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            tick_counter: AtomicU32::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.tick_counter.store(0, Ordering::SeqCst);
    }

    /// Check if the OS is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if OS is initialized
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Get current tick count
    #[inline(always)]
    pub fn tick_get(&self) -> OsTick {
        self.tick_counter.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub(crate) fn set_tick(&self, now: OsTick) {
        self.tick_counter.store(now, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }
}

/// The OS core: task table, ready and timeout lists, object arenas
pub struct Kernel {
    pub(crate) cfg: KernelConfig,

    pub(crate) tasks: Vec<OsTcb, CFG_TASK_MAX>,
    pub(crate) prio_claimed: PrioSet,
    pub(crate) rdy: ReadyList,
    pub(crate) timers: TimerList,

    pub(crate) sems: Vec<OsSem, CFG_SEM_MAX>,
    pub(crate) mutexes: Vec<OsMutex, CFG_MUTEX_MAX>,
    pub(crate) evqs: Vec<OsEventQueue, CFG_EVQ_MAX>,
    pub(crate) callouts: Vec<OsCallout, CFG_CALLOUT_MAX>,

    /// Task that owns the CPU
    pub(crate) current: Option<TaskId>,
    pub(crate) idle: Option<TaskId>,
    pub(crate) dflt_evq: Option<EvqId>,

    pub(crate) now: OsTick,
    pub(crate) int_nesting: OsNestingCtr,
    /// A reschedule was requested while in interrupt context
    pub(crate) switch_pending: bool,
    pub(crate) initialized: bool,
    pub(crate) started: bool,
    pub(crate) ctx_sw_ctr: u32,
}

impl Kernel {
    pub const fn new() -> Self {
        Kernel {
            cfg: KernelConfig::DEFAULT,
            tasks: Vec::new(),
            prio_claimed: PrioSet::new(),
            rdy: ReadyList::new(),
            timers: TimerList::new(),
            sems: Vec::new(),
            mutexes: Vec::new(),
            evqs: Vec::new(),
            callouts: Vec::new(),
            current: None,
            idle: None,
            dflt_evq: None,
            now: 0,
            int_nesting: 0,
            switch_pending: false,
            initialized: false,
            started: false,
            ctx_sw_ctr: 0,
        }
    }

    fn reset(&mut self) {
        self.tasks.clear();
        self.prio_claimed.clear();
        self.rdy = ReadyList::new();
        self.timers.clear();
        self.sems.clear();
        self.mutexes.clear();
        self.evqs.clear();
        self.callouts.clear();
        self.current = None;
        self.idle = None;
        self.dflt_evq = None;
        self.now = 0;
        self.int_nesting = 0;
        self.switch_pending = false;
        self.initialized = false;
        self.started = false;
        self.ctx_sw_ctr = 0;
    }

    /// Initialize the kernel
    ///
    /// Clears every arena, creates the idle task on `idle_ctx` and the
    /// default event queue.
    ///
    /// # Returns
    /// * `Ok(())` - Initialization successful
    /// * `Err(OsError::OsRunning)` - OS is already running
    pub fn init(&mut self, cfg: KernelConfig, idle_ctx: TaskContext) -> OsResult<()> {
        if self.started {
            return Err(OsError::OsRunning);
        }

        self.reset();
        self.cfg = cfg;
        self.initialized = true;

        let idle = self.task_create("idle", CFG_PRIO_IDLE, idle_ctx)?;
        self.idle = Some(idle);
        self.dflt_evq = Some(self.evq_create()?);

        crate::debug!("kernel initialized");
        Ok(())
    }

    /// Kernel policies chosen at init
    #[inline]
    pub fn config(&self) -> &KernelConfig {
        &self.cfg
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// The idle task created by [`init`](Self::init)
    #[inline]
    pub fn idle_task(&self) -> Option<TaskId> {
        self.idle
    }

    /// Total number of dispatches since start
    #[inline]
    pub fn ctx_sw_count(&self) -> u32 {
        self.ctx_sw_ctr
    }

    /// Outcome of the last pend of `task`
    ///
    /// # Returns
    /// * `Ok(())` - The awaited object was granted
    /// * `Err(OsError::Timeout)` - The deadline elapsed first
    /// * `Err(OsError::PendWouldBlock)` - The task is still blocked
    pub fn pend_result(&self, task: TaskId) -> OsResult<()> {
        let tcb = self.tasks.get(task.index()).ok_or(OsError::ObjInvalid)?;
        match tcb.pend_status {
            OsPendStatus::Ok => Ok(()),
            OsPendStatus::Timeout => Err(OsError::Timeout),
            OsPendStatus::Pending => Err(OsError::PendWouldBlock),
        }
    }

    /// Event handed to `task` by a post while it was blocked in get/poll
    pub fn take_delivered(&mut self, task: TaskId) -> Option<(EvqId, Event)> {
        self.tasks.get_mut(task.index())?.delivered.take()
    }

    // ============ Interrupt nesting ============

    /// Enter interrupt context
    pub fn isr_enter(&mut self) {
        self.int_nesting = self.int_nesting.saturating_add(1);
    }

    /// Leave interrupt context, running any reschedule deferred while nested
    pub fn isr_exit(&mut self) {
        if self.int_nesting == 0 {
            os_fatal(FatalError::IsrNesting);
        }
        self.int_nesting -= 1;

        if self.int_nesting == 0 && self.switch_pending {
            self.schedule();
        }
    }

    #[inline]
    pub fn in_isr(&self) -> bool {
        self.int_nesting > 0
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Global Instances ============

/// Global kernel flags
pub static OS_FLAGS: KernelFlags = KernelFlags::new();

/// Global kernel instance
pub(crate) static KERNEL: CsCell<Kernel> = CsCell::new(Kernel::new());

/// IDLE task stack
static mut IDLE_STK: [OsStkElement; 128] = [0; 128];

/// Internal IDLE task function
fn os_idle_task(_: usize) -> ! {
    loop {
        #[cfg(target_arch = "arm")]
        cortex_m::asm::wfi();
        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}

const IDLE_TASK: OsTaskFn = os_idle_task;

/// Run `f` on the global kernel with interrupts masked
#[inline]
pub(crate) fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    critical_section(|cs| f(KERNEL.get(cs)))
}

/// Drive a possibly blocking kernel call to completion for the calling task.
///
/// `pend` runs in a critical section. If it parks the caller, the context
/// switch it requested happens as soon as interrupts are restored; execution
/// continues here once the task has been woken, and `finish` collects the
/// outcome.
pub(crate) fn block_on<T>(
    timeout: OsTick,
    pend: impl FnOnce(&mut Kernel) -> OsResult<Pend<T>>,
    finish: impl FnOnce(&mut Kernel, TaskId) -> OsResult<T>,
) -> OsResult<T> {
    if timeout != OS_NO_WAIT && is_isr_context() {
        os_fatal(FatalError::BlockingInIsr);
    }

    let (me, outcome) = with_kernel(|k| -> OsResult<_> {
        let me = k.current_task();
        Ok((me, pend(k)?))
    })?;

    match outcome {
        Pend::Ready(value) => Ok(value),
        Pend::Blocked => {
            let me = me.ok_or(OsError::OsNotRunning)?;
            with_kernel(|k| finish(k, me))
        }
    }
}

// ============ Public API ============

/// Initialize the RTOS kernel with the default configuration
///
/// This must be called before any other OS function.
/// IDLE task is automatically created.
pub fn os_init() -> OsResult<()> {
    os_init_with(KernelConfig::DEFAULT)
}

/// Initialize the RTOS kernel
#[allow(static_mut_refs)]
pub fn os_init_with(cfg: KernelConfig) -> OsResult<()> {
    if OS_FLAGS.is_running() {
        return Err(OsError::OsRunning);
    }
    OS_FLAGS.reset();

    // SAFETY: the idle stack is handed to the port exactly once per init,
    // before the scheduler runs.
    let idle_ctx = unsafe { crate::port::os_task_stk_init(IDLE_TASK, 0, &mut IDLE_STK) };

    critical_section(|cs| {
        KERNEL.get(cs).init(cfg, idle_ctx)?;
        crate::dev::DEVICES.get(cs).reset();
        OS_FLAGS.set_initialized(true);
        Ok(())
    })
}

/// Start multitasking
///
/// Dispatches the highest priority ready task. It does not return on the
/// target.
///
/// # Returns
/// * `Err(OsError::OsNotInit)` - OS not initialized
/// * `Err(OsError::OsRunning)` - OS is already running
pub fn os_start() -> OsResult<()> {
    let first = critical_section(|cs| {
        let kernel = KERNEL.get(cs);
        let first = kernel.start()?;
        crate::dev::DEVICES.get(cs).mark_started();
        OS_FLAGS.set_running(true);
        Ok::<_, OsError>(&mut kernel.tasks[first.index()].ctx as *mut TaskContext)
    })?;

    crate::port::os_cpu_systick_init(crate::config::CFG_CPU_CLOCK_HZ, crate::config::CFG_TICK_RATE_HZ);

    unsafe { crate::port::os_start_high_rdy(first) };

    Ok(())
}

/// Enter ISR
pub fn os_int_enter() {
    if OS_FLAGS.is_running() {
        with_kernel(|k| k.isr_enter());
    }
}

/// Exit ISR
pub fn os_int_exit() {
    if OS_FLAGS.is_running() {
        with_kernel(|k| k.isr_exit());
    }
}
