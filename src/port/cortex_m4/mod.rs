//! Cortex-M4 port implementation
//!
//! Provides context switching via PendSV exception handler.

#![allow(named_asm_labels)]

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use crate::task::{OsTaskFn, TaskContext};
use crate::types::OsStkElement;

/// Contexts the PendSV handler switches between
///
/// `ctx_cur` must stay the first field, the handler loads it by address.
#[repr(C)]
pub struct CpuState {
    /// Context of the task executing on the CPU
    pub ctx_cur: *mut TaskContext,
    /// Context the next PendSV switches to
    pub ctx_high_rdy: *mut TaskContext,
}

#[no_mangle]
pub static mut CPU_STATE: CpuState = CpuState {
    ctx_cur: core::ptr::null_mut(),
    ctx_high_rdy: core::ptr::null_mut(),
};

/// Interrupt stack for MSP
#[no_mangle]
static mut INTERRUPT_STACK: [u64; 256] = [0xDEADBEEF_DEADBEEF; 256];

/// Program SysTick to fire `tick_hz` times a second from the core clock
pub fn os_cpu_systick_init(cpu_hz: u32, tick_hz: u32) {
    let reload = (cpu_hz / tick_hz.max(1)).clamp(1, 0x0100_0000) - 1;
    let mut p = unsafe { cortex_m::Peripherals::steal() };

    p.SYST.disable_counter();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.set_reload(reload);
    p.SYST.clear_current();
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// Start the first task
///
/// # Safety
/// `first` must point into the kernel task table and stay valid.
#[allow(static_mut_refs)]
pub unsafe fn os_start_high_rdy(first: *mut TaskContext) {
    unsafe {
        let mut scb = cortex_m::Peripherals::steal().SCB;
        
        // Set PendSV and SysTick priority to lowest
        scb.set_priority(SystemHandler::PendSV, 0xF0);
        scb.set_priority(SystemHandler::SysTick, 0xF0);

        // Switch MSP to dedicated interrupt stack
        let msp_top = &INTERRUPT_STACK as *const _ as u32 + core::mem::size_of_val(&INTERRUPT_STACK) as u32;
        
        asm!("msr msp, {0}", in(reg) msp_top,);
        asm!("msr psp, {0}", in(reg) 0);

        CPU_STATE.ctx_cur = core::ptr::null_mut();
        CPU_STATE.ctx_high_rdy = first;

        cortex_m::interrupt::enable();
        cortex_m::peripheral::SCB::set_pendsv();
    }
}

/// Request a switch to `to`
///
/// Called with interrupts masked. PendSV runs once they are restored, so
/// only the last request of a critical section takes effect.
#[inline(always)]
pub fn os_ctx_sw(to: *mut TaskContext) {
    unsafe { CPU_STATE.ctx_high_rdy = to };
    cortex_m::peripheral::SCB::set_pendsv();
}

/// Frame a task resumes from: the software-saved half sits below the
/// hardware exception frame.
#[repr(C)]
struct TaskFrame {
    /// r4-r11, popped by PendSV
    callee: [u32; 8],
    exc_return: u32,
    /// r0-r3, r12, popped by the exception return
    caller: [u32; 5],
    lr: u32,
    pc: u32,
    xpsr: u32,
}

const FRAME_WORDS: usize = core::mem::size_of::<TaskFrame>() / 4;

/// Thread mode, process stack, no FPU state
const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;
const XPSR_THUMB: u32 = 0x0100_0000;

/// Build the initial exception frame of a task
///
/// # Safety
/// `stack` must not be used by anything else for the life of the task.
pub unsafe fn os_task_stk_init(
    task_fn: OsTaskFn,
    arg: usize,
    stack: &'static mut [OsStkElement],
) -> TaskContext {
    let stk_base = stack.as_mut_ptr();
    let stk_size = stack.len();
    unsafe {
        // AAPCS wants an 8 byte aligned stack at exception entry
        let top = ((stk_base.add(stk_size) as usize) & !7) as *mut u32;
        let frame = top.sub(FRAME_WORDS) as *mut TaskFrame;

        // r4..r11 carry their register number to spot them in a dump
        let mut callee = [0u32; 8];
        for (i, r) in callee.iter_mut().enumerate() {
            *r = (i as u32 + 4) * 0x0101_0101;
        }

        frame.write(TaskFrame {
            callee,
            exc_return: EXC_RETURN_THREAD_PSP,
            caller: [arg as u32, 0, 0, 0, 0],
            lr: os_task_return as *const () as u32,
            pc: (task_fn as usize as u32) | 1,
            xpsr: XPSR_THUMB,
        });

        // PendSV skips one word before popping
        let stk_ptr = (frame as *mut u32).sub(1) as *mut OsStkElement;
        TaskContext::new(stk_ptr, stk_base, stk_size)
    }
}

/// Called from PendSV: save the outgoing stack pointer, adopt the
/// requested context and return its stack pointer
#[inline(never)]
#[no_mangle]
unsafe extern "C" fn pendsv_switch_context(cur_sp: *mut u32) -> *mut u32 {
    unsafe {
        let cur = CPU_STATE.ctx_cur;
        if !cur.is_null() {
            (*cur).stk_ptr = cur_sp;
        }

        CPU_STATE.ctx_cur = CPU_STATE.ctx_high_rdy;

        let next = CPU_STATE.ctx_cur;
        if next.is_null() {
            core::ptr::null_mut()
        } else {
            (*next).stk_ptr
        }
    }
}

/// PendSV exception handler - performs full context switch
///
/// 1. Save R4-R11, LR to current task's PSP (skip if first task)
/// 2. Call switch_context to swap contexts
/// 3. Restore R4-R11, LR from new task's stack
/// 4. Exception return
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "dsb",
        "isb",
        
        "mrs r0, psp",
        
        "ldr r1, ={cpu_state}",
        "ldr r1, [r1]",
        "cbz r1, 1f",
        
        "stmdb r0!, {{r4-r11, lr}}",
        
        "sub r0, r0, #4",
        
        "1:",
        "bl pendsv_switch_context",
        
        "cbz r0, 2f",
        "add r0, r0, #4",
        "ldmia r0!, {{r4-r11, lr}}",
        
        "msr psp, r0",
        
        "2:",
        "cpsie i",
        "dsb",
        "isb",
        
        "bx lr",
        
        cpu_state = sym CPU_STATE,
    );
}

/// Task return handler
#[no_mangle]
fn os_task_return() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}
