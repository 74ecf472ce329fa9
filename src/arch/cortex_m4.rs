//! # Cortex-M4 port layer
//!
//! Hardware-specific primitives consumed by the kernel: process-stack
//! pointer access, the deferred context-switch (PendSV) and periodic tick
//! (SysTick) exception handlers, the one-shot supervisor call (SVCall) that
//! performs the initial dispatch into thread mode, and exception priority
//! configuration.
//!
//! ## Context switch mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by the kernel and interrupt handlers.
//! - **PSP** (Process Stack Pointer): used by tasks in thread mode.
//!
//! On exception entry, the hardware automatically stacks R0-R3, R12, LR, PC,
//! and xPSR onto the active stack. `PendSV` manually saves and restores
//! R4-R11, which completes the full context save/restore.
//!
//! ## Interrupt priorities
//!
//! `SVCall` runs at a higher priority than `SysTick`, which in turn runs
//! higher than `PendSV` — `PendSV` sits at the weakest priority so it only
//! runs once every other handler has returned (`spec.md` §5(b)).

use core::arch::asm;
use core::sync::atomic::{compiler_fence, Ordering};

use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` (1 kHz) using the processor clock.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// Process stack pointer access
// ---------------------------------------------------------------------------

/// Read the process stack pointer (PSP).
#[inline]
pub fn get_process_stack_pointer() -> *mut u32 {
    cortex_m::register::psp::read() as *mut u32
}

/// Write the process stack pointer (PSP).
#[inline]
pub fn set_process_stack_pointer(addr: *const u32) {
    cortex_m::register::psp::write(addr as u32);
}

// ---------------------------------------------------------------------------
// Interrupt enable/disable and low-power wait
// ---------------------------------------------------------------------------

/// Globally disable interrupts (`CPSID i`).
#[inline]
pub fn disable_interrupts() {
    cortex_m::interrupt::disable();
}

/// Globally enable interrupts (`CPSIE i`).
///
/// # Safety
/// Must only be called when it is actually safe for interrupts to resume —
/// no partially updated shared state left visible to a handler.
#[inline]
pub unsafe fn enable_interrupts() {
    cortex_m::interrupt::enable();
}

/// Put the core into a low-power wait-for-interrupt state. Used by the idle
/// task.
#[inline]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

// ---------------------------------------------------------------------------
// Deferred context switch (PendSV) trigger
// ---------------------------------------------------------------------------

/// Request a context switch by setting `PENDSVSET` in the Interrupt Control
/// and State Register, followed by an instruction synchronization barrier.
/// `PendSV` runs at the weakest priority, so this takes effect only once
/// every currently running higher-priority handler has returned.
#[inline]
pub fn pend_context_switch() {
    // ICSR address: 0xE000_ED04, PENDSVSET = bit 28
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
    cortex_m::asm::isb();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Order exception priorities `SVCall > SysTick > PendSV` (lower numeric
/// value is higher priority on Cortex-M). `PendSV` gets the weakest
/// priority so a context switch never preempts `SysTick` or an in-progress
/// `SVCall`, and `SysTick`'s decrements are always visible to the scheduler
/// selection that follows in the `PendSV` it pends (`spec.md` §5(c)).
pub fn set_interrupt_priorities() {
    // SHPR2 bits[31:24] = SVCall priority; SHPR3 bits[23:16] = PendSV,
    // bits[31:24] = SysTick.
    const SHPR2: *mut u32 = 0xE000_ED1C as *mut u32;
    const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
    const SVCALL_PRIO: u32 = 0x40;
    const SYSTICK_PRIO: u32 = 0x80;
    const PENDSV_PRIO: u32 = 0xFF;
    unsafe {
        let shpr2 = core::ptr::read_volatile(SHPR2);
        core::ptr::write_volatile(SHPR2, shpr2 | (SVCALL_PRIO << 24));

        let shpr3 = core::ptr::read_volatile(SHPR3);
        let shpr3 = (shpr3 & !(0xFF << 16) & !(0xFF << 24))
            | (PENDSV_PRIO << 16)
            | (SYSTICK_PRIO << 24);
        core::ptr::write_volatile(SHPR3, shpr3);
    }
}

// ---------------------------------------------------------------------------
// Initial dispatch (SVCall)
// ---------------------------------------------------------------------------

/// Launch the first task. Sets the process stack pointer to its
/// bootstrapped frame and traps into `SVCall`, which performs the one-time
/// transition into thread mode / process-stack execution.
///
/// # Safety
/// Must be called exactly once, with `sp` pointing at a frame built by
/// [`crate::scheduler::bootstrap_stack`], and with interrupt priorities
/// already configured.
pub unsafe fn enter_first_task(sp: *const u32) -> ! {
    set_process_stack_pointer(sp);
    compiler_fence(Ordering::SeqCst);
    asm!("svc 0", options(noreturn));
}

/// `SVCall` exception handler — the one-time transition into thread mode.
///
/// PSP already points at the bootstrapped frame set by [`enter_first_task`].
/// Skips the eight software-saved registers, switches `CONTROL.SPSEL` so
/// thread mode runs on the process stack, then manually pops the
/// hardware-stacked frame and branches to the task's entry point — there is
/// no real exception to return from on this first dispatch.
///
/// # Safety
/// Naked function invoked directly by the NVIC. Must only ever fire once,
/// via [`enter_first_task`].
#[no_mangle]
#[naked]
pub unsafe extern "C" fn SVCall() {
    asm!(
        "mrs r0, psp",
        "adds r0, #32", // skip the 8 software-saved registers (R4-R11)
        "msr psp, r0",
        "movs r0, #2",
        "msr control, r0", // CONTROL.SPSEL = 1: thread mode now runs on PSP
        "isb",
        "pop {{r0-r3, r12}}",
        "pop {{r4}}", // LR
        "pop {{r5}}", // PC: task entry point
        "pop {{r6}}", // xPSR, discarded — the processor is already in Thumb state
        "cpsie i",
        "bx r5",
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// `PendSV` exception handler — performs a context switch.
///
/// 1. Save R4-R11 onto the outgoing task's stack (PSP).
/// 2. Store the updated PSP into the outgoing TCB.
/// 3. Run the scheduler to pick the next task.
/// 4. Load the incoming task's PSP.
/// 5. Restore R4-R11 from the incoming task's stack.
/// 6. Return from exception; hardware restores R0-R3, R12, LR, PC, xPSR.
///
/// # Safety
/// Naked function invoked directly by the NVIC; must follow the exact
/// Cortex-M4 exception entry/exit convention.
#[no_mangle]
#[naked]
pub unsafe extern "C" fn PendSV() {
    asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {save_outgoing}",
        "bl {select_incoming}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr r0, =0xFFFFFFFD",
        "bx r0",
        save_outgoing = sym save_outgoing_sp,
        select_incoming = sym select_incoming_sp,
        options(noreturn)
    );
}

/// Called from `PendSV`: store the outgoing task's saved PSP into its TCB
/// and mark it `Ready` if it was `Running`.
///
/// # Safety
/// Called only from `PendSV`, with interrupts effectively serialized.
#[no_mangle]
unsafe extern "C" fn save_outgoing_sp(psp: *mut u32) {
    crate::kernel::on_context_save(psp);
}

/// Called from `PendSV`: run the EDF scheduler and return the incoming
/// task's PSP.
///
/// # Safety
/// Called only from `PendSV`.
#[no_mangle]
unsafe extern "C" fn select_incoming_sp() -> *mut u32 {
    crate::kernel::on_context_select()
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// `SysTick` exception handler — advances deadline/sleep accounting and
/// unconditionally requests a context switch (`spec.md` §4.5); `PendSV`'s
/// weaker priority means the switch runs only after this handler returns.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::on_tick();
    pend_context_switch();
}

// ---------------------------------------------------------------------------
// Fatal fault handlers
// ---------------------------------------------------------------------------

/// Unrecoverable bus error (e.g. access to an unmapped address). Logs the
/// stacked exception frame and halts; there is no fault recovery story here
/// (`spec.md` §7).
#[cortex_m_rt::exception]
unsafe fn HardFault(frame: &cortex_m_rt::ExceptionFrame) -> ! {
    defmt::error!("HardFault: {}", defmt::Debug2Format(frame));
    loop {
        wait_for_interrupt();
    }
}

/// Escalates from a misaligned access, divide-by-zero, or invalid
/// instruction once `SHCSR.USGFAULTENA` is set.
#[cortex_m_rt::exception]
unsafe fn UsageFault() {
    defmt::error!("UsageFault");
    loop {
        wait_for_interrupt();
    }
}

/// Escalates from a bus error on an instruction or data access once
/// `SHCSR.BUSFAULTENA` is set.
#[cortex_m_rt::exception]
unsafe fn BusFault() {
    defmt::error!("BusFault");
    loop {
        wait_for_interrupt();
    }
}
