//! # Kernel
//!
//! Top-level kernel state and the public API: task lifecycle, the EDF
//! scheduler's entry points, and the buddy allocator. Every public function
//! here brackets its mutation of the global [`Scheduler`]/[`BuddyAllocator`]
//! in a critical section or, for the scheduler's own internals, runs from
//! inside an exception handler — see `spec.md` §5.
//!
//! ## Startup sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← TCB table, idle task, IRQ priorities
//!         ├─► kernel::mem_init()    ← buddy allocator + idle task's stack
//!         ├─► kernel::create_task() ← register application tasks (×N)
//!         └─► kernel::start()       ← launch scheduler, never returns
//! ```

use crate::arch::cortex_m4;
use crate::config::{Tid, IDLE_TID, MAX_TASKS, STACK_SIZE};
use crate::error::{KernelError, KernelResult, MemResult};
use crate::mem::BuddyAllocator;
use crate::scheduler::{bootstrap_stack, Scheduler};
use crate::sync;
use crate::task::TaskControlBlock;

// ---------------------------------------------------------------------------
// Global kernel state
// ---------------------------------------------------------------------------

/// Global scheduler instance — the TCB table plus scheduling bookkeeping.
///
/// # Safety
/// All access is through [`sync::critical_section`] or from exception
/// handler context (where interrupt priority ordering already serializes
/// access — `spec.md` §5).
static mut SCHEDULER: Scheduler = Scheduler::new();

/// Global buddy allocator instance.
///
/// # Safety
/// Per `spec.md` §5, only ever called from task context (never from an
/// interrupt) and, for the deallocation/ownership-checked path, from
/// within [`sync::critical_section`].
static mut MEM: BuddyAllocator = BuddyAllocator::new();

#[inline]
fn scheduler() -> &'static mut Scheduler {
    unsafe { &mut *core::ptr::addr_of_mut!(SCHEDULER) }
}

#[inline]
fn mem() -> &'static mut BuddyAllocator {
    unsafe { &mut *core::ptr::addr_of_mut!(MEM) }
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel. Must precede every other kernel or allocator
/// call. Resets the TCB table, creates the idle task, and orders the
/// `SVCall > SysTick > PendSV` exception priorities.
pub fn init() {
    sync::critical_section(|_cs| {
        scheduler().init();
    });
    cortex_m4::set_interrupt_priorities();
}

/// Initialize the buddy allocator and attach a heap-allocated stack to the
/// idle task. May be called exactly once, after [`init`].
pub fn mem_init() -> KernelResult {
    sync::critical_section(|_cs| {
        let sched = scheduler();
        if !sched.initialized {
            return Err(KernelError::NotInitialized);
        }
        if !mem().init() {
            return Err(KernelError::AlreadyInitialized);
        }
        let stack = mem()
            .alloc(STACK_SIZE, IDLE_TID)
            .ok_or(KernelError::OutOfMemory)?;
        let (sp, stack_high) = unsafe {
            bootstrap_stack(
                stack,
                STACK_SIZE,
                crate::scheduler::idle_entry,
                core::ptr::null_mut(),
            )
        };
        sched.attach_idle_stack(STACK_SIZE, stack, stack_high, sp);
        Ok(())
    })
}

/// Create a task with the default deadline (5 ms).
pub fn create_task(
    entry: extern "C" fn(*mut u8),
    arg: *mut u8,
    stack_size: usize,
) -> KernelResult<Tid> {
    create_deadline_task(crate::config::DEFAULT_DEADLINE, entry, arg, stack_size)
}

/// Create a task with an explicit deadline in ms.
pub fn create_deadline_task(
    deadline: u32,
    entry: extern "C" fn(*mut u8),
    arg: *mut u8,
    stack_size: usize,
) -> KernelResult<Tid> {
    if deadline == 0 {
        return Err(KernelError::InvalidDeadline);
    }
    if stack_size < STACK_SIZE {
        return Err(KernelError::StackTooSmall);
    }

    let outcome = sync::critical_section(|_cs| {
        let sched = scheduler();
        if !sched.initialized {
            return Err(KernelError::NotInitialized);
        }
        if sched.num_running_tasks >= MAX_TASKS {
            return Err(KernelError::TaskTableFull);
        }

        let creator = sched.running_task;
        let stack = mem().alloc(stack_size, creator).ok_or_else(|| {
            defmt::warn!("create_deadline_task: out of memory for {=usize}-byte stack", stack_size);
            KernelError::OutOfMemory
        })?;

        let (tid, switch_needed) = {
            let sp_and_high = unsafe { bootstrap_stack(stack, stack_size, entry, arg) };
            match sched.register_task(entry, arg, deadline, stack_size, stack, sp_and_high.1, sp_and_high.0) {
                Some(result) => result,
                None => {
                    mem().dealloc(stack.as_ptr(), creator).ok();
                    return Err(KernelError::TaskTableFull);
                }
            }
        };
        mem().transfer(stack.as_ptr(), tid);
        defmt::debug!("created task {=u8} with deadline {=u32}ms", tid, deadline);
        Ok((tid, switch_needed))
    });

    let (tid, switch_needed) = outcome?;
    if switch_needed {
        cortex_m4::pend_context_switch();
    }
    Ok(tid)
}

/// Launch the scheduler. Requires at least one user task. Never returns on
/// success.
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> KernelError {
    let first_sp = match sync::critical_section(|_cs| {
        let sched = scheduler();
        if !sched.initialized {
            return Err(KernelError::NotInitialized);
        }
        if sched.num_running_tasks <= 1 {
            return Err(KernelError::NoTasksCreated);
        }
        let first = sched.schedule();
        sched.running_task = first;
        sched.tasks[first as usize].state = crate::task::TaskState::Running;
        sched.is_running = true;
        Ok(sched.tasks[first as usize].sp as *const u32)
    }) {
        Ok(sp) => sp,
        Err(e) => return e,
    };

    cortex_m4::configure_systick(&mut core_peripherals.SYST);
    cortex_m4::set_interrupt_priorities();

    defmt::info!("starting first task, sp @ 0x{=usize:08x}", first_sp as usize);
    unsafe { cortex_m4::enter_first_task(first_sp) }
}

/// Voluntarily yield the CPU, resetting the caller's `remaining_time` to
/// its full deadline first. No effect if the kernel is not started.
pub fn yield_task() {
    let switch_needed = sync::critical_section(|_cs| {
        let sched = scheduler();
        if !sched.is_running {
            return false;
        }
        sched.yield_current();
        true
    });
    if switch_needed {
        cortex_m4::pend_context_switch();
    }
}

/// Sleep for the remainder of the caller's current period; the tick
/// handler wakes it and replenishes `remaining_time` when the period
/// elapses.
pub fn period_yield() {
    sync::critical_section(|_cs| {
        scheduler().period_yield_current();
    });
    cortex_m4::pend_context_switch();
}

/// Sleep the caller for `ms` milliseconds. No-op for `ms == 0`.
pub fn sleep(ms: u32) {
    if ms == 0 {
        return;
    }
    sync::critical_section(|_cs| {
        scheduler().sleep_current(ms);
    });
    cortex_m4::pend_context_switch();
}

/// Exit the calling task. Frees its stack, marks its slot dormant, and
/// requests a final context switch. Never returns on success; returns an
/// error (without switching away) if called from the idle task or before
/// the kernel is running.
pub fn task_exit() -> KernelError {
    let failure = sync::critical_section(|_cs| -> Option<KernelError> {
        let sched = scheduler();
        if !sched.is_running {
            return Some(KernelError::NotRunning);
        }
        if sched.running_task == IDLE_TID {
            return Some(KernelError::CalledFromIdle);
        }
        let tid = sched.running_task;
        if let Some(base) = sched.tasks[tid as usize].stack_base {
            // Owner check always succeeds: this task owns its own stack.
            let _ = mem().dealloc(base.as_ptr(), tid);
        }
        sched.retire_running();
        defmt::debug!("task {=u8} exited", tid);
        None
    });

    if let Some(e) = failure {
        return e;
    }
    cortex_m4::pend_context_switch();
    loop {
        cortex_m4::wait_for_interrupt();
    }
}

/// Copy the named task's TCB into `out`. Fails if no such non-dormant task
/// exists.
pub fn task_info(tid: Tid, out: &mut TaskControlBlock) -> KernelResult {
    sync::critical_section(|_cs| {
        let sched = scheduler();
        if (tid as usize) >= MAX_TASKS || sched.tasks[tid as usize].is_dormant() {
            return Err(KernelError::NoSuchTask);
        }
        *out = sched.tasks[tid as usize];
        Ok(())
    })
}

/// The running task's TID, or the idle TID if the kernel is not running.
pub fn get_tid() -> Tid {
    sync::critical_section(|_cs| {
        let sched = scheduler();
        if sched.is_running {
            sched.running_task
        } else {
            IDLE_TID
        }
    })
}

/// Atomically retarget a task's deadline. Fails if `deadline == 0`, `tid`
/// is invalid or dormant, or `tid` names the running task.
pub fn set_deadline(deadline: u32, tid: Tid) -> KernelResult {
    if deadline == 0 {
        return Err(KernelError::InvalidDeadline);
    }
    let switch_needed = sync::critical_section(|_cs| {
        let sched = scheduler();
        if tid == IDLE_TID || (tid as usize) >= MAX_TASKS || sched.tasks[tid as usize].is_dormant()
        {
            return Err(KernelError::NoSuchTask);
        }
        if tid == sched.running_task {
            return Err(KernelError::DeadlineTargetRunning);
        }
        Ok(sched.retarget_deadline(tid, deadline))
    })?;
    if switch_needed {
        cortex_m4::pend_context_switch();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Allocator API
// ---------------------------------------------------------------------------

/// Allocate `size` bytes, owned by the currently running task. Returns null
/// on failure.
pub fn alloc(size: usize) -> *mut u8 {
    let owner = get_tid();
    sync::critical_section(|_cs| mem().alloc(size, owner))
        .map(|p| p.as_ptr())
        .unwrap_or(core::ptr::null_mut())
}

/// Free a block returned by [`alloc`]. Owner-checked against the currently
/// running task.
pub fn dealloc(ptr: *mut u8) -> MemResult {
    let owner = get_tid();
    sync::critical_section(|_cs| mem().dealloc(ptr, owner))
}

/// Count free regions smaller than `size`.
pub fn count_external_fragments(size: usize) -> usize {
    sync::critical_section(|_cs| mem().count_external_fragments(size))
}

// ---------------------------------------------------------------------------
// Exception-handler entry points (called only from `arch::cortex_m4`)
// ---------------------------------------------------------------------------

/// `PendSV` step 1-2.
///
/// # Safety
/// Called only from the `PendSV` handler.
pub unsafe fn on_context_save(psp: *mut u32) {
    scheduler().save_outgoing(psp);
}

/// `PendSV` step 3-5.
///
/// # Safety
/// Called only from the `PendSV` handler.
pub unsafe fn on_context_select() -> *mut u32 {
    scheduler().select_incoming()
}

/// `SysTick` entry point.
///
/// # Safety
/// Called only from the `SysTick` handler.
pub unsafe fn on_tick() {
    scheduler().tick();
}
