//! # Scheduler
//!
//! Holds the fixed-size TCB table and the kernel-global scheduling state,
//! and implements Earliest-Deadline-First selection over it.
//!
//! ## Scheduling algorithm
//!
//! At each `PendSV` entry:
//! 1. Save the outgoing task's stack pointer, demote it to `Ready` if it
//!    was `Running`.
//! 2. [`Scheduler::schedule`] picks the `Ready` task with the smallest
//!    `remaining_time`, ties broken by lowest TID; falls back to the idle
//!    task if none is ready.
//! 3. Mark the incoming task `Running`, restore its stack pointer.
//!
//! At each `SysTick` entry, [`Scheduler::tick`] decrements `remaining_time`
//! for every `Ready`/`Running` user task (reloading it from `deadline` on
//! wraparound) and `remaining_sleep_time` for every `Sleeping` one, waking a
//! sleeper the same tick its sleep counter reaches zero.

use core::ptr::NonNull;

use crate::config::{Tid, IDLE_TID, MAX_TASKS, NO_TASK};
use crate::task::{TaskControlBlock, TaskState};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Kernel-global scheduling state: the TCB table plus the bookkeeping the
/// original spec keeps alongside it (`running_task`, `num_running_tasks`,
/// `is_running`, `initialized`).
pub struct Scheduler {
    /// Fixed-size TCB table. Slot `IDLE_TID` (0) is the idle task.
    pub tasks: [TaskControlBlock; MAX_TASKS],
    /// TID of the task currently on the CPU. Meaningful only while
    /// `is_running`.
    pub running_task: Tid,
    /// Count of non-dormant tasks, idle included — starts at 1 once
    /// [`Scheduler::init`] creates the idle task.
    pub num_running_tasks: usize,
    /// Set by [`Scheduler::init`]; guards every other kernel entry point.
    pub initialized: bool,
    /// Set by `kernel::start`; before this, a requested context switch is a
    /// no-op (`spec.md` §4.4).
    pub is_running: bool,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            running_task: NO_TASK,
            num_running_tasks: 0,
            initialized: false,
            is_running: false,
        }
    }

    /// Reset every slot to dormant and create the idle task. The idle
    /// task's stack is attached later, by `kernel::mem_init`, once the
    /// allocator exists (see `DESIGN.md`).
    pub fn init(&mut self) {
        self.tasks = [TaskControlBlock::EMPTY; MAX_TASKS];
        self.tasks[IDLE_TID as usize].tid = IDLE_TID;
        self.tasks[IDLE_TID as usize].state = TaskState::Ready;
        self.tasks[IDLE_TID as usize].entry = Some(idle_entry);
        self.running_task = IDLE_TID;
        self.num_running_tasks = 1;
        self.initialized = true;
        self.is_running = false;
    }

    /// Attach a heap-allocated stack to an already-registered slot. Used
    /// both for the idle task (by `kernel::mem_init`) and for freshly
    /// created user tasks (by [`Scheduler::create_task`]).
    fn attach_stack(
        &mut self,
        tid: Tid,
        stack_size: usize,
        stack_base: NonNull<u8>,
        stack_high: usize,
        sp: *mut u32,
    ) {
        let tcb = &mut self.tasks[tid as usize];
        tcb.stack_size = stack_size;
        tcb.stack_base = Some(stack_base);
        tcb.stack_high = stack_high;
        tcb.sp = sp;
    }

    /// Finish attaching the idle task's stack once the allocator is up.
    pub fn attach_idle_stack(
        &mut self,
        stack_size: usize,
        stack_base: NonNull<u8>,
        stack_high: usize,
        sp: *mut u32,
    ) {
        self.attach_stack(IDLE_TID, stack_size, stack_base, stack_high, sp);
    }

    /// First free (dormant) user slot, TID `1..MAX_TASKS`, or `None` if the
    /// table is full.
    fn free_slot(&self) -> Option<Tid> {
        (1..MAX_TASKS).find(|&i| self.tasks[i].is_dormant()).map(|i| i as Tid)
    }

    /// Register a new, already-allocated task. The caller (`kernel.rs`) is
    /// responsible for the stack allocation and ownership transfer; this
    /// just fills in the slot and reports whether the new task is more
    /// urgent than whichever task is currently running.
    #[allow(clippy::too_many_arguments)]
    pub fn register_task(
        &mut self,
        entry: extern "C" fn(*mut u8),
        arg: *mut u8,
        deadline: u32,
        stack_size: usize,
        stack_base: NonNull<u8>,
        stack_high: usize,
        sp: *mut u32,
    ) -> Option<(Tid, bool)> {
        let tid = self.free_slot()?;
        let tcb = &mut self.tasks[tid as usize];
        tcb.tid = tid;
        tcb.state = TaskState::Ready;
        tcb.entry = Some(entry);
        tcb.arg = arg;
        tcb.deadline = deadline;
        tcb.remaining_time = deadline;
        tcb.remaining_sleep_time = 0;
        self.attach_stack(tid, stack_size, stack_base, stack_high, sp);

        self.num_running_tasks += 1;
        let running_remaining = self.tasks[self.running_task as usize].remaining_time;
        let switch_needed = self.is_running && deadline < running_remaining;
        Some((tid, switch_needed))
    }

    /// Apply a new deadline to `tid`, reporting whether the running task
    /// should now be preempted. Caller validates `tid`/`deadline`/ownership
    /// preconditions and brackets this in a critical section.
    pub fn retarget_deadline(&mut self, tid: Tid, deadline: u32) -> bool {
        let tcb = &mut self.tasks[tid as usize];
        tcb.deadline = deadline;
        tcb.remaining_time = deadline;
        let running_remaining = self.tasks[self.running_task as usize].remaining_time;
        self.is_running && deadline < running_remaining
    }

    /// Tear down the running task's slot (`task_exit`). Caller has already
    /// freed its stack.
    pub fn retire_running(&mut self) {
        let tid = self.running_task;
        self.tasks[tid as usize] = TaskControlBlock::EMPTY;
        self.num_running_tasks -= 1;
    }

    /// Reset the running task's `remaining_time` to its full deadline
    /// (`yield`).
    pub fn yield_current(&mut self) {
        let tid = self.running_task;
        let deadline = self.tasks[tid as usize].deadline;
        self.tasks[tid as usize].remaining_time = deadline;
    }

    /// Put the running task to sleep for `ms` (`sleep`). No-op for `ms ==
    /// 0`.
    pub fn sleep_current(&mut self, ms: u32) {
        if ms == 0 {
            return;
        }
        let tid = self.running_task;
        self.tasks[tid as usize].state = TaskState::Sleeping;
        self.tasks[tid as usize].remaining_sleep_time = ms;
    }

    /// Put the running task to sleep for the remainder of its current
    /// period (`period_yield`).
    pub fn period_yield_current(&mut self) {
        let tid = self.running_task;
        let remaining = self.tasks[tid as usize].remaining_time;
        self.tasks[tid as usize].state = TaskState::Sleeping;
        self.tasks[tid as usize].remaining_sleep_time = remaining;
    }

    // -----------------------------------------------------------------------
    // EDF selection
    // -----------------------------------------------------------------------

    /// Pick the `Ready` user task (TID `1..MAX_TASKS`) with the smallest
    /// `remaining_time`, ties broken by lowest TID. Falls back to the idle
    /// task if none is ready. A pure read of the table — no side effects.
    pub fn schedule(&self) -> Tid {
        let mut best: Option<(Tid, u32)> = None;
        for i in 1..MAX_TASKS {
            let tcb = &self.tasks[i];
            if !tcb.is_runnable() {
                continue;
            }
            match best {
                Some((_, best_remaining)) if tcb.remaining_time >= best_remaining => {}
                _ => best = Some((i as Tid, tcb.remaining_time)),
            }
        }
        best.map(|(tid, _)| tid).unwrap_or(IDLE_TID)
    }

    /// `PendSV` step 1-2: save the outgoing PSP, demote `Running` to
    /// `Ready`.
    pub fn save_outgoing(&mut self, psp: *mut u32) {
        let tid = self.running_task;
        self.tasks[tid as usize].sp = psp;
        if self.tasks[tid as usize].state == TaskState::Running {
            self.tasks[tid as usize].state = TaskState::Ready;
        }
    }

    /// `PendSV` step 3-5: select the incoming task, mark it `Running`,
    /// return its saved PSP.
    pub fn select_incoming(&mut self) -> *mut u32 {
        let next = self.schedule();
        self.running_task = next;
        self.tasks[next as usize].state = TaskState::Running;
        self.tasks[next as usize].sp
    }

    // -----------------------------------------------------------------------
    // Tick accounting
    // -----------------------------------------------------------------------

    /// Advance every non-dormant user task's deadline/sleep counters by one
    /// tick (`spec.md` §4.5). The idle task never participates.
    pub fn tick(&mut self) {
        for i in 1..MAX_TASKS {
            let tcb = &mut self.tasks[i];
            match tcb.state {
                TaskState::Ready | TaskState::Running => {
                    if tcb.remaining_time == 0 {
                        tcb.remaining_time = tcb.deadline;
                    } else {
                        tcb.remaining_time -= 1;
                    }
                }
                TaskState::Sleeping => {
                    if tcb.remaining_sleep_time > 0 {
                        tcb.remaining_sleep_time -= 1;
                    }
                    if tcb.remaining_sleep_time == 0 {
                        tcb.state = TaskState::Ready;
                        tcb.remaining_time = tcb.deadline.saturating_sub(1);
                    }
                }
                TaskState::Dormant => {}
            }
        }
    }
}

/// The idle task: always runnable, never selected by EDF ordering, simply
/// waits for the next interrupt.
pub(crate) extern "C" fn idle_entry(_arg: *mut u8) {
    loop {
        crate::arch::cortex_m4::wait_for_interrupt();
    }
}

// ---------------------------------------------------------------------------
// Stack bootstrap
// ---------------------------------------------------------------------------

/// Bootstrap an initial exception frame at the top of a freshly allocated
/// stack, so the first dispatch of this task can pop it as if returning
/// from an exception.
///
/// ## Stack layout (top = high address, growing down)
///
/// ```text
/// [Hardware-stacked frame]   <- `sp` points here after bootstrap
///   xPSR  (0x0100_0000, Thumb bit set)
///   PC    (task entry point)
///   LR    (marker; the task never returns)
///   R12   (marker)
///   R3    (marker)
///   R2    (marker)
///   R1    (marker)
///   R0    (arg)
/// [Software-saved context]
///   R11   (marker)
///   R10   (marker)
///   R9    (marker)
///   R8    (marker)
///   R7    (marker)
///   R6    (marker)
///   R5    (marker)
///   R4    (marker)
/// ```
///
/// Returns `(sp, stack_high)`.
///
/// # Safety
/// `stack_base` must be a valid, owned, `stack_size`-byte region with no
/// live references; this function takes raw write access to the whole
/// region's top 16 words.
pub unsafe fn bootstrap_stack(
    stack_base: NonNull<u8>,
    stack_size: usize,
    entry: extern "C" fn(*mut u8),
    arg: *mut u8,
) -> (*mut u32, usize) {
    const MARKER: u32 = 0xA0A0_A0A0;

    let stack_high = stack_base.as_ptr() as usize + stack_size;
    let aligned_high = stack_high & !0x07;
    let frame = (aligned_high - 16 * 4) as *mut u32;

    // Software-saved R4-R11.
    for i in 0..8 {
        *frame.add(i) = MARKER;
    }
    // Hardware-stacked R0-R3, R12, LR, PC, xPSR.
    *frame.add(8) = arg as u32; // R0: task argument
    *frame.add(9) = MARKER; // R1
    *frame.add(10) = MARKER; // R2
    *frame.add(11) = MARKER; // R3
    *frame.add(12) = MARKER; // R12
    *frame.add(13) = MARKER; // LR
    *frame.add(14) = entry as usize as u32; // PC
    *frame.add(15) = 0x0100_0000; // xPSR, Thumb bit set

    (frame, stack_high)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ready(sched: &mut Scheduler, tid: Tid, remaining: u32) {
        sched.tasks[tid as usize].tid = tid;
        sched.tasks[tid as usize].state = TaskState::Ready;
        sched.tasks[tid as usize].deadline = remaining;
        sched.tasks[tid as usize].remaining_time = remaining;
    }

    extern "C" fn dummy_entry(_arg: *mut u8) {}

    #[test]
    fn register_task_fills_all_user_slots_then_rejects() {
        let mut sched = Scheduler::new();
        sched.init();
        let stack = NonNull::dangling();

        // TIDs 1..MAX_TASKS-1 are user slots: MAX_TASKS - 1 of them.
        for _ in 0..(MAX_TASKS - 1) {
            let result = sched.register_task(
                dummy_entry,
                core::ptr::null_mut(),
                5,
                512,
                stack,
                512,
                core::ptr::null_mut(),
            );
            assert!(result.is_some());
        }
        assert_eq!(sched.num_running_tasks, MAX_TASKS);

        let rejected = sched.register_task(
            dummy_entry,
            core::ptr::null_mut(),
            5,
            512,
            stack,
            512,
            core::ptr::null_mut(),
        );
        assert!(rejected.is_none());
    }

    #[test]
    fn schedule_falls_back_to_idle_when_nothing_ready() {
        let sched = Scheduler::new();
        assert_eq!(sched.schedule(), IDLE_TID);
    }

    #[test]
    fn schedule_picks_smallest_remaining_time() {
        let mut sched = Scheduler::new();
        make_ready(&mut sched, 1, 10);
        make_ready(&mut sched, 2, 3);
        make_ready(&mut sched, 3, 7);
        assert_eq!(sched.schedule(), 2);
    }

    #[test]
    fn schedule_breaks_ties_by_lowest_tid() {
        let mut sched = Scheduler::new();
        make_ready(&mut sched, 3, 5);
        make_ready(&mut sched, 1, 5);
        make_ready(&mut sched, 2, 5);
        assert_eq!(sched.schedule(), 1);
    }

    #[test]
    fn schedule_ignores_sleeping_and_dormant_tasks() {
        let mut sched = Scheduler::new();
        make_ready(&mut sched, 1, 1);
        sched.tasks[1].state = TaskState::Sleeping;
        make_ready(&mut sched, 2, 2);
        assert_eq!(sched.schedule(), 2);
    }

    #[test]
    fn tick_decrements_ready_remaining_time_and_wraps_to_deadline() {
        let mut sched = Scheduler::new();
        make_ready(&mut sched, 1, 1);
        sched.tick();
        assert_eq!(sched.tasks[1].remaining_time, 0);
        sched.tick();
        assert_eq!(sched.tasks[1].remaining_time, sched.tasks[1].deadline);
    }

    #[test]
    fn sleep_wakes_after_exactly_remaining_sleep_time_ticks() {
        let mut sched = Scheduler::new();
        make_ready(&mut sched, 1, 20);
        sched.tasks[1].state = TaskState::Sleeping;
        sched.tasks[1].remaining_sleep_time = 5;
        for _ in 0..4 {
            sched.tick();
            assert_eq!(sched.tasks[1].state, TaskState::Sleeping);
        }
        sched.tick();
        assert_eq!(sched.tasks[1].state, TaskState::Ready);
        assert_eq!(sched.tasks[1].remaining_time, sched.tasks[1].deadline - 1);
    }

    #[test]
    fn yield_resets_remaining_time_to_deadline() {
        let mut sched = Scheduler::new();
        sched.init();
        make_ready(&mut sched, 1, 10);
        sched.tasks[1].deadline = 10;
        sched.tasks[1].remaining_time = 2;
        sched.running_task = 1;
        sched.yield_current();
        assert_eq!(sched.tasks[1].remaining_time, 10);
    }

    #[test]
    fn period_yield_sleeps_for_current_remaining_time() {
        let mut sched = Scheduler::new();
        make_ready(&mut sched, 1, 10);
        sched.tasks[1].remaining_time = 4;
        sched.running_task = 1;
        sched.period_yield_current();
        assert_eq!(sched.tasks[1].state, TaskState::Sleeping);
        assert_eq!(sched.tasks[1].remaining_sleep_time, 4);
    }
}
