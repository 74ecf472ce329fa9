//! # Task Control Block
//!
//! Defines the task model: a fixed-size `TaskControlBlock` per slot, each
//! owning a heap-allocated stack tagged with its TID, scheduled by earliest
//! deadline first (see [`crate::scheduler`]).

use core::ptr::NonNull;

use crate::config::{Tid, DEFAULT_DEADLINE, NO_TASK};

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌─────────┐    schedule()    ┌─────────┐
///   │  Ready  │ ───────────────► │ Running │
///   └─────────┘                  └─────────┘
///        ▲                            │
///        │        tick / yield        │
///        └────────────────────────────┘
///        ▲                            │
///        │         wake()            │ sleep() / period_yield()
///        │                            ▼
///        └──────────────────────  Sleeping
/// ```
///
/// `Dormant` is the state of a free slot and of an exited task; it is not
/// reachable from any other state except via `task_exit` or an unused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum TaskState {
    /// Slot unused, or the task that occupied it has exited.
    Dormant,
    /// Runnable, waiting to be picked by the scheduler.
    Ready,
    /// Currently executing on the CPU.
    Running,
    /// Blocked on a timer (`sleep`) or period boundary (`period_yield`).
    Sleeping,
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block — the central per-task record.
///
/// TCBs live in a fixed array inside [`crate::scheduler::Scheduler`] — no
/// heap allocation for the table itself. Each non-dormant TCB owns exactly
/// one stack block allocated from [`crate::mem`] and tagged with its `tid`.
#[derive(Clone, Copy)]
pub struct TaskControlBlock {
    /// This slot's task identifier. Equal to the slot's table index once a
    /// task has been created there.
    pub tid: Tid,

    /// Current execution state.
    pub state: TaskState,

    /// Task entry function, `None` for a dormant slot.
    pub entry: Option<extern "C" fn(*mut u8)>,

    /// Argument pointer passed to `entry` on first dispatch.
    pub arg: *mut u8,

    /// Requested stack size in bytes (multiple of 8, at least
    /// `config::STACK_SIZE`).
    pub stack_size: usize,

    /// Base of the heap-allocated stack region (the allocator's payload
    /// pointer). `None` while dormant.
    pub stack_base: Option<NonNull<u8>>,

    /// Address immediately past the end of the stack region
    /// (`stack_base + stack_size`).
    pub stack_high: usize,

    /// Saved process stack pointer while this task is not running. Points
    /// inside `[stack_base, stack_high)` at a valid saved exception frame.
    pub sp: *mut u32,

    /// Deadline in ms. Positive for every non-dormant user task; unused by
    /// the idle task.
    pub deadline: u32,

    /// Ms remaining until this task's deadline; the EDF scheduling key.
    /// Reset to `deadline` on yield, wake, or tick wraparound.
    pub remaining_time: u32,

    /// Ms remaining while `Sleeping`; decremented each tick.
    pub remaining_sleep_time: u32,
}

// Safety: `sp`/`stack_base`/`arg` are raw pointers into this task's own
// heap-allocated stack. All TCB table access happens inside a critical
// section or from within an exception handler (see `sync::critical_section`
// and `spec.md` §5), so there is no concurrent unsynchronized access.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// A dormant (free) slot, suitable as the fixed-size table's fill value.
    pub const EMPTY: TaskControlBlock = TaskControlBlock::empty();

    /// A dormant (free) slot with no owned memory.
    pub const fn empty() -> Self {
        Self {
            tid: NO_TASK,
            state: TaskState::Dormant,
            entry: None,
            arg: core::ptr::null_mut(),
            stack_size: 0,
            stack_base: None,
            stack_high: 0,
            sp: core::ptr::null_mut(),
            deadline: DEFAULT_DEADLINE,
            remaining_time: DEFAULT_DEADLINE,
            remaining_sleep_time: 0,
        }
    }

    /// `true` for a task the scheduler may select: non-dormant and `Ready`.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.state == TaskState::Ready
    }

    /// `true` once this slot is a free/exited slot.
    #[inline]
    pub fn is_dormant(&self) -> bool {
        self.state == TaskState::Dormant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slot_is_dormant_and_owns_nothing() {
        let tcb = TaskControlBlock::empty();
        assert!(tcb.is_dormant());
        assert!(!tcb.is_runnable());
        assert!(tcb.stack_base.is_none());
        assert_eq!(tcb.tid, NO_TASK);
    }

    #[test]
    fn runnable_only_when_ready() {
        let mut tcb = TaskControlBlock::empty();
        tcb.state = TaskState::Running;
        assert!(!tcb.is_runnable());
        tcb.state = TaskState::Ready;
        assert!(tcb.is_runnable());
        tcb.state = TaskState::Sleeping;
        assert!(!tcb.is_runnable());
    }
}
