//! # Kernel configuration
//!
//! Compile-time constants governing the scheduler, the task table, and the
//! buddy allocator. All limits are fixed at compile time — no dynamic
//! allocation of kernel state itself (only task stacks come from the heap).

/// Task identifier. `MAX_TASKS` fits comfortably in a byte.
pub type Tid = u8;

/// Maximum number of tasks the system can manage simultaneously, including
/// the idle task at slot 0. Fixed for ABI compatibility with user code.
pub const MAX_TASKS: usize = 16;

/// TID reserved for the idle task. Always runnable, never participates in
/// EDF ordering.
pub const IDLE_TID: Tid = 0;

/// Sentinel TID meaning "no task" (e.g. an as-yet-unscheduled slot).
pub const NO_TASK: Tid = Tid::MAX;

/// SysTick frequency in Hz. One tick is one millisecond.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default: STM32F4 at 16 MHz HSI), used to
/// derive the SysTick reload value in [`crate::arch::cortex_m4::configure_systick`].
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Minimum task stack size in bytes. Must be a multiple of 8.
pub const STACK_SIZE: usize = 512;

/// Default deadline, in ms, used by [`crate::kernel::create_task`] when the
/// caller does not specify one.
pub const DEFAULT_DEADLINE: u32 = 5;

// ---------------------------------------------------------------------------
// Buddy allocator geometry
// ---------------------------------------------------------------------------

/// log2 of the heap size. Level 0 is the whole heap.
pub const MAX_LEVEL: u32 = 15;

/// log2 of the smallest allocatable block. Must be large enough to hold a
/// [`crate::mem::BlockHeader`] plus 8-byte alignment padding.
pub const MIN_LEVEL: u32 = 5;

/// Total heap size in bytes: `2^MAX_LEVEL`.
pub const HEAP_SIZE: usize = 1 << MAX_LEVEL;

/// Smallest allocatable block size in bytes: `2^MIN_LEVEL`.
pub const MIN_BLOCK_SIZE: usize = 1 << MIN_LEVEL;

/// Number of distinct levels in the buddy tree (`MAX_LEVEL - MIN_LEVEL + 1`).
pub const NUM_LEVELS: usize = (MAX_LEVEL - MIN_LEVEL + 1) as usize;

/// Fixed sentinel byte written into every allocated header, checked before
/// trusting the rest of the header on `dealloc`.
pub const SECRET_KEY: u8 = 0x99;
