//! # edf-kernel
//!
//! A preemptive, priority-driven real-time micro-kernel for ARM Cortex-M4,
//! with an Earliest-Deadline-First scheduler and a power-of-two buddy
//! allocator backing task stacks.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   init() · mem_init() · create_task() · start() · ...   │
//! ├──────────────┬────────────────────┬────────────────────┤
//! │  Scheduler   │   Buddy allocator  │  Sync Primitives   │
//! │  scheduler.rs│   mem.rs           │  sync.rs           │
//! │  ─ tick()    │   ─ alloc()        │  ─ critical_section│
//! │  ─ schedule()│   ─ dealloc()      │                    │
//! │  ─ yield()   │   ─ transfer()     │                    │
//! ├──────────────┴────────────────────┴────────────────────┤
//! │              Task Model (task.rs)                       │
//! │    TCB · TaskState                                      │
//! ├──────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │   SVCall · PendSV · SysTick · Stack bootstrap           │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## EDF scheduling
//!
//! Each non-idle task carries a `deadline` and a `remaining_time` that
//! counts down every 1 ms tick. The scheduler always picks the `Ready` task
//! with the smallest `remaining_time`; ties favor the lowest TID. A task
//! that never reports completion (no `yield`/`sleep`/`period_yield`) simply
//! keeps its slot until preempted by a more urgent one or by the next tick.
//!
//! ## Memory model
//!
//! - TCB table: fixed-size `[TaskControlBlock; MAX_TASKS]`, no heap.
//! - Task stacks: allocated from a single 32 KiB buddy-managed heap
//!   (`mem.rs`), owner-tagged so only the owning task can free its own
//!   stack.
//! - Critical sections: `cortex_m::interrupt::free()` for shared state
//!   (`sync.rs`).

#![no_std]

#[cfg(test)]
extern crate std;

pub mod arch;
pub mod config;
pub mod error;
pub mod kernel;
pub mod mem;
pub mod scheduler;
pub mod sync;
pub mod task;
