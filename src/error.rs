//! # Error types
//!
//! Plain, `#[repr(u32)]` error enums in the style of Hubris's task client
//! APIs (e.g. `task-jefe-api::JefeError`): no payload, no allocation, one
//! variant per precondition or ownership violation named in the kernel's
//! error taxonomy. Every fallible kernel or allocator entry point returns
//! one of these instead of a bare sentinel.

/// Failure reported by a `kernel` entry point. No variant here ever leaves
/// kernel state partially mutated — see each call site's doc comment for
/// the exact precondition being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
#[repr(u32)]
pub enum KernelError {
    /// `kernel::init` has not been called yet.
    NotInitialized = 1,
    /// `mem::init` (or `kernel::init`) was called a second time.
    AlreadyInitialized = 2,
    /// The task table already holds `MAX_TASKS` entries.
    TaskTableFull = 3,
    /// A deadline of zero or less was supplied.
    InvalidDeadline = 4,
    /// The requested stack size is below `config::STACK_SIZE`.
    StackTooSmall = 5,
    /// The buddy allocator could not satisfy the stack allocation.
    OutOfMemory = 6,
    /// No non-dormant task exists with the given TID.
    NoSuchTask = 7,
    /// `set_deadline` was asked to retarget the currently running task.
    DeadlineTargetRunning = 8,
    /// `task_exit` was called from the idle task or outside task context.
    CalledFromIdle = 9,
    /// The kernel has not been started (`kernel::start` not yet called).
    NotRunning = 10,
    /// `kernel::start` was called with no user task registered.
    NoTasksCreated = 11,
}

pub type KernelResult<T = ()> = Result<T, KernelError>;

/// Failure reported by the buddy allocator's `dealloc`. `alloc` instead
/// reports failure as `None`/a null pointer, per `spec.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
#[repr(u32)]
pub enum MemError {
    /// The pointer passed to `dealloc` was null.
    NullPointer = 1,
    /// The byte preceding the header did not match the secret key, or the
    /// header otherwise fails validation.
    InvalidHeader = 2,
    /// The header's `is_allocated` flag was already false (double free).
    NotAllocated = 3,
    /// The header's `owner_tid` does not match the currently running task.
    NotOwner = 4,
}

pub type MemResult<T = ()> = Result<T, MemError>;
