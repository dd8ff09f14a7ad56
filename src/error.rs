//! Kernel error types — recoverable errors and fatal halts
//!
//! Once a fatal error is recorded every later call reports it again.
//!
//! Author: Tern-RTOS contributors

use core::fmt;

use crate::heap::HeapError;
use crate::task::TaskId;

/// Errors returned by kernel operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Arena or task table exhausted while creating a task or primitive
    ResourceExhausted,
    /// A blocking call's deadline elapsed before it was satisfied
    TimedOut,
    /// A non-blocking call could not complete immediately
    WouldBlock,
    /// Queue full, or counting semaphore already at its maximum
    Overflow,
    /// Mutex released by a task that does not own it
    NotOwner,
    /// Owner re-locked a non-recursive mutex
    Deadlock,
    /// The object a task was waiting on was deleted
    Deleted,
    /// Unknown or already deleted task, queue or semaphore
    InvalidHandle,
    /// Priority outside the configured range
    InvalidPriority,
    /// Argument rejected (item size, stack size, object kind)
    InvalidArgument,
    /// Operation needs a running task but the scheduler has not started
    NotStarted,
    /// `start` called twice
    AlreadyStarted,
    /// The kernel has halted
    Fatal(FatalError),
}

/// Unrecoverable conditions that halt scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    /// Stack guard of the given task was found corrupted at a context switch
    StackOverflow(TaskId),
    /// Internal bookkeeping inconsistency
    InvariantViolation(&'static str),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExhausted => write!(f, "kernel resources exhausted"),
            Self::TimedOut => write!(f, "timed out"),
            Self::WouldBlock => write!(f, "operation would block"),
            Self::Overflow => write!(f, "capacity exceeded"),
            Self::NotOwner => write!(f, "caller does not own the mutex"),
            Self::Deadlock => write!(f, "non-recursive mutex re-locked by its owner"),
            Self::Deleted => write!(f, "object deleted while waiting"),
            Self::InvalidHandle => write!(f, "invalid handle"),
            Self::InvalidPriority => write!(f, "priority out of range"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NotStarted => write!(f, "scheduler not started"),
            Self::AlreadyStarted => write!(f, "scheduler already started"),
            Self::Fatal(fatal) => write!(f, "kernel halted: {fatal}"),
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackOverflow(task) => write!(f, "stack overflow in task {}", task.as_u32()),
            Self::InvariantViolation(what) => write!(f, "invariant violated: {what}"),
        }
    }
}

impl From<FatalError> for KernelError {
    fn from(fatal: FatalError) -> Self {
        KernelError::Fatal(fatal)
    }
}

impl From<HeapError> for KernelError {
    fn from(err: HeapError) -> Self {
        match err {
            HeapError::OutOfMemory => KernelError::ResourceExhausted,
            HeapError::ZeroSize => KernelError::InvalidArgument,
            HeapError::InvalidFree => {
                KernelError::Fatal(FatalError::InvariantViolation("invalid free"))
            }
        }
    }
}

impl KernelError {
    /// True for errors that halt the kernel
    pub fn is_fatal(&self) -> bool {
        matches!(self, KernelError::Fatal(_))
    }
}
