//! Tern-RTOS — a small preemptive real-time kernel
//!
//! Fixed-priority scheduling for a single core:
//! - Preemptive priorities with round-robin time slicing among equals
//! - Queues, binary and counting semaphores, mutexes with priority inheritance
//! - Deterministic best-fit arena backing stacks and kernel objects
//! - Deferred wake from interrupt context through an epilogue
//! - Architecture kept behind the `Port` trait; `SimPort` runs on a host
//!
//! Author: Tern-RTOS contributors

#![no_std]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod config;
pub mod error;
pub mod global;
pub mod heap;
pub mod kernel;
pub mod list;
pub mod mutex;
pub mod port;
pub mod queue;
pub mod ring;
pub mod scheduler;
pub mod semaphore;
pub mod task;
pub mod tick;

pub use config::KernelConfig;
pub use error::{FatalError, KernelError};
pub use global::KernelCell;
pub use heap::{Heap, HeapError, HeapStats};
pub use kernel::{Kernel, KernelStats, Outcome};
pub use port::{Context, Port, SimPort};
pub use queue::QueueId;
pub use semaphore::{SemaphoreId, SemaphoreKind};
pub use task::{Task, TaskId, TaskPriority, TaskState};
pub use tick::{Tick, Timeout};
