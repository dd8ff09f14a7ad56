//! Task definition — control block, identity, priority and state
//!
//! Each task owns two arena blocks: a fixed stack and a mailbox slot.
//!
//! Author: Tern-RTOS contributors

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::config::NAME_LEN;
use crate::heap::Block;
use crate::port::Context;
use crate::queue::QueueId;
use crate::semaphore::SemaphoreId;
use crate::tick::Tick;

/// Task entry point, run once on the task's own stack
pub type TaskEntry = Box<dyn FnOnce() + Send + 'static>;

/// Unique task identifier, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u32);

impl TaskId {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        TaskId(raw)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Task priority (higher number = more urgent)
///
/// Level 0 is shared with the idle task, which only runs when nothing
/// else is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskPriority(pub u8);

impl TaskPriority {
    /// Idle level
    pub const IDLE: TaskPriority = TaskPriority(0);
    /// Logging, telemetry
    pub const LOW: TaskPriority = TaskPriority(1);
    /// Sensor processing
    pub const NORMAL: TaskPriority = TaskPriority(2);
    /// Motion control
    pub const HIGH: TaskPriority = TaskPriority(3);
    /// Hard deadlines
    pub const CRITICAL: TaskPriority = TaskPriority(4);

    pub fn level(&self) -> usize {
        self.0 as usize
    }
}

/// Task execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// In a ready list, waiting for the CPU
    Ready,
    /// Currently executing
    Running,
    /// Waiting for a primitive or a delay
    Blocked,
    /// Parked until explicitly resumed
    Suspended,
    /// Deleted or exited; memory reclaimed at idle time
    Terminated,
}

/// What a blocked task is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    /// Plain delay, woken only by its deadline
    Delay,
    /// Room in a full queue
    QueueSend(QueueId),
    /// An item from an empty queue
    QueueReceive(QueueId),
    /// A semaphore count or mutex ownership
    Semaphore(SemaphoreId),
}

/// How the last wait of a task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The wait condition was met
    Satisfied,
    /// The deadline elapsed first, or the wait was abandoned by suspension
    TimedOut,
    /// The object was deleted while waited on
    Deleted,
}

/// Task control block
pub struct Task {
    pub(crate) id: TaskId,
    /// Task name (NAME_LEN bytes, zero padded)
    pub(crate) name: [u8; NAME_LEN],
    /// Priority set at creation or via `set_priority`
    pub(crate) base_priority: TaskPriority,
    /// Priority used for scheduling, raised by inheritance
    pub(crate) priority: TaskPriority,
    pub(crate) state: TaskState,
    /// Stack region in the arena
    pub(crate) stack: Block,
    /// Arena part of the control block: a one-item mailbox slot holding a
    /// blocked sender's item or one handed to a blocked receiver
    pub(crate) record: Block,
    /// Saved context
    pub(crate) context: Context,
    /// Absolute tick at which a blocked task times out
    pub(crate) wake_at: Option<Tick>,
    pub(crate) blocked_on: Option<WaitTarget>,
    pub(crate) outcome: Option<WaitOutcome>,
    /// Length of the item in the mailbox slot, if one is there
    pub(crate) mailbox: Option<usize>,
    /// Mutexes currently owned, in lock order
    pub(crate) held: Vec<SemaphoreId>,
    /// Times this task was switched in
    pub(crate) dispatch_count: u32,
    /// Ticks during which this task was running
    pub(crate) run_ticks: u64,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        name: &str,
        priority: TaskPriority,
        stack: Block,
        record: Block,
        context: Context,
    ) -> Self {
        Self {
            id,
            name: encode_name(name),
            base_priority: priority,
            priority,
            state: TaskState::Ready,
            stack,
            record,
            context,
            wake_at: None,
            blocked_on: None,
            outcome: None,
            mailbox: None,
            held: Vec::new(),
            dispatch_count: 0,
            run_ticks: 0,
        }
    }

    /// Task id
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Task name, truncated at a character boundary to NAME_LEN bytes
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn base_priority(&self) -> TaskPriority {
        self.base_priority
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    pub fn blocked_on(&self) -> Option<WaitTarget> {
        self.blocked_on
    }

    pub fn dispatch_count(&self) -> u32 {
        self.dispatch_count
    }

    pub fn run_ticks(&self) -> u64 {
        self.run_ticks
    }

    /// True while the effective priority is raised above the base priority
    pub fn is_boosted(&self) -> bool {
        self.priority > self.base_priority
    }
}

fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut out = [0u8; NAME_LEN];
    let mut len = name.len().min(NAME_LEN);
    while !name.is_char_boundary(len) {
        len -= 1;
    }
    out[..len].copy_from_slice(&name.as_bytes()[..len]);
    out
}
