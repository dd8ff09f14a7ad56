//! Kernel configuration — compile-time limits and runtime `KernelConfig`
//!
//! Defaults target a small Cortex-M class part.
//!
//! Author: Tern-RTOS contributors

use crate::error::KernelError;

/// Hard limit on priority levels (one bit per level in the ready bitmap)
pub const MAX_PRIORITIES: u8 = 32;

/// Maximum tasks the kernel can manage, idle task included
pub const MAX_TASKS: usize = 16;

/// Task name length in bytes
pub const NAME_LEN: usize = 16;

/// Bytes at the low end of every stack reserved as an overflow guard
pub const STACK_GUARD_BYTES: usize = 16;

/// Fill byte for fresh stacks; the guard zone must still hold it at every switch
pub const STACK_FILL_BYTE: u8 = 0xA5;

/// Smallest stack that holds the guard zone and a `frame_size` byte frame
pub const fn stack_floor(frame_size: usize) -> usize {
    STACK_GUARD_BYTES + frame_size
}

/// Runtime kernel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Tick interrupt frequency
    pub tick_hz: u32,
    /// Number of priority levels; valid priorities are `0..priorities`
    pub priorities: u8,
    /// Task table size, idle task included
    pub max_tasks: usize,
    /// Arena size backing stacks, task mailboxes and queue storage
    pub heap_size: usize,
    /// Smallest stack accepted by `create_task`; never below the guard
    /// zone plus the port's initial frame
    pub min_stack_size: usize,
    /// Stack size of the idle task
    pub idle_stack_size: usize,
    /// Rotate equal-priority tasks on every tick
    pub time_slicing: bool,
    /// A woken task preempts a running task of the same priority
    pub preempt_on_equal_priority_wake: bool,
    /// Per-task mailbox slot in the arena, and so the largest queue item
    pub mailbox_size: usize,
}

impl KernelConfig {
    /// Default configuration: 1 kHz tick, 8 priorities, 32 KiB arena
    pub const fn new() -> Self {
        Self {
            tick_hz: 1000,
            priorities: 8,
            max_tasks: MAX_TASKS,
            heap_size: 32 * 1024,
            min_stack_size: 128,
            idle_stack_size: 256,
            time_slicing: true,
            preempt_on_equal_priority_wake: false,
            mailbox_size: 32,
        }
    }

    pub const fn with_tick_hz(mut self, tick_hz: u32) -> Self {
        self.tick_hz = tick_hz;
        self
    }

    pub const fn with_priorities(mut self, priorities: u8) -> Self {
        self.priorities = priorities;
        self
    }

    pub const fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    pub const fn with_heap_size(mut self, heap_size: usize) -> Self {
        self.heap_size = heap_size;
        self
    }

    pub const fn with_min_stack_size(mut self, size: usize) -> Self {
        self.min_stack_size = size;
        self
    }

    pub const fn with_idle_stack_size(mut self, size: usize) -> Self {
        self.idle_stack_size = size;
        self
    }

    pub const fn with_mailbox_size(mut self, size: usize) -> Self {
        self.mailbox_size = size;
        self
    }

    pub const fn with_time_slicing(mut self, enabled: bool) -> Self {
        self.time_slicing = enabled;
        self
    }

    pub const fn with_equal_priority_preemption(mut self, enabled: bool) -> Self {
        self.preempt_on_equal_priority_wake = enabled;
        self
    }

    /// Highest valid priority
    pub fn max_priority(&self) -> u8 {
        self.priorities.saturating_sub(1)
    }

    /// Check the configuration for values the kernel cannot run with
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.tick_hz == 0 {
            return Err(KernelError::InvalidArgument);
        }
        if self.priorities < 2 || self.priorities > MAX_PRIORITIES {
            return Err(KernelError::InvalidPriority);
        }
        // at least the idle task plus one application task
        if self.max_tasks < 2 {
            return Err(KernelError::InvalidArgument);
        }
        if self.min_stack_size <= STACK_GUARD_BYTES || self.idle_stack_size < self.min_stack_size {
            return Err(KernelError::InvalidArgument);
        }
        if self.heap_size < self.idle_stack_size || self.heap_size > u32::MAX as usize / 2 {
            return Err(KernelError::InvalidArgument);
        }
        if self.mailbox_size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        Ok(())
    }

    /// `validate`, plus room on every stack for the guard zone and a
    /// `frame_size` byte initial frame
    pub fn validate_for_frame(&self, frame_size: usize) -> Result<(), KernelError> {
        self.validate()?;
        if self.min_stack_size < stack_floor(frame_size) {
            return Err(KernelError::InvalidArgument);
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
