//! Port layer — the architecture seam of the kernel
//!
//! - `Port`: initial frame, context switch, first dispatch, halt
//! - `SimPort`: hosted port that records every dispatch for tests
//!
//! On Cortex-M, `switch_context` pends PendSV; the register swap happens
//! once the kernel's critical section ends.
//!
//! Author: Tern-RTOS contributors

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::FatalError;
use crate::task::{TaskEntry, TaskId};

/// Saved execution context
///
/// `sp` is an offset into the task's stack region, measured from its low
/// end, so the kernel can bounds-check it without knowing the architecture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    pub sp: usize,
}

/// Architecture hooks used by the kernel
pub trait Port {
    /// Bytes `init_stack` writes at the top of a new stack
    const FRAME_SIZE: usize;

    /// Write the initial frame for `entry` on `stack` and return the context
    /// that the first switch into the task will restore
    fn init_stack(&mut self, task: TaskId, stack: &mut [u8], entry: TaskEntry) -> Context;

    /// Begin executing the first task. Hardware ports never return.
    fn start_first_task(&mut self, task: TaskId, context: &Context);

    /// Save the running task's registers into `save` and resume `restore`
    fn switch_context(&mut self, from: TaskId, save: &mut Context, to: TaskId, restore: &Context);

    /// A task's memory is being reclaimed
    fn release(&mut self, _task: TaskId) {}

    /// Stop scheduling for good
    fn halt(&mut self, fatal: &FatalError);
}

/// Bytes of the simulated exception frame at the top of each stack
pub const SIM_FRAME_SIZE: usize = 64;

/// One context switch observed by `SimPort`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// `None` for the very first task
    pub from: Option<TaskId>,
    pub to: TaskId,
}

/// Hosted port: keeps entries, records dispatches, never touches registers
#[derive(Default)]
pub struct SimPort {
    entries: BTreeMap<TaskId, TaskEntry>,
    trace: Vec<Dispatch>,
    halted: Option<FatalError>,
}

impl SimPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dispatch since the last `clear_trace`, oldest first
    pub fn trace(&self) -> &[Dispatch] {
        &self.trace
    }

    /// Most recent dispatch
    pub fn last_dispatch(&self) -> Option<Dispatch> {
        self.trace.last().copied()
    }

    /// Forget recorded dispatches
    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    /// Fatal error reported through `halt`
    pub fn halted(&self) -> Option<FatalError> {
        self.halted
    }

    /// Run a task's entry closure on the host thread
    ///
    /// Returns false if the task has no entry left (already run or released).
    pub fn run_entry(&mut self, task: TaskId) -> bool {
        match self.entries.remove(&task) {
            Some(entry) => {
                entry();
                true
            }
            None => false,
        }
    }

    /// True until the task's entry has run or its memory was released
    pub fn has_entry(&self, task: TaskId) -> bool {
        self.entries.contains_key(&task)
    }
}

impl Port for SimPort {
    const FRAME_SIZE: usize = SIM_FRAME_SIZE;

    fn init_stack(&mut self, task: TaskId, stack: &mut [u8], entry: TaskEntry) -> Context {
        let sp = stack.len().saturating_sub(SIM_FRAME_SIZE);
        let frame = &mut stack[sp..];
        frame.fill(0);
        // tag the frame with its owner, the way a real port stores the entry PC
        let tag = task.as_u32().to_le_bytes();
        let n = tag.len().min(frame.len());
        frame[..n].copy_from_slice(&tag[..n]);

        self.entries.insert(task, entry);
        Context { sp }
    }

    fn start_first_task(&mut self, task: TaskId, _context: &Context) {
        log::trace!("sim: first dispatch to task {}", task);
        self.trace.push(Dispatch { from: None, to: task });
    }

    fn switch_context(&mut self, from: TaskId, _save: &mut Context, to: TaskId, _restore: &Context) {
        self.trace.push(Dispatch {
            from: Some(from),
            to,
        });
    }

    fn release(&mut self, task: TaskId) {
        self.entries.remove(&task);
    }

    fn halt(&mut self, fatal: &FatalError) {
        self.halted = Some(*fatal);
    }
}
