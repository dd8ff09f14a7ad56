//! Priority-ordered task lists
//!
//! - `ReadyQueues`: one FIFO per level plus a bitmap of non-empty levels
//! - `WaitList`: blocked tasks by priority, FIFO among equals
//!
//! Author: Tern-RTOS contributors

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::task::{TaskId, TaskPriority};

/// One FIFO per priority level
pub struct ReadyQueues {
    levels: Vec<VecDeque<TaskId>>,
    /// Bit `n` set iff `levels[n]` is non-empty
    bitmap: u32,
}

impl ReadyQueues {
    pub fn new(priorities: u8) -> Self {
        let mut levels = Vec::with_capacity(priorities as usize);
        levels.resize_with(priorities as usize, VecDeque::new);
        Self { levels, bitmap: 0 }
    }

    /// Append at the back of the task's priority level
    pub fn push_back(&mut self, task: TaskId, priority: TaskPriority) {
        self.levels[priority.level()].push_back(task);
        self.bitmap |= 1 << priority.level();
    }

    /// Highest level with a ready task
    pub fn highest(&self) -> Option<TaskPriority> {
        if self.bitmap == 0 {
            None
        } else {
            Some(TaskPriority((31 - self.bitmap.leading_zeros()) as u8))
        }
    }

    /// Take the front task of the highest non-empty level
    pub fn pop_highest(&mut self) -> Option<TaskId> {
        let level = self.highest()?.level();
        let task = self.levels[level].pop_front();
        if self.levels[level].is_empty() {
            self.bitmap &= !(1 << level);
        }
        task
    }

    /// Remove a task from the given level, returning whether it was there
    pub fn remove(&mut self, task: TaskId, priority: TaskPriority) -> bool {
        let level = &mut self.levels[priority.level()];
        let found = match level.iter().position(|&t| t == task) {
            Some(pos) => level.remove(pos).is_some(),
            None => false,
        };
        if level.is_empty() {
            self.bitmap &= !(1 << priority.level());
        }
        found
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.levels.iter().any(|level| level.contains(&task))
    }

    /// Tasks waiting at a level, front first
    pub fn level(&self, priority: TaskPriority) -> impl Iterator<Item = TaskId> + '_ {
        self.levels[priority.level()].iter().copied()
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap == 0
    }
}

/// Tasks blocked on one primitive, highest priority first
#[derive(Default)]
pub struct WaitList {
    entries: VecDeque<(TaskPriority, TaskId)>,
}

impl WaitList {
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Insert behind every waiter of equal or higher priority
    pub fn insert(&mut self, task: TaskId, priority: TaskPriority) {
        let pos = self
            .entries
            .iter()
            .position(|&(p, _)| p < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, (priority, task));
    }

    /// Take the highest-priority, earliest waiter
    pub fn pop_front(&mut self) -> Option<TaskId> {
        self.entries.pop_front().map(|(_, t)| t)
    }

    pub fn remove(&mut self, task: TaskId) -> bool {
        match self.entries.iter().position(|&(_, t)| t == task) {
            Some(pos) => self.entries.remove(pos).is_some(),
            None => false,
        }
    }

    /// Move a waiter after its priority changed
    pub fn reposition(&mut self, task: TaskId, priority: TaskPriority) {
        if self.remove(task) {
            self.insert(task, priority);
        }
    }

    /// Priority of the first waiter
    pub fn top_priority(&self) -> Option<TaskPriority> {
        self.entries.front().map(|&(p, _)| p)
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.entries.iter().any(|&(_, t)| t == task)
    }

    /// Remove every waiter, front first
    pub fn drain(&mut self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.drain(..).map(|(_, t)| t)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
