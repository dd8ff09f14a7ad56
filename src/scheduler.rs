//! Scheduler — fixed priorities, round-robin among equals
//!
//! Bookkeeping only: the kernel drives it and performs the switch.
//! Every task sits in exactly one of `current`, a ready list, blocked
//! (optionally in `delayed`), `suspended` or `terminated`.
//!
//! Author: Tern-RTOS contributors

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use crate::config::KernelConfig;
use crate::error::{FatalError, KernelError};
use crate::list::ReadyQueues;
use crate::task::{Task, TaskId, TaskPriority, TaskState, WaitOutcome, WaitTarget};
use crate::tick::{Tick, TickClock};

/// Why a scheduling decision is being made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reason {
    /// Periodic tick: equal-priority tasks rotate if time slicing is on
    Tick,
    /// The running task gave up the CPU voluntarily
    Yield,
    /// The running task blocked, suspended or terminated
    Block,
    /// Another task became ready
    Wake,
}

/// A context switch decided by `pick_next`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Switch {
    pub from: Option<TaskId>,
    pub to: TaskId,
}

pub struct Scheduler {
    tasks: BTreeMap<TaskId, Task>,
    ready: ReadyQueues,
    /// Blocked tasks with a finite deadline, earliest first
    delayed: BTreeSet<(Tick, TaskId)>,
    suspended: BTreeSet<TaskId>,
    /// Awaiting idle-time reclamation
    terminated: Vec<TaskId>,
    current: Option<TaskId>,
    clock: TickClock,
    next_id: u32,
    /// Total context switches
    context_switches: u32,
    /// Set by ISR wakes that outrank the running task
    yield_pending: bool,
    time_slicing: bool,
    preempt_on_equal_wake: bool,
}

impl Scheduler {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            tasks: BTreeMap::new(),
            ready: ReadyQueues::new(config.priorities),
            delayed: BTreeSet::new(),
            suspended: BTreeSet::new(),
            terminated: Vec::new(),
            current: None,
            clock: TickClock::new(config.tick_hz),
            next_id: 1,
            context_switches: 0,
            yield_pending: false,
            time_slicing: config.time_slicing,
            preempt_on_equal_wake: config.preempt_on_equal_priority_wake,
        }
    }

    pub(crate) fn alloc_id(&mut self) -> TaskId {
        let id = TaskId::from_raw(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add a new task to the table and its ready list
    pub(crate) fn insert(&mut self, mut task: Task) {
        task.state = TaskState::Ready;
        self.ready.push_back(task.id, task.priority);
        self.tasks.insert(task.id, task);
    }

    /// Drop a task from the table entirely (reclamation)
    pub(crate) fn remove(&mut self, id: TaskId) -> Option<Task> {
        self.tasks.remove(&id)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub(crate) fn get(&self, id: TaskId) -> Result<&Task, KernelError> {
        self.tasks.get(&id).ok_or(KernelError::InvalidHandle)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Tasks in the table, terminated ones awaiting reclamation included
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    /// The current task if it is actually running
    pub(crate) fn running(&self) -> Option<&Task> {
        self.current
            .and_then(|id| self.tasks.get(&id))
            .filter(|t| t.state == TaskState::Running)
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub(crate) fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub(crate) fn advance_clock(&mut self) -> Tick {
        self.clock.advance()
    }

    pub fn context_switches(&self) -> u32 {
        self.context_switches
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Ready tasks of one level, next-to-run first
    pub fn ready_at(&self, priority: TaskPriority) -> impl Iterator<Item = TaskId> + '_ {
        self.ready.level(priority)
    }

    pub(crate) fn set_yield_pending(&mut self) {
        self.yield_pending = true;
    }

    pub(crate) fn take_yield_pending(&mut self) -> bool {
        core::mem::take(&mut self.yield_pending)
    }

    /// Move a task into its ready list
    pub(crate) fn make_ready(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.state = TaskState::Ready;
            self.ready.push_back(id, task.priority);
        }
    }

    /// Block the running task on `target` until woken or `deadline`
    ///
    /// Returns the task and its priority for wait-list insertion.
    pub(crate) fn block_current(
        &mut self,
        target: WaitTarget,
        deadline: Option<Tick>,
    ) -> Result<(TaskId, TaskPriority), KernelError> {
        let id = self.running().map(|t| t.id).ok_or(KernelError::NotStarted)?;
        let task = self.tasks.get_mut(&id).ok_or(KernelError::InvalidHandle)?;
        task.state = TaskState::Blocked;
        task.blocked_on = Some(target);
        task.wake_at = deadline;
        task.outcome = None;
        task.mailbox = None;
        if let Some(at) = deadline {
            self.delayed.insert((at, id));
        }
        log::trace!("task {} blocked on {:?} until {:?}", id, target, deadline);
        Ok((id, task.priority))
    }

    /// Clear a blocked task's wait bookkeeping without readying it
    ///
    /// Returns what it was waiting for so the caller can drop it from that
    /// object's wait list.
    pub(crate) fn unlink_blocked(&mut self, id: TaskId) -> Option<WaitTarget> {
        let task = self.tasks.get_mut(&id)?;
        if task.state != TaskState::Blocked {
            return None;
        }
        if let Some(at) = task.wake_at.take() {
            self.delayed.remove(&(at, id));
        }
        task.blocked_on.take()
    }

    /// Finish a wait and make the task ready
    ///
    /// The caller has already removed it from the object's wait list.
    pub(crate) fn wake(&mut self, id: TaskId, outcome: WaitOutcome) -> Option<TaskPriority> {
        self.unlink_blocked(id);
        let task = self.tasks.get_mut(&id)?;
        task.outcome = Some(outcome);
        if outcome != WaitOutcome::Satisfied {
            task.mailbox = None;
        }
        let priority = task.priority;
        self.make_ready(id);
        log::trace!("task {} woken: {:?}", id, outcome);
        Some(priority)
    }

    /// Pop every blocked task whose deadline is at or before `now`
    pub(crate) fn expire(&mut self, now: Tick) -> Vec<TaskId> {
        let mut due = Vec::new();
        while let Some(&(at, id)) = self.delayed.first() {
            if at > now {
                break;
            }
            self.delayed.pop_first();
            due.push(id);
        }
        due
    }

    /// Remove a task from the ready or suspended set, whichever holds it
    pub(crate) fn detach(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get(&id) {
            match task.state {
                TaskState::Ready => {
                    self.ready.remove(id, task.priority);
                }
                TaskState::Suspended => {
                    self.suspended.remove(&id);
                }
                _ => {}
            }
        }
    }

    pub(crate) fn mark_suspended(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.state = TaskState::Suspended;
            self.suspended.insert(id);
        }
    }

    pub(crate) fn unmark_suspended(&mut self, id: TaskId) -> bool {
        self.suspended.remove(&id)
    }

    pub(crate) fn mark_terminated(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.state = TaskState::Terminated;
            task.blocked_on = None;
            task.wake_at = None;
            task.outcome = None;
            task.mailbox = None;
            task.priority = task.base_priority;
            self.terminated.push(id);
        }
    }

    /// Terminated tasks that are safe to reclaim: neither the current task
    /// nor `outgoing`, whose switch-out may still be in flight
    pub(crate) fn take_reclaimable(&mut self, outgoing: Option<TaskId>) -> Vec<TaskId> {
        let current = self.current;
        let (keep, reclaim): (Vec<_>, Vec<_>) = self
            .terminated
            .drain(..)
            .partition(|&id| Some(id) == current || Some(id) == outgoing);
        self.terminated = keep;
        reclaim
    }

    pub fn terminated_count(&self) -> usize {
        self.terminated.len()
    }

    /// Change the effective priority of a task, keeping a ready task in the
    /// right list. Wait-list positions are the kernel's concern.
    pub(crate) fn set_priority(&mut self, id: TaskId, priority: TaskPriority) -> Option<TaskPriority> {
        let task = self.tasks.get_mut(&id)?;
        let old = task.priority;
        if old == priority {
            return Some(old);
        }
        task.priority = priority;
        if task.state == TaskState::Ready {
            self.ready.remove(id, old);
            self.ready.push_back(id, priority);
        }
        Some(old)
    }

    /// Credit the running task with one tick of CPU time
    pub(crate) fn charge_tick(&mut self) {
        if let Some(id) = self.current {
            if let Some(task) = self.tasks.get_mut(&id) {
                if task.state == TaskState::Running {
                    task.run_ticks += 1;
                }
            }
        }
    }

    fn rotates(&self, reason: Reason) -> bool {
        match reason {
            Reason::Tick => self.time_slicing,
            Reason::Yield | Reason::Block => true,
            Reason::Wake => self.preempt_on_equal_wake,
        }
    }

    /// Decide which task runs next
    ///
    /// A running task keeps the CPU unless a higher priority is ready, or an
    /// equal one is ready and `reason` rotates. A preempted task goes to the
    /// back of its level. Returns `None` when no switch is needed.
    pub(crate) fn pick_next(&mut self, reason: Reason) -> Result<Option<Switch>, FatalError> {
        let top = self.ready.highest();
        let rotate = self.rotates(reason);

        if let Some(cur) = self.current {
            let task = self
                .tasks
                .get_mut(&cur)
                .ok_or(FatalError::InvariantViolation("current task missing from table"))?;
            if task.state == TaskState::Running {
                let keep = match top {
                    None => true,
                    Some(top) if top < task.priority => true,
                    Some(top) if top == task.priority => !rotate,
                    Some(_) => false,
                };
                if keep {
                    return Ok(None);
                }
                task.state = TaskState::Ready;
                self.ready.push_back(cur, task.priority);
            }
        }

        let next = self
            .ready
            .pop_highest()
            .ok_or(FatalError::InvariantViolation("no ready task"))?;
        let task = self
            .tasks
            .get_mut(&next)
            .ok_or(FatalError::InvariantViolation("ready task missing from table"))?;
        task.state = TaskState::Running;

        let from = self.current.replace(next);
        if from == Some(next) {
            return Ok(None);
        }
        task.dispatch_count += 1;
        self.context_switches += 1;
        Ok(Some(Switch { from, to: next }))
    }

    /// Verify set membership for every task
    pub fn check_invariants(&self) -> Result<(), FatalError> {
        for (&id, task) in &self.tasks {
            let in_ready = self.ready.contains(id);
            let in_suspended = self.suspended.contains(&id);
            let in_terminated = self.terminated.contains(&id);
            let in_delayed = task
                .wake_at
                .map_or(false, |at| self.delayed.contains(&(at, id)));
            let ok = match task.state {
                TaskState::Running => {
                    self.current == Some(id) && !in_ready && !in_suspended && !in_terminated
                }
                TaskState::Ready => in_ready && !in_suspended && !in_terminated,
                TaskState::Blocked => {
                    task.blocked_on.is_some()
                        && !in_ready
                        && !in_suspended
                        && (task.wake_at.is_none() || in_delayed)
                }
                TaskState::Suspended => in_suspended && !in_ready && !in_terminated,
                TaskState::Terminated => in_terminated && !in_ready && !in_suspended,
            };
            if !ok {
                return Err(FatalError::InvariantViolation("task in wrong scheduling set"));
            }
            if task.priority < task.base_priority {
                return Err(FatalError::InvariantViolation("priority below base"));
            }
        }
        if self.delayed.len() > self.tasks.len() {
            return Err(FatalError::InvariantViolation("stale delayed entries"));
        }
        Ok(())
    }
}
