//! Mutexes — ownership, recursion and priority inheritance
//!
//! Effective priority = max(base, top waiter of every held mutex),
//! recomputed along the chain of blocked owners after each wait-list change.
//!
//! Author: Tern-RTOS contributors

use crate::error::KernelError;
use crate::kernel::{Kernel, Outcome};
use crate::port::Port;
use crate::scheduler::Reason;
use crate::semaphore::SemaphoreId;
use crate::task::{Task, TaskId, TaskPriority, TaskState, WaitOutcome, WaitTarget};
use crate::tick::Timeout;

impl<P: Port> Kernel<P> {
    /// Acquire a mutex, blocking up to `timeout` while another task holds it
    ///
    /// The holder inherits the caller's priority for as long as the caller
    /// waits. Re-locking a plain mutex fails with `Deadlock`.
    pub fn lock(&mut self, id: SemaphoreId, timeout: Timeout) -> Result<Outcome<()>, KernelError> {
        self.ensure_alive()?;
        let current = self.sched.running().map(Task::id).ok_or(KernelError::NotStarted)?;
        let sem = self.semaphores.get_mut(&id).ok_or(KernelError::InvalidHandle)?;
        if !sem.is_mutex() {
            return Err(KernelError::InvalidArgument);
        }

        let holder = sem.owner;
        match holder {
            None => {
                sem.owner = Some(current);
                sem.depth = 1;
                sem.count = 0;
                if let Some(task) = self.sched.task_mut(current) {
                    task.held.push(id);
                }
                Ok(Outcome::Done(()))
            }
            Some(owner) if owner == current => {
                if !sem.is_recursive() {
                    log::warn!("task {} re-locked mutex {}", current, id.as_u32());
                    return Err(KernelError::Deadlock);
                }
                sem.depth += 1;
                Ok(Outcome::Done(()))
            }
            Some(owner) => {
                if timeout.is_non_blocking() {
                    return Err(KernelError::WouldBlock);
                }
                let deadline = timeout.deadline(self.sched.now());
                let (task, priority) = self.sched.block_current(WaitTarget::Semaphore(id), deadline)?;
                if let Some(sem) = self.semaphores.get_mut(&id) {
                    sem.waiters.insert(task, priority);
                }
                self.recompute_priority(owner);
                self.schedule(Reason::Block)?;
                Ok(Outcome::Blocked)
            }
        }
    }

    /// Release one level of a mutex held by the running task
    ///
    /// At depth zero ownership passes to the top waiter and the caller's
    /// priority drops to what its remaining mutexes justify.
    pub fn unlock(&mut self, id: SemaphoreId) -> Result<(), KernelError> {
        self.ensure_alive()?;
        let current = self.sched.running().map(Task::id).ok_or(KernelError::NotStarted)?;
        let sem = self.semaphores.get_mut(&id).ok_or(KernelError::InvalidHandle)?;
        if !sem.is_mutex() {
            return Err(KernelError::InvalidArgument);
        }
        if sem.owner != Some(current) {
            log::warn!("task {} unlocking mutex {} it does not own", current, id.as_u32());
            return Err(KernelError::NotOwner);
        }
        if sem.depth > 1 {
            sem.depth -= 1;
            return Ok(());
        }
        self.release_mutex(id, current);
        self.schedule(Reason::Wake)
    }

    /// Mutex holder, if locked
    pub fn mutex_owner(&self, id: SemaphoreId) -> Result<Option<TaskId>, KernelError> {
        let sem = self.semaphores.get(&id).ok_or(KernelError::InvalidHandle)?;
        if !sem.is_mutex() {
            return Err(KernelError::InvalidArgument);
        }
        Ok(sem.owner)
    }

    /// Drop `owner`'s hold on a mutex and hand it to the top waiter
    pub(crate) fn release_mutex(&mut self, id: SemaphoreId, owner: TaskId) {
        if let Some(task) = self.sched.task_mut(owner) {
            task.held.retain(|&m| m != id);
        }
        let Some(sem) = self.semaphores.get_mut(&id) else {
            return;
        };
        let next = sem.waiters.pop_front();
        sem.owner = next;
        sem.depth = u32::from(next.is_some());
        sem.count = u32::from(next.is_none());
        self.recompute_priority(owner);

        if let Some(next) = next {
            if let Some(task) = self.sched.task_mut(next) {
                task.held.push(id);
            }
            self.sched.wake(next, WaitOutcome::Satisfied);
            self.recompute_priority(next);
            log::trace!("mutex {} handed from task {} to task {}", id.as_u32(), owner, next);
        }
    }

    /// Base priority raised to the top waiter of every held mutex
    pub(crate) fn inherited_priority(&self, task: &Task) -> TaskPriority {
        task.held
            .iter()
            .filter_map(|m| self.semaphores.get(m))
            .filter_map(|sem| sem.waiters.top_priority())
            .fold(task.base_priority, TaskPriority::max)
    }

    /// Bring a task's effective priority in line with what it holds and
    /// carry the change along the chain of owners it is blocked behind
    pub(crate) fn recompute_priority(&mut self, id: TaskId) {
        let mut next = Some(id);
        // a lock cycle would otherwise loop forever
        for _ in 0..=self.sched.task_count() {
            let Some(id) = next else {
                break;
            };
            let Some(task) = self.sched.task(id) else {
                break;
            };
            let effective = self.inherited_priority(task);
            if effective == task.priority {
                break;
            }
            let blocked_on = match task.state {
                TaskState::Blocked => task.blocked_on,
                _ => None,
            };
            self.set_effective_priority(id, effective);
            next = match blocked_on {
                Some(WaitTarget::Semaphore(m)) => self.semaphores.get(&m).and_then(|sem| sem.owner),
                _ => None,
            };
        }
    }
}
