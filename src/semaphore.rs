//! Semaphores — binary and counting, plus the table shared with mutexes
//!
//! A `give` wakes one taker or bumps the count, never both.
//!
//! Author: Tern-RTOS contributors

use alloc::vec::Vec;

use crate::error::KernelError;
use crate::kernel::{Kernel, Outcome};
use crate::list::WaitList;
use crate::port::Port;
use crate::scheduler::Reason;
use crate::task::{TaskId, WaitOutcome, WaitTarget};
use crate::tick::Timeout;

/// Semaphore handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemaphoreId(u32);

impl SemaphoreId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Kind chosen at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreKind {
    /// Count 0 or 1, created empty
    Binary,
    /// Count in `0..=max`, starting at `initial`
    Counting { max: u32, initial: u32 },
    /// Owned lock with priority inheritance
    Mutex,
    /// Mutex the owner may lock again, released at depth zero
    RecursiveMutex,
}

/// Semaphore control block, kept in the kernel's object table
pub struct Semaphore {
    kind: SemaphoreKind,
    pub(crate) count: u32,
    max: u32,
    pub(crate) waiters: WaitList,
    /// Mutex kinds: holder of the lock
    pub(crate) owner: Option<TaskId>,
    /// Mutex kinds: nested lock count of the owner
    pub(crate) depth: u32,
}

impl Semaphore {
    pub fn kind(&self) -> SemaphoreKind {
        self.kind
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn owner(&self) -> Option<TaskId> {
        self.owner
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Tasks blocked on it
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_mutex(&self) -> bool {
        matches!(self.kind, SemaphoreKind::Mutex | SemaphoreKind::RecursiveMutex)
    }

    pub fn is_recursive(&self) -> bool {
        self.kind == SemaphoreKind::RecursiveMutex
    }
}

impl<P: Port> Kernel<P> {
    /// Create a semaphore or mutex
    pub fn semaphore_create(&mut self, kind: SemaphoreKind) -> Result<SemaphoreId, KernelError> {
        self.ensure_alive()?;
        let (count, max) = match kind {
            SemaphoreKind::Binary => (0, 1),
            SemaphoreKind::Counting { max, initial } => {
                if max == 0 || initial > max {
                    return Err(KernelError::InvalidArgument);
                }
                (initial, max)
            }
            SemaphoreKind::Mutex | SemaphoreKind::RecursiveMutex => (1, 1),
        };

        let id = SemaphoreId(self.next_object_id());
        self.semaphores.insert(
            id,
            Semaphore {
                kind,
                count,
                max,
                waiters: WaitList::new(),
                owner: None,
                depth: 0,
            },
        );
        log::debug!("semaphore {} created: {:?}", id.0, kind);
        Ok(id)
    }

    /// Control block of a semaphore or mutex
    pub fn semaphore(&self, id: SemaphoreId) -> Option<&Semaphore> {
        self.semaphores.get(&id)
    }

    /// Current count (1 for a free mutex, 0 for a held one)
    pub fn semaphore_count(&self, id: SemaphoreId) -> Result<u32, KernelError> {
        self.semaphores
            .get(&id)
            .map(Semaphore::count)
            .ok_or(KernelError::InvalidHandle)
    }

    /// Take one count, blocking up to `timeout` while none is available
    pub fn take(&mut self, id: SemaphoreId, timeout: Timeout) -> Result<Outcome<()>, KernelError> {
        self.ensure_alive()?;
        let sem = self.semaphores.get_mut(&id).ok_or(KernelError::InvalidHandle)?;
        if sem.is_mutex() {
            return self.lock(id, timeout);
        }
        if sem.count > 0 {
            sem.count -= 1;
            return Ok(Outcome::Done(()));
        }
        if timeout.is_non_blocking() {
            return Err(KernelError::WouldBlock);
        }

        let deadline = timeout.deadline(self.sched.now());
        let (task, priority) = self.sched.block_current(WaitTarget::Semaphore(id), deadline)?;
        if let Some(sem) = self.semaphores.get_mut(&id) {
            sem.waiters.insert(task, priority);
        }
        self.schedule(Reason::Block)?;
        Ok(Outcome::Blocked)
    }

    /// Release one count: wake the top waiter, or increment
    ///
    /// Fails with `Overflow` when the count is already at its maximum.
    pub fn give(&mut self, id: SemaphoreId) -> Result<(), KernelError> {
        self.ensure_alive()?;
        let sem = self.semaphores.get_mut(&id).ok_or(KernelError::InvalidHandle)?;
        if sem.is_mutex() {
            return self.unlock(id);
        }
        if let Some(task) = sem.waiters.pop_front() {
            self.sched.wake(task, WaitOutcome::Satisfied);
            return self.schedule(Reason::Wake);
        }
        if sem.count >= sem.max {
            log::warn!("semaphore {} given past its maximum of {}", id.0, sem.max);
            return Err(KernelError::Overflow);
        }
        sem.count += 1;
        Ok(())
    }

    /// Take from interrupt context; never blocks
    pub fn take_from_isr(&mut self, id: SemaphoreId) -> Result<(), KernelError> {
        self.ensure_alive()?;
        let sem = self.semaphores.get_mut(&id).ok_or(KernelError::InvalidHandle)?;
        if sem.is_mutex() {
            return Err(KernelError::InvalidArgument);
        }
        if sem.count == 0 {
            return Err(KernelError::WouldBlock);
        }
        sem.count -= 1;
        Ok(())
    }

    /// Give from interrupt context
    ///
    /// Returns whether a woken taker outranks the interrupted task.
    pub fn give_from_isr(&mut self, id: SemaphoreId) -> Result<bool, KernelError> {
        self.ensure_alive()?;
        let sem = self.semaphores.get_mut(&id).ok_or(KernelError::InvalidHandle)?;
        if sem.is_mutex() {
            return Err(KernelError::InvalidArgument);
        }
        if let Some(task) = sem.waiters.pop_front() {
            return Ok(self.wake_from_isr(task, WaitOutcome::Satisfied));
        }
        if sem.count >= sem.max {
            return Err(KernelError::Overflow);
        }
        sem.count += 1;
        Ok(false)
    }

    /// Delete a semaphore or mutex; waiters wake with `Deleted`
    ///
    /// A held mutex is detached from its owner, whose priority drops back.
    pub fn semaphore_delete(&mut self, id: SemaphoreId) -> Result<(), KernelError> {
        self.ensure_alive()?;
        let mut sem = self.semaphores.remove(&id).ok_or(KernelError::InvalidHandle)?;
        let waiters: Vec<TaskId> = sem.waiters.drain().collect();
        for task in waiters {
            self.sched.wake(task, WaitOutcome::Deleted);
        }
        if let Some(owner) = sem.owner {
            if let Some(task) = self.sched.task_mut(owner) {
                task.held.retain(|&m| m != id);
            }
            self.recompute_priority(owner);
        }
        log::debug!("semaphore {} deleted", id.0);
        self.schedule(Reason::Wake)
    }
}
