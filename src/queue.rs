//! Queue — fixed-size items copied through an arena-backed ring
//!
//! - Send to a waiting receiver: straight into its mailbox slot
//! - Receive from a full queue: the top blocked sender's item refills the slot
//!
//! Author: Tern-RTOS contributors
//!
//! # Invariants
//! - `0 <= len <= capacity`
//! - receivers wait only while the ring is empty, senders only while it is full
//! - every blocked sender holds its item in its own mailbox slot

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{FatalError, KernelError};
use crate::heap::Block;
use crate::kernel::{Kernel, Outcome};
use crate::list::WaitList;
use crate::port::Port;
use crate::ring::SlotRing;
use crate::scheduler::Reason;
use crate::task::{TaskId, WaitOutcome, WaitTarget};
use crate::tick::Timeout;

/// Queue handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(u32);

impl QueueId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Queue control block
pub struct Queue {
    ring: SlotRing,
    /// Slot storage in the arena
    storage: Block,
    pub(crate) senders: WaitList,
    pub(crate) receivers: WaitList,
}

impl Queue {
    /// Items stored
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Slots in the ring
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Bytes per item
    pub fn item_size(&self) -> usize {
        self.ring.item_size()
    }

    /// Tasks blocked sending / receiving
    pub fn waiting(&self) -> (usize, usize) {
        (self.senders.len(), self.receivers.len())
    }

    fn check_item(&self, item: &[u8]) -> Result<(), KernelError> {
        if item.len() != self.ring.item_size() {
            return Err(KernelError::InvalidArgument);
        }
        Ok(())
    }
}

impl<P: Port> Kernel<P> {
    /// Create a queue of `capacity` items of `item_size` bytes each
    ///
    /// Items may not exceed the per-task mailbox, `config.mailbox_size`.
    pub fn queue_create(&mut self, capacity: usize, item_size: usize) -> Result<QueueId, KernelError> {
        self.ensure_alive()?;
        if capacity == 0 || item_size == 0 || item_size > self.config.mailbox_size {
            return Err(KernelError::InvalidArgument);
        }
        let ring = SlotRing::new(capacity, item_size);
        let bytes = capacity
            .checked_mul(item_size)
            .ok_or(KernelError::InvalidArgument)?;
        let storage = self.heap.allocate(bytes)?;
        debug_assert!(storage.len() >= ring.storage_size());

        let id = QueueId(self.next_object_id());
        self.queues.insert(
            id,
            Queue {
                ring,
                storage,
                senders: WaitList::new(),
                receivers: WaitList::new(),
            },
        );
        log::debug!("queue {} created: {} x {} bytes", id.0, capacity, item_size);
        Ok(id)
    }

    /// Control block of a queue
    pub fn queue(&self, id: QueueId) -> Option<&Queue> {
        self.queues.get(&id)
    }

    /// Items currently stored
    pub fn queue_len(&self, id: QueueId) -> Result<usize, KernelError> {
        self.queues.get(&id).map(Queue::len).ok_or(KernelError::InvalidHandle)
    }

    /// Send a copy of `item`, blocking up to `timeout` while the queue is full
    ///
    /// A full queue with a non-blocking timeout reports `Overflow`.
    pub fn queue_send(&mut self, id: QueueId, item: &[u8], timeout: Timeout) -> Result<Outcome<()>, KernelError> {
        self.ensure_alive()?;
        let queue = self.queues.get_mut(&id).ok_or(KernelError::InvalidHandle)?;
        queue.check_item(item)?;

        if let Some(receiver) = queue.receivers.pop_front() {
            if let Err(fatal) = self.put_mailbox(receiver, item) {
                return Err(self.halt(fatal));
            }
            self.sched.wake(receiver, WaitOutcome::Satisfied);
            self.schedule(Reason::Wake)?;
            return Ok(Outcome::Done(()));
        }
        let storage = self.heap.slice_mut(&queue.storage);
        if queue.ring.push(storage, item) {
            return Ok(Outcome::Done(()));
        }
        if timeout.is_non_blocking() {
            return Err(KernelError::Overflow);
        }

        let deadline = timeout.deadline(self.sched.now());
        let (task, priority) = self.sched.block_current(WaitTarget::QueueSend(id), deadline)?;
        if let Err(fatal) = self.put_mailbox(task, item) {
            return Err(self.halt(fatal));
        }
        if let Some(queue) = self.queues.get_mut(&id) {
            queue.senders.insert(task, priority);
        }
        self.schedule(Reason::Block)?;
        Ok(Outcome::Blocked)
    }

    /// Receive the oldest item, blocking up to `timeout` while the queue is empty
    ///
    /// When the call blocks, the item arrives through `wait_result`.
    pub fn queue_receive(&mut self, id: QueueId, timeout: Timeout) -> Result<Outcome<Vec<u8>>, KernelError> {
        self.ensure_alive()?;
        if let Some((item, sender)) = self.take_item(id)? {
            if let Some(sender) = sender {
                self.sched.wake(sender, WaitOutcome::Satisfied);
                self.schedule(Reason::Wake)?;
            }
            return Ok(Outcome::Done(item));
        }
        if timeout.is_non_blocking() {
            return Err(KernelError::WouldBlock);
        }

        let deadline = timeout.deadline(self.sched.now());
        let (task, priority) = self.sched.block_current(WaitTarget::QueueReceive(id), deadline)?;
        if let Some(queue) = self.queues.get_mut(&id) {
            queue.receivers.insert(task, priority);
        }
        self.schedule(Reason::Block)?;
        Ok(Outcome::Blocked)
    }

    /// Copy of the oldest item, left in place
    pub fn queue_peek(&self, id: QueueId) -> Result<Vec<u8>, KernelError> {
        self.ensure_alive()?;
        let queue = self.queues.get(&id).ok_or(KernelError::InvalidHandle)?;
        let mut item = vec![0u8; queue.ring.item_size()];
        if queue.ring.peek(self.heap.slice(&queue.storage), &mut item) {
            Ok(item)
        } else {
            Err(KernelError::WouldBlock)
        }
    }

    /// Discard every stored item, then admit blocked senders into the free slots
    pub fn queue_reset(&mut self, id: QueueId) -> Result<(), KernelError> {
        self.ensure_alive()?;
        let queue = self.queues.get_mut(&id).ok_or(KernelError::InvalidHandle)?;
        queue.ring.clear();
        loop {
            match self.admit_sender(id) {
                Ok(Some(sender)) => {
                    self.sched.wake(sender, WaitOutcome::Satisfied);
                }
                Ok(None) => break,
                Err(fatal) => return Err(self.halt(fatal)),
            }
        }
        log::debug!("queue {} reset", id.0);
        self.schedule(Reason::Wake)
    }

    /// Delete a queue; its waiters wake with `Deleted`
    pub fn queue_delete(&mut self, id: QueueId) -> Result<(), KernelError> {
        self.ensure_alive()?;
        let mut queue = self.queues.remove(&id).ok_or(KernelError::InvalidHandle)?;
        let waiters: Vec<TaskId> = queue
            .senders
            .drain()
            .chain(queue.receivers.drain())
            .collect();
        for task in waiters {
            self.sched.wake(task, WaitOutcome::Deleted);
        }
        self.free_block(queue.storage)?;
        log::debug!("queue {} deleted", id.0);
        self.schedule(Reason::Wake)
    }

    /// Send from interrupt context; never blocks
    ///
    /// Returns whether a woken receiver outranks the interrupted task.
    pub fn queue_send_from_isr(&mut self, id: QueueId, item: &[u8]) -> Result<bool, KernelError> {
        self.ensure_alive()?;
        let queue = self.queues.get_mut(&id).ok_or(KernelError::InvalidHandle)?;
        queue.check_item(item)?;

        if let Some(receiver) = queue.receivers.pop_front() {
            if let Err(fatal) = self.put_mailbox(receiver, item) {
                return Err(self.halt(fatal));
            }
            return Ok(self.wake_from_isr(receiver, WaitOutcome::Satisfied));
        }
        let storage = self.heap.slice_mut(&queue.storage);
        if queue.ring.push(storage, item) {
            Ok(false)
        } else {
            log::debug!("queue {} full, isr item dropped", id.0);
            Err(KernelError::Overflow)
        }
    }

    /// Receive from interrupt context; never blocks
    ///
    /// Returns the item and whether an unblocked sender outranks the
    /// interrupted task.
    pub fn queue_receive_from_isr(&mut self, id: QueueId) -> Result<(Vec<u8>, bool), KernelError> {
        self.ensure_alive()?;
        match self.take_item(id)? {
            Some((item, Some(sender))) => {
                let yield_required = self.wake_from_isr(sender, WaitOutcome::Satisfied);
                Ok((item, yield_required))
            }
            Some((item, None)) => Ok((item, false)),
            None => Err(KernelError::WouldBlock),
        }
    }

    /// Pop the oldest item and refill the freed slot from the top sender
    ///
    /// Returns the item and the sender that was let in, if any.
    fn take_item(&mut self, id: QueueId) -> Result<Option<(Vec<u8>, Option<TaskId>)>, KernelError> {
        let queue = self.queues.get_mut(&id).ok_or(KernelError::InvalidHandle)?;
        let mut item = vec![0u8; queue.ring.item_size()];
        if !queue.ring.pop(self.heap.slice(&queue.storage), &mut item) {
            return Ok(None);
        }
        match self.admit_sender(id) {
            Ok(sender) => Ok(Some((item, sender))),
            Err(fatal) => Err(self.halt(fatal)),
        }
    }

    /// Move the top blocked sender's item from its mailbox into the ring
    fn admit_sender(&mut self, id: QueueId) -> Result<Option<TaskId>, FatalError> {
        let Some(queue) = self.queues.get_mut(&id) else {
            return Ok(None);
        };
        if queue.ring.is_full() {
            return Ok(None);
        }
        let Some(sender) = queue.senders.pop_front() else {
            return Ok(None);
        };
        let task = self
            .sched
            .task_mut(sender)
            .ok_or(FatalError::InvariantViolation("blocked sender missing"))?;
        let item_size = queue.ring.item_size();
        if task.mailbox.take() != Some(item_size) {
            return Err(FatalError::InvariantViolation("blocked sender without an item"));
        }
        let (storage, mailbox) = self
            .heap
            .pair_mut(&queue.storage, &task.record)
            .ok_or(FatalError::InvariantViolation("queue storage overlaps a mailbox"))?;
        queue.ring.push(storage, &mailbox[..item_size]);
        Ok(Some(sender))
    }

    /// Copy `item` into a task's mailbox slot
    fn put_mailbox(&mut self, id: TaskId, item: &[u8]) -> Result<(), FatalError> {
        let task = self
            .sched
            .task_mut(id)
            .ok_or(FatalError::InvariantViolation("mailbox owner missing"))?;
        self.heap
            .slice_mut(&task.record)
            .get_mut(..item.len())
            .ok_or(FatalError::InvariantViolation("item larger than mailbox"))?
            .copy_from_slice(item);
        task.mailbox = Some(item.len());
        Ok(())
    }
}
