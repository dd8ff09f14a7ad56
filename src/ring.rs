//! Fixed-slot ring over caller-provided storage
//!
//! Tracks head and occupancy; the slots live in the queue's arena block.
//!
//! Author: Tern-RTOS contributors
//!
//! # Invariants
//! - `len <= capacity`
//! - The item at logical index `i` occupies slot `(head + i) % capacity`.

/// Head/occupancy bookkeeping for `capacity` slots of `item_size` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRing {
    head: usize,
    len: usize,
    capacity: usize,
    item_size: usize,
}

impl SlotRing {
    pub const fn new(capacity: usize, item_size: usize) -> Self {
        Self {
            head: 0,
            len: 0,
            capacity,
            item_size,
        }
    }

    /// Storage bytes needed for this ring
    pub const fn storage_size(&self) -> usize {
        self.capacity * self.item_size
    }

    /// Copy `item` into the next free slot; false if full
    pub fn push(&mut self, storage: &mut [u8], item: &[u8]) -> bool {
        debug_assert_eq!(item.len(), self.item_size);
        if self.is_full() {
            return false;
        }
        let slot = (self.head + self.len) % self.capacity;
        let at = slot * self.item_size;
        storage[at..at + self.item_size].copy_from_slice(item);
        self.len += 1;
        true
    }

    /// Copy the oldest item into `out` and release its slot; false if empty
    pub fn pop(&mut self, storage: &[u8], out: &mut [u8]) -> bool {
        if !self.peek(storage, out) {
            return false;
        }
        self.head = (self.head + 1) % self.capacity;
        self.len -= 1;
        true
    }

    /// Copy the oldest item into `out` without releasing it
    pub fn peek(&self, storage: &[u8], out: &mut [u8]) -> bool {
        if self.is_empty() {
            return false;
        }
        let at = self.head * self.item_size;
        out.copy_from_slice(&storage[at..at + self.item_size]);
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}
