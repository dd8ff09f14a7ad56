//! Best-fit arena allocator — deterministic, no compaction
//!
//! - 8-byte header `[size: u32][link: u32]` in front of every block
//! - Address-ordered free list through `link`; `IN_USE` marks live blocks
//! - Frees coalesce with both neighbours
//! - Offsets instead of pointers, so the whole allocator is safe code
//!
//! Author: Tern-RTOS contributors
//!
//! # Invariants
//! - Every block offset is a multiple of `ALIGN` from `base`.
//! - Blocks tile `[base, end)` exactly; walking sizes from `base` lands on `end`.
//! - The free list is strictly increasing and no two free blocks touch.
//! - `free_bytes` equals the sum of free block sizes.

use alloc::boxed::Box;
use alloc::vec;
use core::fmt;

/// Payload alignment and block granularity
pub const ALIGN: usize = 8;

const HEADER: usize = 8;
const MIN_PAYLOAD: usize = 8;
const MIN_BLOCK: usize = HEADER + MIN_PAYLOAD;

/// End of the free list
const NIL: u32 = u32::MAX;
/// Link value of an allocated block
const IN_USE: u32 = u32::MAX - 1;

/// Allocator errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// No free block large enough
    OutOfMemory,
    /// Zero-byte request
    ZeroSize,
    /// Block not allocated by this heap, or already freed
    InvalidFree,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::ZeroSize => write!(f, "zero-sized allocation"),
            Self::InvalidFree => write!(f, "invalid or double free"),
        }
    }
}

/// A live allocation: payload offset and usable length within the arena
///
/// Deliberately not `Clone`: a block is freed by value exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    offset: u32,
    len: u32,
}

impl Block {
    /// Payload offset from the start of the arena
    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    /// Usable payload length (request rounded up to `ALIGN`, possibly more)
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Allocator statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes managed (after alignment trimming)
    pub arena_size: usize,
    /// Bytes currently free, headers included
    pub free_bytes: usize,
    /// Lowest `free_bytes` ever observed
    pub min_free_bytes: usize,
    /// Number of free blocks
    pub free_blocks: usize,
    /// Largest single free block, header included
    pub largest_free_block: usize,
    /// Live allocations
    pub live_allocations: usize,
}

/// Best-fit allocator over a fixed byte arena
pub struct Heap {
    arena: Box<[u8]>,
    /// First aligned offset
    base: usize,
    /// One past the last usable byte
    end: usize,
    free_head: u32,
    free_bytes: usize,
    min_free_bytes: usize,
    live: usize,
}

#[inline]
fn align_up(n: usize) -> usize {
    (n + ALIGN - 1) & !(ALIGN - 1)
}

impl Heap {
    /// Create a heap over a freshly zeroed arena of `size` bytes
    pub fn new(size: usize) -> Self {
        let arena = vec![0u8; size].into_boxed_slice();
        let base = arena.as_ptr().align_offset(ALIGN).min(size);
        let end = base + ((size - base) & !(ALIGN - 1));

        let mut heap = Self {
            arena,
            base,
            end,
            free_head: NIL,
            free_bytes: 0,
            min_free_bytes: 0,
            live: 0,
        };
        if end - base >= MIN_BLOCK {
            heap.write_header(base, end - base, NIL);
            heap.free_head = base as u32;
            heap.free_bytes = end - base;
            heap.min_free_bytes = end - base;
        }
        heap
    }

    /// Carve the smallest free block that holds `size` bytes
    pub fn allocate(&mut self, size: usize) -> Result<Block, HeapError> {
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }
        if size > self.end - self.base {
            return Err(HeapError::OutOfMemory);
        }
        let need = (align_up(size) + HEADER).max(MIN_BLOCK);

        // best fit; an exact match ends the scan early
        let mut best: Option<(u32, usize, usize)> = None;
        let mut prev = NIL;
        let mut cur = self.free_head;
        while cur != NIL {
            let blk = cur as usize;
            let blk_size = self.block_size(blk);
            if blk_size >= need && best.map_or(true, |(_, _, s)| blk_size < s) {
                best = Some((prev, blk, blk_size));
                if blk_size == need {
                    break;
                }
            }
            prev = cur;
            cur = self.link(blk);
        }

        let (prev, blk, blk_size) = best.ok_or(HeapError::OutOfMemory)?;
        let next = self.link(blk);
        let taken = if blk_size - need >= MIN_BLOCK {
            let rest = blk + need;
            self.write_header(rest, blk_size - need, next);
            self.relink(prev, rest as u32);
            need
        } else {
            self.relink(prev, next);
            blk_size
        };
        self.write_header(blk, taken, IN_USE);

        self.free_bytes -= taken;
        self.min_free_bytes = self.min_free_bytes.min(self.free_bytes);
        self.live += 1;

        Ok(Block {
            offset: (blk + HEADER) as u32,
            len: (taken - HEADER) as u32,
        })
    }

    /// Return a block, merging it with adjacent free blocks
    pub fn free(&mut self, block: Block) -> Result<(), HeapError> {
        let blk = self.validate(&block)?;
        let size = self.block_size(blk);

        let mut prev = NIL;
        let mut cur = self.free_head;
        while cur != NIL && (cur as usize) < blk {
            prev = cur;
            cur = self.link(cur as usize);
        }

        let mut merged = size;
        let mut next = cur;
        if cur != NIL && blk + size == cur as usize {
            merged += self.block_size(cur as usize);
            next = self.link(cur as usize);
        }

        let prev_blk = prev as usize;
        if prev != NIL && prev_blk + self.block_size(prev_blk) == blk {
            let prev_size = self.block_size(prev_blk);
            self.write_header(prev_blk, prev_size + merged, next);
            // the absorbed header must not look allocated any more
            self.write_header(blk, 0, NIL);
        } else {
            self.write_header(blk, merged, next);
            self.relink(prev, blk as u32);
        }

        self.free_bytes += size;
        self.live -= 1;
        Ok(())
    }

    /// Payload bytes of a live block
    pub fn slice(&self, block: &Block) -> &[u8] {
        &self.arena[block.offset()..block.offset() + block.len()]
    }

    /// Mutable payload bytes of a live block
    pub fn slice_mut(&mut self, block: &Block) -> &mut [u8] {
        &mut self.arena[block.offset()..block.offset() + block.len()]
    }

    /// Payloads of two distinct live blocks, borrowed mutably together
    ///
    /// `None` if the blocks overlap.
    pub fn pair_mut(&mut self, a: &Block, b: &Block) -> Option<(&mut [u8], &mut [u8])> {
        let (a_at, b_at) = (a.offset(), b.offset());
        if a_at + a.len() <= b_at {
            let (low, high) = self.arena.split_at_mut(b_at);
            Some((&mut low[a_at..a_at + a.len()], &mut high[..b.len()]))
        } else if b_at + b.len() <= a_at {
            let (low, high) = self.arena.split_at_mut(a_at);
            Some((&mut high[..a.len()], &mut low[b_at..b_at + b.len()]))
        } else {
            None
        }
    }

    /// Bytes currently free, headers included
    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    pub fn stats(&self) -> HeapStats {
        let mut free_blocks = 0;
        let mut largest = 0;
        let mut cur = self.free_head;
        while cur != NIL {
            free_blocks += 1;
            largest = largest.max(self.block_size(cur as usize));
            cur = self.link(cur as usize);
        }
        HeapStats {
            arena_size: self.end - self.base,
            free_bytes: self.free_bytes,
            min_free_bytes: self.min_free_bytes,
            free_blocks,
            largest_free_block: largest,
            live_allocations: self.live,
        }
    }

    /// Walk the arena and the free list and confirm every invariant holds
    pub fn check(&self) -> bool {
        // physical walk: blocks tile the arena
        let mut at = self.base;
        let mut used_blocks = 0;
        let mut free_seen = 0;
        while at < self.end {
            let size = self.block_size(at);
            if size < MIN_BLOCK || size % ALIGN != 0 || at + size > self.end {
                return false;
            }
            if self.link(at) == IN_USE {
                used_blocks += 1;
            } else {
                free_seen += size;
            }
            at += size;
        }
        if at != self.end || used_blocks != self.live || free_seen != self.free_bytes {
            return false;
        }

        // free list: ordered, coalesced, sums up
        let mut total = 0;
        let mut last_end: Option<usize> = None;
        let mut cur = self.free_head;
        while cur != NIL {
            let blk = cur as usize;
            if blk < self.base || blk >= self.end || cur == IN_USE {
                return false;
            }
            if let Some(prev_end) = last_end {
                if blk <= prev_end {
                    return false;
                }
            }
            let size = self.block_size(blk);
            total += size;
            last_end = Some(blk + size);
            cur = self.link(blk);
        }
        total == self.free_bytes
    }

    fn validate(&self, block: &Block) -> Result<usize, HeapError> {
        let blk = block
            .offset()
            .checked_sub(HEADER)
            .ok_or(HeapError::InvalidFree)?;
        if blk < self.base || blk + MIN_BLOCK > self.end || (blk - self.base) % ALIGN != 0 {
            return Err(HeapError::InvalidFree);
        }
        if self.link(blk) != IN_USE || self.block_size(blk) != block.len() + HEADER {
            return Err(HeapError::InvalidFree);
        }
        Ok(blk)
    }

    fn relink(&mut self, prev: u32, target: u32) {
        if prev == NIL {
            self.free_head = target;
        } else {
            let prev = prev as usize;
            let size = self.block_size(prev);
            self.write_header(prev, size, target);
        }
    }

    fn read_u32(&self, at: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.arena[at..at + 4]);
        u32::from_le_bytes(bytes)
    }

    fn block_size(&self, blk: usize) -> usize {
        self.read_u32(blk) as usize
    }

    fn link(&self, blk: usize) -> u32 {
        self.read_u32(blk + 4)
    }

    fn write_header(&mut self, blk: usize, size: usize, link: u32) {
        self.arena[blk..blk + 4].copy_from_slice(&(size as u32).to_le_bytes());
        self.arena[blk + 4..blk + 8].copy_from_slice(&link.to_le_bytes());
    }
}
