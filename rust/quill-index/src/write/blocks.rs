//! Fixed-size blocks backing the per-context pools, and their shared free lists.

use quill_budget_tracker::RamBudget;

pub const BYTE_BLOCK_SHIFT: usize = 15;
pub const BYTE_BLOCK_SIZE: usize = 1 << BYTE_BLOCK_SHIFT;
pub const BYTE_BLOCK_MASK: usize = BYTE_BLOCK_SIZE - 1;

pub const CHAR_BLOCK_SHIFT: usize = 14;
pub const CHAR_BLOCK_SIZE: usize = 1 << CHAR_BLOCK_SHIFT;
pub const CHAR_BLOCK_MASK: usize = CHAR_BLOCK_SIZE - 1;

/// Accounted size of one char block (two bytes per code unit).
pub const CHAR_BLOCK_BYTES: u64 = CHAR_BLOCK_SIZE as u64 * 2;

/// Longest term (in UTF-16 code units) that fits one char block with its terminator.
pub const MAX_TERM_LENGTH: usize = CHAR_BLOCK_SIZE - 1;

/// Accounted size of one posting record: an 8-byte header, nine 4-byte integers and
/// five 4-byte references.
pub const POSTING_NUM_BYTE: u64 = 8 + 9 * 4 + 5 * 4;

/// Posting records a context reserves from the shared free list at a time.
pub const POSTINGS_BATCH: usize = 256;

/// Where pools obtain their blocks and posting quotas.
///
/// Calls happen while a context is checked out, so implementations synchronize
/// internally.
pub trait BlockSource {
    /// Returns a zero-filled byte block. `track_used` also counts the block as used.
    fn byte_block(&self, track_used: bool) -> Box<[u8]>;

    /// Returns a char block, always counted as used.
    fn char_block(&self) -> Box<[u16]>;

    /// Takes back byte blocks handed out earlier; they must be zero-filled.
    fn recycle_byte_blocks(&self, blocks: Vec<Box<[u8]>>);

    /// Reserves `count` posting records for one context.
    fn reserve_postings(&self, count: usize);
}

/// Blocks and posting records returned by a context reset.
#[derive(Default)]
pub(crate) struct Recycled {
    pub byte_blocks: Vec<Box<[u8]>>,
    pub char_blocks: Vec<Box<[u16]>>,
    pub postings: usize,
}

/// Free lists shared by all contexts of one writer. Blocks in here stay counted as
/// allocated until [`release_one`](BlockAllocator::release_one) hands them back.
#[derive(Default)]
pub(crate) struct BlockAllocator {
    free_byte_blocks: Vec<Box<[u8]>>,
    free_char_blocks: Vec<Box<[u16]>>,
    free_postings: usize,
    allocated_postings: usize,
}

/// Kinds of free memory released by one balancing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FreeKind {
    ByteBlock,
    CharBlock,
    Postings,
}

impl BlockAllocator {
    /// Pops a free byte block or allocates a new one. Returns the block and whether
    /// it is new (and therefore must be noted as allocated).
    pub fn take_byte_block(&mut self) -> (Box<[u8]>, bool) {
        match self.free_byte_blocks.pop() {
            Some(block) => (block, false),
            None => (vec![0u8; BYTE_BLOCK_SIZE].into_boxed_slice(), true),
        }
    }

    pub fn take_char_block(&mut self) -> (Box<[u16]>, bool) {
        match self.free_char_blocks.pop() {
            Some(block) => (block, false),
            None => (vec![0u16; CHAR_BLOCK_SIZE].into_boxed_slice(), true),
        }
    }

    /// Takes `count` posting records off the free list; returns how many had to be
    /// newly allocated.
    pub fn take_postings(&mut self, count: usize) -> usize {
        let reused = count.min(self.free_postings);
        self.free_postings -= reused;
        let fresh = count - reused;
        self.allocated_postings += fresh;
        fresh
    }

    pub fn recycle_byte_blocks(&mut self, blocks: Vec<Box<[u8]>>) {
        self.free_byte_blocks.extend(blocks);
    }

    pub fn recycle(&mut self, recycled: Recycled) {
        self.free_byte_blocks.extend(recycled.byte_blocks);
        self.free_char_blocks.extend(recycled.char_blocks);
        self.free_postings += recycled.postings;
        debug_assert!(self.free_postings <= self.allocated_postings);
    }

    pub fn is_empty(&self) -> bool {
        self.free_byte_blocks.is_empty() && self.free_char_blocks.is_empty() && self.free_postings == 0
    }

    /// Drops one unit of free memory of the given kind, returning the number of bytes
    /// released (zero when that free list is empty).
    pub fn release_one(&mut self, kind: FreeKind, budget: &RamBudget) -> u64 {
        let bytes = match kind {
            FreeKind::ByteBlock => self
                .free_byte_blocks
                .pop()
                .map_or(0, |_| BYTE_BLOCK_SIZE as u64),
            FreeKind::CharBlock => self.free_char_blocks.pop().map_or(0, |_| CHAR_BLOCK_BYTES),
            FreeKind::Postings => {
                let count = self.free_postings.min(BYTE_BLOCK_SIZE / POSTING_NUM_BYTE as usize);
                self.free_postings -= count;
                self.allocated_postings -= count;
                count as u64 * POSTING_NUM_BYTE
            }
        };
        if bytes > 0 {
            budget.release_allocation(bytes);
        }
        bytes
    }

    pub fn free_postings(&self) -> usize {
        self.free_postings
    }

    pub fn free_byte_blocks(&self) -> usize {
        self.free_byte_blocks.len()
    }

    pub fn free_char_blocks(&self) -> usize {
        self.free_char_blocks.len()
    }
}

/// A single-threaded [`BlockSource`] for exercising pools in isolation.
#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;

    use quill_budget_tracker::RamBudget;

    use super::*;

    #[derive(Default)]
    pub struct LocalBlocks {
        pub allocator: RefCell<BlockAllocator>,
        pub budget: RamBudget,
    }

    impl BlockSource for LocalBlocks {
        fn byte_block(&self, track_used: bool) -> Box<[u8]> {
            let (block, fresh) = self.allocator.borrow_mut().take_byte_block();
            if fresh {
                self.budget.note_allocation(BYTE_BLOCK_SIZE as u64);
            }
            if track_used {
                self.budget.note_use(BYTE_BLOCK_SIZE as u64);
            }
            block
        }

        fn char_block(&self) -> Box<[u16]> {
            let (block, fresh) = self.allocator.borrow_mut().take_char_block();
            if fresh {
                self.budget.note_allocation(CHAR_BLOCK_BYTES);
            }
            self.budget.note_use(CHAR_BLOCK_BYTES);
            block
        }

        fn recycle_byte_blocks(&self, blocks: Vec<Box<[u8]>>) {
            self.allocator.borrow_mut().recycle_byte_blocks(blocks);
        }

        fn reserve_postings(&self, count: usize) {
            let fresh = self.allocator.borrow_mut().take_postings(count);
            self.budget.note_allocation(fresh as u64 * POSTING_NUM_BYTE);
            self.budget.note_use(count as u64 * POSTING_NUM_BYTE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posting_record_size() {
        assert_eq!(POSTING_NUM_BYTE, 64);
        assert_eq!(BYTE_BLOCK_SIZE / POSTING_NUM_BYTE as usize, 512);
    }

    #[test]
    fn test_take_postings_prefers_free_list() {
        let mut allocator = BlockAllocator::default();
        assert_eq!(allocator.take_postings(256), 256);
        allocator.recycle(Recycled {
            postings: 100,
            ..Default::default()
        });
        assert_eq!(allocator.take_postings(256), 156);
        assert_eq!(allocator.free_postings(), 0);
    }

    #[test]
    fn test_release_one() {
        let budget = RamBudget::default();
        let mut allocator = BlockAllocator::default();
        let (block, fresh) = allocator.take_byte_block();
        assert!(fresh);
        budget.note_allocation(BYTE_BLOCK_SIZE as u64);
        allocator.recycle_byte_blocks(vec![block]);
        let (block, fresh) = allocator.take_byte_block();
        assert!(!fresh);
        allocator.recycle_byte_blocks(vec![block]);

        assert_eq!(
            allocator.release_one(FreeKind::ByteBlock, &budget),
            BYTE_BLOCK_SIZE as u64
        );
        assert_eq!(budget.allocated(), 0);
        assert_eq!(allocator.release_one(FreeKind::CharBlock, &budget), 0);
        assert!(allocator.is_empty());
    }

    #[test]
    fn test_release_postings_in_block_sized_batches() {
        let budget = RamBudget::default();
        let mut allocator = BlockAllocator::default();
        allocator.take_postings(600);
        budget.note_allocation(600 * POSTING_NUM_BYTE);
        allocator.recycle(Recycled {
            postings: 600,
            ..Default::default()
        });
        assert_eq!(
            allocator.release_one(FreeKind::Postings, &budget),
            512 * POSTING_NUM_BYTE
        );
        assert_eq!(allocator.free_postings(), 88);
        assert_eq!(budget.allocated(), 88 * POSTING_NUM_BYTE);
    }
}
