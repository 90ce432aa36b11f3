//! Interned term text.
//!
//! Terms are stored as UTF-16 code units followed by [`TERM_END`], packed into
//! fixed-size char blocks. A term is addressed by its global start offset.

use super::blocks::{BlockSource, CHAR_BLOCK_MASK, CHAR_BLOCK_SHIFT, CHAR_BLOCK_SIZE};

/// Terminator written after each term. Real `0xFFFF` units are replaced with
/// `0xFFFD` before interning, so the terminator never occurs inside a term.
pub const TERM_END: u16 = 0xFFFF;

pub struct CharPool {
    blocks: Vec<Box<[u16]>>,
    /// Units used in the last block.
    block_upto: usize,
}

impl CharPool {
    pub fn new() -> CharPool {
        CharPool {
            blocks: Vec::new(),
            block_upto: CHAR_BLOCK_SIZE,
        }
    }

    /// Copies `term` into the pool; returns its start address, or `None` when the
    /// term with its terminator is longer than one block.
    pub fn intern(&mut self, source: &dyn BlockSource, term: &[u16]) -> Option<u32> {
        let len = term.len() + 1;
        if len > CHAR_BLOCK_SIZE {
            return None;
        }
        if self.block_upto + len > CHAR_BLOCK_SIZE {
            self.blocks.push(source.char_block());
            self.block_upto = 0;
        }
        let index = self.blocks.len() - 1;
        let block = &mut self.blocks[index];
        let start = self.block_upto;
        block[start..start + term.len()].copy_from_slice(term);
        block[start + term.len()] = TERM_END;
        self.block_upto += len;
        Some(((index << CHAR_BLOCK_SHIFT) | start) as u32)
    }

    /// The term starting at `start`, without its terminator.
    pub fn text(&self, start: u32) -> &[u16] {
        let start = start as usize;
        let block = &self.blocks[start >> CHAR_BLOCK_SHIFT];
        let offset = start & CHAR_BLOCK_MASK;
        let len = block[offset..]
            .iter()
            .position(|&c| c == TERM_END)
            .unwrap_or(block.len() - offset);
        &block[offset..offset + len]
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Forgets every term and returns all blocks but the first.
    pub fn reset(&mut self) -> Vec<Box<[u16]>> {
        let recycled = if self.blocks.len() > 1 {
            self.blocks.split_off(1)
        } else {
            Vec::new()
        };
        self.block_upto = if self.blocks.is_empty() {
            CHAR_BLOCK_SIZE
        } else {
            0
        };
        recycled
    }
}

impl Default for CharPool {
    fn default() -> Self {
        CharPool::new()
    }
}

/// Converts `text` to the UTF-16 form stored in the pool, replacing the content of
/// `out`.
pub fn encode_term(text: &str, out: &mut Vec<u16>) {
    out.clear();
    out.extend(
        text.encode_utf16()
            .map(|c| if c == TERM_END { 0xFFFD } else { c }),
    );
}

/// Compares two pooled terms. The terminator sorts below every real unit, so a term
/// sorts before every longer term it is a prefix of; plain slice ordering matches.
pub fn compare_terms(a: &[u16], b: &[u16]) -> std::cmp::Ordering {
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::blocks::testing::LocalBlocks;
    use crate::write::blocks::{CHAR_BLOCK_BYTES, MAX_TERM_LENGTH};

    fn units(s: &str) -> Vec<u16> {
        let mut out = Vec::new();
        encode_term(s, &mut out);
        out
    }

    #[test]
    fn test_intern_and_read_back() {
        let blocks = LocalBlocks::default();
        let mut pool = CharPool::new();
        let a = pool.intern(&blocks, &units("apple")).unwrap();
        let b = pool.intern(&blocks, &units("b")).unwrap();
        let empty = pool.intern(&blocks, &[]).unwrap();
        assert_eq!(pool.text(a), units("apple").as_slice());
        assert_eq!(pool.text(b), units("b").as_slice());
        assert!(pool.text(empty).is_empty());
        assert_eq!(b, 6);
        assert_eq!(blocks.budget.used(), CHAR_BLOCK_BYTES);
    }

    #[test]
    fn test_term_longer_than_block_is_rejected() {
        let blocks = LocalBlocks::default();
        let mut pool = CharPool::new();
        let longest = vec![b'x' as u16; MAX_TERM_LENGTH];
        assert!(pool.intern(&blocks, &longest).is_some());
        let too_long = vec![b'x' as u16; MAX_TERM_LENGTH + 1];
        assert!(pool.intern(&blocks, &too_long).is_none());
        assert_eq!(pool.num_blocks(), 1);
    }

    #[test]
    fn test_moves_to_next_block_when_full() {
        let blocks = LocalBlocks::default();
        let mut pool = CharPool::new();
        let big = vec![b'y' as u16; CHAR_BLOCK_SIZE - 10];
        pool.intern(&blocks, &big).unwrap();
        let next = pool.intern(&blocks, &units("does not fit here")).unwrap();
        assert_eq!(next as usize, CHAR_BLOCK_SIZE);
        assert_eq!(pool.text(next), units("does not fit here").as_slice());

        assert_eq!(pool.reset().len(), 1);
        assert_eq!(pool.num_blocks(), 1);
        assert_eq!(pool.intern(&blocks, &units("again")).unwrap(), 0);
    }

    #[test]
    fn test_encoding_and_order() {
        assert_eq!(units("a\u{FFFF}"), vec![b'a' as u16, 0xFFFD]);
        assert!(compare_terms(&units("ab"), &units("abc")).is_lt());
        assert!(compare_terms(&units("abd"), &units("abc")).is_gt());
        // code unit order, not code point order
        assert!(compare_terms(&units("\u{FF5E}"), &units("\u{1F600}")).is_gt());
    }
}
