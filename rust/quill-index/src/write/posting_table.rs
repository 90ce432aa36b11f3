//! Open-addressing hash table from term text to posting index, one per field.
//!
//! Slot `i` holds a posting index or [`EMPTY`]. The table is sized to a power of
//! two and doubled when half full; collisions are resolved with a probe increment
//! derived from the hash code.

use super::{
    char_pool::CharPool,
    posting::{Posting, term_hash},
};

const EMPTY: u32 = u32::MAX;
const INITIAL_SIZE: usize = 4;

/// Where a term lives in the table, or where it would be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Found(u32),
    Vacant(usize),
}

pub struct PostingTable {
    slots: Vec<u32>,
    count: usize,
}

impl Default for PostingTable {
    fn default() -> Self {
        PostingTable::new()
    }
}

impl PostingTable {
    pub fn new() -> PostingTable {
        PostingTable {
            slots: vec![EMPTY; INITIAL_SIZE],
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn mask(&self) -> i32 {
        (self.slots.len() - 1) as i32
    }

    /// Looks `text` up, given its [`term_hash`].
    pub fn probe(&self, text: &[u16], code: i32, postings: &[Posting], chars: &CharPool) -> Probe {
        let mask = self.mask();
        let mut code = code;
        let mut pos = (code & mask) as usize;
        let mut id = self.slots[pos];
        if id != EMPTY && chars.text(postings[id as usize].text_start) != text {
            let inc = ((code >> 8).wrapping_add(code)) | 1;
            loop {
                code = code.wrapping_add(inc);
                pos = (code & mask) as usize;
                id = self.slots[pos];
                if id == EMPTY || chars.text(postings[id as usize].text_start) == text {
                    break;
                }
            }
        }
        if id == EMPTY {
            Probe::Vacant(pos)
        } else {
            Probe::Found(id)
        }
    }

    /// Stores posting `id` in a slot returned by [`probe`](Self::probe). Doubles the
    /// table once it is half full.
    pub fn insert(&mut self, slot: usize, id: u32, postings: &[Posting], chars: &CharPool) {
        debug_assert_eq!(self.slots[slot], EMPTY);
        self.slots[slot] = id;
        self.count += 1;
        if self.count == self.slots.len() / 2 {
            let size = self.slots.len() * 2;
            *self = std::mem::take(self).rehashed(size, postings, chars);
        }
    }

    /// Returns a table of `new_size` slots holding the same postings.
    pub fn rehashed(self, new_size: usize, postings: &[Posting], chars: &CharPool) -> PostingTable {
        debug_assert!(new_size.is_power_of_two() && new_size > self.count);
        let mask = (new_size - 1) as i32;
        let mut slots = vec![EMPTY; new_size];
        for &id in self.slots.iter().filter(|&&id| id != EMPTY) {
            let mut code = term_hash(chars.text(postings[id as usize].text_start));
            let mut pos = (code & mask) as usize;
            if slots[pos] != EMPTY {
                let inc = ((code >> 8).wrapping_add(code)) | 1;
                while slots[pos] != EMPTY {
                    code = code.wrapping_add(inc);
                    pos = (code & mask) as usize;
                }
            }
            slots[pos] = id;
        }
        PostingTable {
            slots,
            count: self.count,
        }
    }

    /// Shrinks a sparsely used table (under 20% full) to the smallest size that keeps
    /// it below half full.
    pub fn shrink(&mut self, postings: &[Posting], chars: &CharPool) {
        if self.count == 0 || (self.count as f64) / (self.slots.len() as f64) >= 0.2 {
            return;
        }
        let mut size = self.slots.len();
        while self.count < (size >> 1) && size >= 2 {
            size >>= 1;
        }
        size <<= 1;
        if size != self.slots.len() {
            *self = std::mem::take(self).rehashed(size, postings, chars);
        }
    }

    /// Empties every slot, keeping the current size.
    pub fn clear(&mut self) {
        self.slots.fill(EMPTY);
        self.count = 0;
    }

    /// Posting indices in slot order.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots.iter().copied().filter(|&id| id != EMPTY)
    }
}
