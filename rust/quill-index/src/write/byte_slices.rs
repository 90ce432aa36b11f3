//! Growable byte streams carved out of fixed-size blocks.
//!
//! Every stream starts as a 5-byte slice. When a slice fills up the stream continues
//! in a newly allocated, larger slice, following the size classes in
//! [`LEVEL_SIZES`]. Slices are recorded in an arena and linked forward with an
//! explicit handle, so a reader walks a stream from its first slice to the write
//! position without any in-band markers.
//!
//! A slice never straddles two blocks: when the current block cannot hold the next
//! slice, the pool moves to a new block and the tail of the old one stays unused.

use quill_io::{DataInput, DataOutput};

use super::blocks::{BYTE_BLOCK_MASK, BYTE_BLOCK_SHIFT, BYTE_BLOCK_SIZE, BlockSource};

/// Slice sizes by level.
pub const LEVEL_SIZES: [usize; 10] = [5, 14, 20, 30, 40, 40, 80, 80, 120, 200];

/// Level of the slice that follows a full slice of a given level.
pub const NEXT_LEVEL: [u8; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 9];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHandle(u32);

#[derive(Debug, Clone, Copy)]
struct Slice {
    /// Global address: block index in the high bits, offset in the low
    /// [`BYTE_BLOCK_SHIFT`] bits.
    start: u32,
    level: u8,
    next: Option<SliceHandle>,
}

impl Slice {
    fn size(&self) -> usize {
        LEVEL_SIZES[self.level as usize]
    }
}

/// A write position: a slice and the number of bytes already written into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPos {
    pub slice: SliceHandle,
    pub upto: u32,
}

/// A stream: its first slice and the current end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteStream {
    pub start: SliceHandle,
    pub end: StreamPos,
}

impl ByteStream {
    /// Whether nothing was written yet.
    pub fn is_empty(&self) -> bool {
        self.start == self.end.slice && self.end.upto == 0
    }
}

pub struct ByteSlicePool {
    blocks: Vec<Box<[u8]>>,
    /// Bytes used in the last block.
    block_upto: usize,
    slices: Vec<Slice>,
    track_used: bool,
}

impl ByteSlicePool {
    /// Creates an empty pool. Blocks of a `track_used` pool count as used RAM as
    /// soon as they are obtained.
    pub fn new(track_used: bool) -> ByteSlicePool {
        ByteSlicePool {
            blocks: Vec::new(),
            block_upto: BYTE_BLOCK_SIZE,
            slices: Vec::new(),
            track_used,
        }
    }

    /// Starts a new stream in a first-level slice.
    pub fn new_stream(&mut self, source: &dyn BlockSource) -> ByteStream {
        let slice = self.new_slice(source, 0);
        ByteStream {
            start: slice,
            end: StreamPos { slice, upto: 0 },
        }
    }

    fn new_slice(&mut self, source: &dyn BlockSource, level: u8) -> SliceHandle {
        let size = LEVEL_SIZES[level as usize];
        if self.block_upto + size > BYTE_BLOCK_SIZE {
            self.next_block(source);
        }
        let start = (((self.blocks.len() - 1) << BYTE_BLOCK_SHIFT) | self.block_upto) as u32;
        self.block_upto += size;
        let handle = SliceHandle(self.slices.len() as u32);
        self.slices.push(Slice {
            start,
            level,
            next: None,
        });
        handle
    }

    fn next_block(&mut self, source: &dyn BlockSource) {
        if self.blocks.len() == self.blocks.capacity() {
            let extra = (self.blocks.len() / 2).max(1);
            self.blocks.reserve_exact(extra);
        }
        self.blocks.push(source.byte_block(self.track_used));
        self.block_upto = 0;
    }

    pub fn write_byte(&mut self, source: &dyn BlockSource, stream: &mut ByteStream, b: u8) {
        let mut slice = self.slices[stream.end.slice.0 as usize];
        if stream.end.upto as usize == slice.size() {
            let next_level = NEXT_LEVEL[slice.level as usize];
            let next = self.new_slice(source, next_level);
            self.slices[stream.end.slice.0 as usize].next = Some(next);
            stream.end = StreamPos {
                slice: next,
                upto: 0,
            };
            slice = self.slices[next.0 as usize];
        }
        let addr = slice.start as usize + stream.end.upto as usize;
        self.blocks[addr >> BYTE_BLOCK_SHIFT][addr & BYTE_BLOCK_MASK] = b;
        stream.end.upto += 1;
    }

    pub fn write_bytes(&mut self, source: &dyn BlockSource, stream: &mut ByteStream, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(source, stream, b);
        }
    }

    pub fn write_vint(&mut self, source: &dyn BlockSource, stream: &mut ByteStream, mut v: u32) {
        while v & !0x7f != 0 {
            self.write_byte(source, stream, ((v & 0x7f) | 0x80) as u8);
            v >>= 7;
        }
        self.write_byte(source, stream, v as u8);
    }

    /// Returns a reader over everything written to `stream` so far.
    pub fn reader(&self, stream: &ByteStream) -> SliceReader<'_> {
        SliceReader::new(self, stream.start, stream.end)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Forgets every stream, zero-fills the used part of the blocks and returns all
    /// blocks but the first.
    pub fn reset(&mut self) -> Vec<Box<[u8]>> {
        let last = self.blocks.len().saturating_sub(1);
        for (i, block) in self.blocks.iter_mut().enumerate() {
            let used = if i == last { self.block_upto } else { BYTE_BLOCK_SIZE };
            block[..used.min(BYTE_BLOCK_SIZE)].fill(0);
        }
        self.slices.clear();
        let recycled = if self.blocks.len() > 1 {
            self.blocks.split_off(1)
        } else {
            Vec::new()
        };
        self.block_upto = if self.blocks.is_empty() {
            BYTE_BLOCK_SIZE
        } else {
            0
        };
        recycled
    }

    fn byte_at(&self, addr: usize) -> u8 {
        self.blocks[addr >> BYTE_BLOCK_SHIFT][addr & BYTE_BLOCK_MASK]
    }
}

/// Reads one stream from its first slice up to a fixed end position.
pub struct SliceReader<'a> {
    pool: &'a ByteSlicePool,
    slice: SliceHandle,
    upto: usize,
    limit: usize,
    end: StreamPos,
}

impl<'a> SliceReader<'a> {
    fn new(pool: &'a ByteSlicePool, start: SliceHandle, end: StreamPos) -> SliceReader<'a> {
        let mut reader = SliceReader {
            pool,
            slice: start,
            upto: 0,
            limit: 0,
            end,
        };
        reader.limit = reader.limit_of(start);
        reader
    }

    fn limit_of(&self, slice: SliceHandle) -> usize {
        if slice == self.end.slice {
            self.end.upto as usize
        } else {
            self.pool.slices[slice.0 as usize].size()
        }
    }

    pub fn is_eof(&self) -> bool {
        self.slice == self.end.slice && self.upto == self.limit
    }

    /// Moves to the next slice if the current one is exhausted; `false` at the end.
    fn fill(&mut self) -> bool {
        while self.upto == self.limit {
            if self.slice == self.end.slice {
                return false;
            }
            match self.pool.slices[self.slice.0 as usize].next {
                Some(next) => {
                    self.slice = next;
                    self.upto = 0;
                    self.limit = self.limit_of(next);
                }
                None => return false,
            }
        }
        true
    }

    fn current_addr(&self) -> usize {
        self.pool.slices[self.slice.0 as usize].start as usize + self.upto
    }

    /// Copies the rest of the stream to `out`.
    pub fn write_to<W: DataOutput + ?Sized>(&mut self, out: &mut W) -> std::io::Result<()> {
        while self.fill() {
            let addr = self.current_addr();
            let len = self.limit - self.upto;
            let block = &self.pool.blocks[addr >> BYTE_BLOCK_SHIFT];
            let offset = addr & BYTE_BLOCK_MASK;
            out.write_bytes(&block[offset..offset + len])?;
            self.upto = self.limit;
        }
        Ok(())
    }
}

impl DataInput for SliceReader<'_> {
    fn read_byte(&mut self) -> std::io::Result<u8> {
        if !self.fill() {
            return Err(quill_io::utils::unexpected_eof("byte slice stream"));
        }
        let b = self.pool.byte_at(self.current_addr());
        self.upto += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            if !self.fill() {
                return Err(quill_io::utils::unexpected_eof("byte slice stream"));
            }
            let addr = self.current_addr();
            let len = (self.limit - self.upto).min(buf.len() - filled);
            let block = &self.pool.blocks[addr >> BYTE_BLOCK_SHIFT];
            let offset = addr & BYTE_BLOCK_MASK;
            buf[filled..filled + len].copy_from_slice(&block[offset..offset + len]);
            filled += len;
            self.upto += len;
        }
        Ok(())
    }
}
