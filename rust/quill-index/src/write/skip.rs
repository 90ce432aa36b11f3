//! Multi-level skip lists appended to each term's document list in `.frq`.
//!
//! Level `l` gets an entry every `interval^(l+1)` documents. Entries above level 0
//! carry a pointer to the position in the level below right after the matching
//! entry there. The levels are written top-down, each but level 0 prefixed by its
//! length.

use quill_io::{DataOutput, RamOutput};

/// Number of skip levels for a list of `doc_count` documents: the largest `l`
/// with `interval^l <= doc_count`, capped at `max_levels`.
pub fn num_skip_levels(doc_count: u32, interval: u32, max_levels: u32) -> u32 {
    let mut levels = 0;
    let mut span = interval as u64;
    while span <= doc_count as u64 && levels < max_levels {
        levels += 1;
        span *= interval as u64;
    }
    levels
}

pub(crate) struct SkipListWriter {
    interval: u32,
    levels: Vec<RamOutput>,

    cur_doc: u32,
    cur_store_payloads: bool,
    cur_payload_length: i32,
    cur_freq_pointer: u64,
    cur_prox_pointer: u64,

    last_doc: Vec<u32>,
    last_payload_length: Vec<i32>,
    last_freq_pointer: Vec<u64>,
    last_prox_pointer: Vec<u64>,
}

impl SkipListWriter {
    /// Creates a writer for the terms of a segment holding `doc_count` documents.
    pub fn new(interval: u32, max_levels: u32, doc_count: u32) -> SkipListWriter {
        let levels = num_skip_levels(doc_count, interval, max_levels) as usize;
        SkipListWriter {
            interval,
            levels: (0..levels).map(|_| RamOutput::new()).collect(),
            cur_doc: 0,
            cur_store_payloads: false,
            cur_payload_length: 0,
            cur_freq_pointer: 0,
            cur_prox_pointer: 0,
            last_doc: vec![0; levels],
            last_payload_length: vec![-1; levels],
            last_freq_pointer: vec![0; levels],
            last_prox_pointer: vec![0; levels],
        }
    }

    /// Starts the skip list of a new term whose postings begin at the given file
    /// pointers.
    pub fn reset(&mut self, freq_pointer: u64, prox_pointer: u64) {
        for level in &mut self.levels {
            level.reset();
        }
        self.last_doc.fill(0);
        self.last_payload_length.fill(-1);
        self.last_freq_pointer.fill(freq_pointer);
        self.last_prox_pointer.fill(prox_pointer);
    }

    /// Records the state after the last document written: its id, the payload
    /// length in effect, and the current freq and prox file pointers.
    pub fn set_skip_data(
        &mut self,
        doc: u32,
        store_payloads: bool,
        payload_length: i32,
        freq_pointer: u64,
        prox_pointer: u64,
    ) {
        self.cur_doc = doc;
        self.cur_store_payloads = store_payloads;
        self.cur_payload_length = payload_length;
        self.cur_freq_pointer = freq_pointer;
        self.cur_prox_pointer = prox_pointer;
    }

    /// Buffers an entry for the data set last, on every level `df` is a multiple
    /// of.
    pub fn buffer_skip(&mut self, mut df: u32) -> std::io::Result<()> {
        let mut num_levels = 0;
        while df % self.interval == 0 && num_levels < self.levels.len() {
            num_levels += 1;
            df /= self.interval;
        }
        let mut child_pointer = 0;
        for level in 0..num_levels {
            self.write_skip_data(level)?;
            let new_child_pointer = self.levels[level].file_pointer();
            if level != 0 {
                self.levels[level].write_vlong(child_pointer)?;
            }
            child_pointer = new_child_pointer;
        }
        Ok(())
    }

    fn write_skip_data(&mut self, level: usize) -> std::io::Result<()> {
        let out = &mut self.levels[level];
        let delta = self.cur_doc - self.last_doc[level];
        if self.cur_store_payloads {
            if self.cur_payload_length == self.last_payload_length[level] {
                out.write_vint(delta * 2)?;
            } else {
                out.write_vint(delta * 2 + 1)?;
                out.write_vint(self.cur_payload_length as u32)?;
                self.last_payload_length[level] = self.cur_payload_length;
            }
        } else {
            out.write_vint(delta)?;
        }
        out.write_vint((self.cur_freq_pointer - self.last_freq_pointer[level]) as u32)?;
        out.write_vint((self.cur_prox_pointer - self.last_prox_pointer[level]) as u32)?;
        self.last_doc[level] = self.cur_doc;
        self.last_freq_pointer[level] = self.cur_freq_pointer;
        self.last_prox_pointer[level] = self.cur_prox_pointer;
        Ok(())
    }

    /// Appends the buffered levels to `out`.
    pub fn write_skip<W: DataOutput + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        let Some((level0, upper)) = self.levels.split_first() else {
            return Ok(());
        };
        for level in upper.iter().rev() {
            if !level.is_empty() {
                out.write_vlong(level.file_pointer())?;
                level.write_to(out)?;
            }
        }
        level0.write_to(out)
    }
}

#[cfg(test)]
mod tests {
    use quill_io::DataInput;

    use super::*;

    #[test]
    fn test_num_skip_levels() {
        assert_eq!(num_skip_levels(0, 16, 10), 0);
        assert_eq!(num_skip_levels(15, 16, 10), 0);
        assert_eq!(num_skip_levels(16, 16, 10), 1);
        assert_eq!(num_skip_levels(255, 16, 10), 1);
        assert_eq!(num_skip_levels(256, 16, 10), 2);
        assert_eq!(num_skip_levels(u32::MAX, 16, 3), 3);
        assert_eq!(num_skip_levels(u32::MAX, 2, 40), 31);
    }

    #[test]
    fn test_single_level_entries() {
        let mut writer = SkipListWriter::new(4, 10, 10);
        writer.reset(100, 200);
        // after 3 documents, the last one being doc 6
        writer.set_skip_data(6, false, -1, 110, 230);
        writer.buffer_skip(4).unwrap();
        writer.set_skip_data(9, false, -1, 115, 240);
        writer.buffer_skip(8).unwrap();

        let mut out = RamOutput::new();
        writer.write_skip(&mut out).unwrap();
        assert_eq!(out.as_bytes(), [6, 10, 30, 3, 5, 10]);
    }

    #[test]
    fn test_payload_length_written_when_changed() {
        let mut writer = SkipListWriter::new(2, 10, 4);
        assert_eq!(writer.levels.len(), 2);
        writer.reset(0, 0);
        writer.set_skip_data(1, true, 3, 2, 10);
        writer.buffer_skip(2).unwrap();
        writer.set_skip_data(3, true, 3, 4, 20);
        writer.buffer_skip(4).unwrap();

        let mut out = RamOutput::new();
        writer.write_skip(&mut out).unwrap();
        let mut input = out.as_bytes();
        // level 1: one entry covering four documents, then its child pointer
        let level1_len = input.read_vlong().unwrap();
        assert_eq!(level1_len, 5);
        assert_eq!(input.read_vint().unwrap(), 3 * 2 + 1);
        assert_eq!(input.read_vint().unwrap(), 3);
        assert_eq!(input.read_vint().unwrap(), 4);
        assert_eq!(input.read_vint().unwrap(), 20);
        // child: level 0 position after its second entry
        assert_eq!(input.read_vlong().unwrap(), 7);
        // level 0
        assert_eq!(input.read_vint().unwrap(), 1 * 2 + 1);
        assert_eq!(input.read_vint().unwrap(), 3);
        assert_eq!(input.read_vint().unwrap(), 2);
        assert_eq!(input.read_vint().unwrap(), 10);
        assert_eq!(input.read_vint().unwrap(), 2 * 2);
        assert_eq!(input.read_vint().unwrap(), 2);
        assert_eq!(input.read_vint().unwrap(), 10);
        assert!(input.is_empty());
    }
}
