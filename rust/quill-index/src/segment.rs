//! Segment naming, the persisted list of flushed segments, and deletion bit vectors.

use quill_common::{Result, error::Error, verify_data};
use quill_io::{DataOutput, Directory, IndexInput};
use serde::{Deserialize, Serialize};

pub const FIELD_INFOS_EXT: &str = "fnm";
pub const TERMS_EXT: &str = "tis";
pub const TERMS_INDEX_EXT: &str = "tii";
pub const FREQ_EXT: &str = "frq";
pub const PROX_EXT: &str = "prx";
pub const NORMS_EXT: &str = "nrm";
pub const FIELDS_EXT: &str = "fdt";
pub const FIELDS_INDEX_EXT: &str = "fdx";
pub const VECTORS_INDEX_EXT: &str = "tvx";
pub const VECTORS_DOCUMENTS_EXT: &str = "tvd";
pub const VECTORS_FIELDS_EXT: &str = "tvf";
pub const DELETES_EXT: &str = "del";

/// Name of the file listing the flushed segments of an index.
pub const SEGMENTS_FILE: &str = "segments.json";

pub fn file_name(segment: &str, ext: &str) -> String {
    format!("{segment}.{ext}")
}

/// `_` followed by the counter in base 36.
pub fn segment_name(counter: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut digits = Vec::new();
    let mut n = counter;
    loop {
        digits.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    digits.push(b'_');
    digits.iter().rev().map(|&b| b as char).collect()
}

/// One flushed segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub name: String,
    pub doc_count: u32,
    #[serde(default)]
    pub del_count: u32,
    #[serde(default)]
    pub has_vectors: bool,
}

impl SegmentInfo {
    pub fn num_docs(&self) -> u32 {
        self.doc_count - self.del_count
    }

    pub fn has_deletions(&self) -> bool {
        self.del_count > 0
    }
}

/// The segments of an index, in flush order, and the counter naming the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfos {
    pub counter: u64,
    pub segments: Vec<SegmentInfo>,
}

impl SegmentInfos {
    /// Reads [`SEGMENTS_FILE`]; a directory without one holds an empty index.
    pub fn load(directory: &dyn Directory) -> Result<SegmentInfos> {
        if !directory.file_exists(SEGMENTS_FILE) {
            return Ok(SegmentInfos::default());
        }
        let mut input = directory
            .open_input(SEGMENTS_FILE)
            .map_err(|e| Error::io(SEGMENTS_FILE, e))?;
        let mut bytes = vec![0u8; input.length() as usize];
        input
            .read_bytes(&mut bytes)
            .map_err(|e| Error::io(SEGMENTS_FILE, e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::invalid_format(SEGMENTS_FILE, e.to_string()))
    }

    pub fn save(&self, directory: &dyn Directory) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::invalid_format(SEGMENTS_FILE, e.to_string()))?;
        let mut out = directory
            .create_output(SEGMENTS_FILE)
            .map_err(|e| Error::io(SEGMENTS_FILE, e))?;
        out.write_bytes(&json)
            .and_then(|_| out.seal())
            .map_err(|e| Error::io(SEGMENTS_FILE, e))
    }

    pub fn total_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.doc_count as u64).sum()
    }

    pub fn live_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.num_docs() as u64).sum()
    }
}

/// Fixed-size set of document ids, persisted as the `.del` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitVector {
    bits: Vec<u8>,
    size: u32,
    count: u32,
}

impl BitVector {
    pub fn new(size: u32) -> BitVector {
        BitVector {
            bits: vec![0; (size as usize >> 3) + 1],
            size,
            count: 0,
        }
    }

    /// Sets bit `index`; returns `true` if it was clear.
    pub fn set(&mut self, index: u32) -> bool {
        debug_assert!(index < self.size);
        let byte = &mut self.bits[index as usize >> 3];
        let mask = 1u8 << (index & 7);
        if *byte & mask != 0 {
            return false;
        }
        *byte |= mask;
        self.count += 1;
        true
    }

    pub fn get(&self, index: u32) -> bool {
        index < self.size && self.bits[index as usize >> 3] & (1 << (index & 7)) != 0
    }

    /// Number of set bits.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn write<W: DataOutput + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_int(self.size as i32)?;
        out.write_int(self.count as i32)?;
        out.write_bytes(&self.bits)
    }

    pub fn read(input: &mut dyn IndexInput) -> Result<BitVector> {
        let size = input.read_int()?;
        let count = input.read_int()?;
        verify_data!(del_size, size >= 0);
        verify_data!(del_count, count >= 0 && count <= size);
        let mut bits = vec![0u8; (size as usize >> 3) + 1];
        input.read_bytes(&mut bits)?;
        let vector = BitVector {
            bits,
            size: size as u32,
            count: count as u32,
        };
        let actual: u32 = vector.bits.iter().map(|b| b.count_ones()).sum();
        verify_data!(del_count, actual == vector.count);
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use quill_io::RamDirectory;

    use super::*;

    #[test]
    fn test_segment_names() {
        assert_eq!(segment_name(0), "_0");
        assert_eq!(segment_name(35), "_z");
        assert_eq!(segment_name(36), "_10");
        assert_eq!(file_name("_a", TERMS_EXT), "_a.tis");
    }

    #[test]
    fn test_segment_infos_persist() {
        let dir = RamDirectory::new();
        assert_eq!(SegmentInfos::load(&dir).unwrap(), SegmentInfos::default());
        let infos = SegmentInfos {
            counter: 2,
            segments: vec![
                SegmentInfo {
                    name: "_0".into(),
                    doc_count: 10,
                    del_count: 3,
                    has_vectors: false,
                },
                SegmentInfo {
                    name: "_1".into(),
                    doc_count: 4,
                    del_count: 0,
                    has_vectors: true,
                },
            ],
        };
        infos.save(&dir).unwrap();
        let loaded = SegmentInfos::load(&dir).unwrap();
        assert_eq!(loaded, infos);
        assert_eq!(loaded.total_docs(), 14);
        assert_eq!(loaded.live_docs(), 11);
    }

    #[test]
    fn test_bit_vector_file() {
        let mut bits = BitVector::new(10);
        assert!(bits.set(3));
        assert!(!bits.set(3));
        assert!(bits.set(9));
        assert!(bits.get(9) && !bits.get(4) && !bits.get(100));

        let dir = RamDirectory::new();
        let mut out = dir.create_output("_0.del").unwrap();
        bits.write(out.as_mut()).unwrap();
        out.seal().unwrap();
        assert_eq!(dir.file_length("_0.del").unwrap(), 4 + 4 + 2);

        let mut input = dir.open_input("_0.del").unwrap();
        let read = BitVector::read(input.as_mut()).unwrap();
        assert_eq!(read, bits);
        assert_eq!(read.count(), 2);
    }
}
