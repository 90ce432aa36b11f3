//! Per-field metadata shared by every segment of one writer.
//!
//! Field numbers are assigned in order of first sight and never change. The flags
//! of a field only ever widen, with the exception of `omit_norms`: once a document
//! indexed the field with norms, norms stay on.

use ahash::AHashMap;
use quill_common::{Result, verify_data};
use quill_io::{DataInput, DataOutput};

const IS_INDEXED: u8 = 0x1;
const STORE_TERM_VECTOR: u8 = 0x2;
const STORE_POSITIONS_WITH_TERM_VECTOR: u8 = 0x4;
const STORE_OFFSETS_WITH_TERM_VECTOR: u8 = 0x8;
const OMIT_NORMS: u8 = 0x10;
const STORE_PAYLOADS: u8 = 0x20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub is_indexed: bool,
    pub store_term_vector: bool,
    pub store_position_with_term_vector: bool,
    pub store_offset_with_term_vector: bool,
    pub omit_norms: bool,
    pub store_payloads: bool,
}

impl FieldInfo {
    /// Whether the segment carries one norm byte per document for this field.
    pub fn has_norms(&self) -> bool {
        self.is_indexed && !self.omit_norms
    }

    fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.is_indexed {
            bits |= IS_INDEXED;
        }
        if self.store_term_vector {
            bits |= STORE_TERM_VECTOR;
        }
        if self.store_position_with_term_vector {
            bits |= STORE_POSITIONS_WITH_TERM_VECTOR;
        }
        if self.store_offset_with_term_vector {
            bits |= STORE_OFFSETS_WITH_TERM_VECTOR;
        }
        if self.omit_norms {
            bits |= OMIT_NORMS;
        }
        if self.store_payloads {
            bits |= STORE_PAYLOADS;
        }
        bits
    }

    fn from_bits(name: String, number: u32, bits: u8) -> FieldInfo {
        FieldInfo {
            name,
            number,
            is_indexed: bits & IS_INDEXED != 0,
            store_term_vector: bits & STORE_TERM_VECTOR != 0,
            store_position_with_term_vector: bits & STORE_POSITIONS_WITH_TERM_VECTOR != 0,
            store_offset_with_term_vector: bits & STORE_OFFSETS_WITH_TERM_VECTOR != 0,
            omit_norms: bits & OMIT_NORMS != 0,
            store_payloads: bits & STORE_PAYLOADS != 0,
        }
    }
}

/// Flags a document requests for one field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldFlags {
    pub indexed: bool,
    pub term_vector: bool,
    pub vector_positions: bool,
    pub vector_offsets: bool,
    pub omit_norms: bool,
    pub payloads: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    by_number: Vec<FieldInfo>,
    by_name: AHashMap<String, u32>,
}

impl FieldInfos {
    pub fn new() -> FieldInfos {
        FieldInfos::default()
    }

    /// Registers `name` or merges `flags` into its existing entry; returns the field
    /// number.
    pub fn add(&mut self, name: &str, flags: FieldFlags) -> u32 {
        match self.by_name.get(name) {
            Some(&number) => {
                let info = &mut self.by_number[number as usize];
                info.is_indexed |= flags.indexed;
                info.store_term_vector |= flags.term_vector;
                info.store_position_with_term_vector |= flags.vector_positions;
                info.store_offset_with_term_vector |= flags.vector_offsets;
                info.omit_norms &= flags.omit_norms;
                info.store_payloads |= flags.payloads;
                number
            }
            None => {
                let number = self.by_number.len() as u32;
                self.by_number.push(FieldInfo {
                    name: name.to_string(),
                    number,
                    is_indexed: flags.indexed,
                    store_term_vector: flags.term_vector,
                    store_position_with_term_vector: flags.vector_positions,
                    store_offset_with_term_vector: flags.vector_offsets,
                    omit_norms: flags.omit_norms,
                    store_payloads: flags.payloads,
                });
                self.by_name.insert(name.to_string(), number);
                number
            }
        }
    }

    pub fn set_store_payloads(&mut self, number: u32) {
        if let Some(info) = self.by_number.get_mut(number as usize) {
            info.store_payloads = true;
        }
    }

    pub fn number(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, number: u32) -> Option<&FieldInfo> {
        self.by_number.get(number as usize)
    }

    pub fn by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.number(name).and_then(|number| self.get(number))
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.by_number.iter()
    }

    pub fn has_vectors(&self) -> bool {
        self.by_number.iter().any(|info| info.store_term_vector)
    }

    pub fn has_norms(&self) -> bool {
        self.by_number.iter().any(FieldInfo::has_norms)
    }

    pub fn write<W: DataOutput + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_vint(self.by_number.len() as u32)?;
        for info in &self.by_number {
            out.write_string(&info.name)?;
            out.write_byte(info.bits())?;
        }
        Ok(())
    }

    pub fn read<R: DataInput + ?Sized>(input: &mut R) -> Result<FieldInfos> {
        let count = input.read_vint()?;
        let mut infos = FieldInfos::new();
        for number in 0..count {
            let name = input.read_string()?;
            let bits = input.read_byte()?;
            verify_data!(fnm, !infos.by_name.contains_key(&name));
            infos.by_name.insert(name.clone(), number);
            infos.by_number.push(FieldInfo::from_bits(name, number, bits));
        }
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed() -> FieldFlags {
        FieldFlags {
            indexed: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_numbers_in_first_sight_order() {
        let mut infos = FieldInfos::new();
        assert_eq!(infos.add("title", indexed()), 0);
        assert_eq!(infos.add("body", indexed()), 1);
        assert_eq!(infos.add("title", FieldFlags::default()), 0);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos.number("body"), Some(1));
        assert_eq!(infos.get(0).unwrap().name, "title");
    }

    #[test]
    fn test_flags_merge() {
        let mut infos = FieldInfos::new();
        infos.add(
            "body",
            FieldFlags {
                omit_norms: true,
                ..indexed()
            },
        );
        assert!(!infos.by_name("body").unwrap().has_norms());

        infos.add(
            "body",
            FieldFlags {
                term_vector: true,
                vector_offsets: true,
                ..indexed()
            },
        );
        let body = infos.by_name("body").unwrap();
        assert!(body.store_term_vector && body.store_offset_with_term_vector);
        assert!(!body.omit_norms);
        assert!(infos.has_vectors());

        infos.set_store_payloads(0);
        assert!(infos.get(0).unwrap().store_payloads);
    }

    #[test]
    fn test_fnm_layout() {
        let mut infos = FieldInfos::new();
        infos.add("id", indexed());
        infos.add(
            "raw",
            FieldFlags {
                omit_norms: true,
                ..Default::default()
            },
        );
        let mut out = Vec::new();
        infos.write(&mut out).unwrap();
        assert_eq!(out, b"\x02\x02id\x01\x03raw\x10");

        let read = FieldInfos::read(&mut out.as_slice()).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read.get(1), infos.get(1));
    }
}
