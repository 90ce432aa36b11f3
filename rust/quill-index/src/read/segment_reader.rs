//! Read access to one flushed segment.

use std::sync::Arc;

use quill_common::{Result, error::Error, verify_arg, verify_data};
use quill_io::{Directory, IndexInput};

use super::{
    postings::{Postings, SkipParams},
    term_infos::{TermEnum, TermInfosReader},
};
use crate::{
    field_infos::FieldInfos,
    segment::{
        BitVector, DELETES_EXT, FIELD_INFOS_EXT, FIELDS_EXT, FIELDS_INDEX_EXT, FREQ_EXT,
        NORMS_EXT, PROX_EXT, SegmentInfo, VECTORS_DOCUMENTS_EXT, VECTORS_FIELDS_EXT,
        VECTORS_INDEX_EXT, file_name,
    },
    term_info::TermInfo,
    write::{FIELD_IS_TOKENIZED, NORMS_HEADER, TERM_VECTORS_FORMAT},
};

const VECTOR_POSITIONS: u8 = 0x1;
const VECTOR_OFFSETS: u8 = 0x2;

/// A stored field value of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredField {
    pub name: String,
    pub tokenized: bool,
    pub value: String,
}

/// One term of a document's term vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermVectorEntry {
    pub text: String,
    pub freq: u32,
    /// Empty unless the field records positions.
    pub positions: Vec<u32>,
    /// `(start, end)` character offsets; empty unless the field records offsets.
    pub offsets: Vec<(u32, u32)>,
}

/// The terms of one field of one document, sorted by text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermVector {
    pub field: String,
    pub terms: Vec<TermVectorEntry>,
}

struct VectorFiles {
    tvx: Box<dyn IndexInput>,
    tvd: Box<dyn IndexInput>,
    tvf: Box<dyn IndexInput>,
}

/// Reader over the files of one segment.
///
/// Inputs are cloned per call, so every method takes `&self`.
pub struct SegmentReader {
    info: SegmentInfo,
    field_infos: FieldInfos,
    terms: TermInfosReader,
    freq: Box<dyn IndexInput>,
    prox: Box<dyn IndexInput>,
    /// Norm bytes by field number.
    norms: Vec<Option<Vec<u8>>>,
    fdx: Box<dyn IndexInput>,
    fdt: Box<dyn IndexInput>,
    vectors: Option<VectorFiles>,
    deleted: Option<Arc<BitVector>>,
}

fn open(directory: &dyn Directory, segment: &str, ext: &str) -> Result<Box<dyn IndexInput>> {
    let name = file_name(segment, ext);
    directory.open_input(&name).map_err(|e| Error::io(name, e))
}

impl SegmentReader {
    pub fn open(directory: &dyn Directory, info: &SegmentInfo) -> Result<SegmentReader> {
        let segment = info.name.as_str();
        let field_infos = FieldInfos::read(open(directory, segment, FIELD_INFOS_EXT)?.as_mut())?;
        let terms = TermInfosReader::open(directory, segment, &field_infos)?;
        let freq = open(directory, segment, FREQ_EXT)?;
        let prox = open(directory, segment, PROX_EXT)?;
        let norms = read_norms(directory, segment, &field_infos, info.doc_count)?;
        let fdx = open(directory, segment, FIELDS_INDEX_EXT)?;
        let fdt = open(directory, segment, FIELDS_EXT)?;
        verify_data!(fdx_length, fdx.length() == info.doc_count as u64 * 8);

        let vectors = if info.has_vectors {
            let mut tvx = open(directory, segment, VECTORS_INDEX_EXT)?;
            let mut tvd = open(directory, segment, VECTORS_DOCUMENTS_EXT)?;
            let mut tvf = open(directory, segment, VECTORS_FIELDS_EXT)?;
            for input in [&mut tvx, &mut tvd, &mut tvf] {
                verify_data!(term_vectors_format, input.read_int()? == TERM_VECTORS_FORMAT);
            }
            Some(VectorFiles { tvx, tvd, tvf })
        } else {
            None
        };

        let deleted = if info.has_deletions() {
            let mut input = open(directory, segment, DELETES_EXT)?;
            let bits = BitVector::read(input.as_mut())?;
            verify_data!(del_size, bits.size() == info.doc_count);
            Some(Arc::new(bits))
        } else {
            None
        };

        Ok(SegmentReader {
            info: info.clone(),
            field_infos,
            terms,
            freq,
            prox,
            norms,
            fdx,
            fdt,
            vectors,
            deleted,
        })
    }

    pub fn info(&self) -> &SegmentInfo {
        &self.info
    }

    pub fn field_infos(&self) -> &FieldInfos {
        &self.field_infos
    }

    /// Number of documents, deleted ones included.
    pub fn max_doc(&self) -> u32 {
        self.info.doc_count
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> u32 {
        self.info.doc_count - self.deleted.as_ref().map_or(0, |bits| bits.count())
    }

    pub fn is_deleted(&self, doc: u32) -> bool {
        self.deleted.as_ref().is_some_and(|bits| bits.get(doc))
    }

    pub fn deleted_docs(&self) -> Option<&BitVector> {
        self.deleted.as_deref()
    }

    /// Number of terms in the segment.
    pub fn num_terms(&self) -> u64 {
        self.terms.size()
    }

    /// All terms in order of field name, then text.
    pub fn terms(&self) -> Result<TermEnum> {
        self.terms.terms()
    }

    pub fn term_info(&self, field: &str, text: &str) -> Result<Option<TermInfo>> {
        let Some(number) = self.field_infos.number(field) else {
            return Ok(None);
        };
        let text: Vec<u16> = text.encode_utf16().collect();
        self.terms.get(number, &text)
    }

    /// Number of documents containing the term, deleted ones included.
    pub fn doc_freq(&self, field: &str, text: &str) -> Result<u32> {
        Ok(self
            .term_info(field, text)?
            .map_or(0, |info| info.doc_freq))
    }

    /// Documents and positions of a term; `None` if the segment lacks it.
    pub fn postings(&self, field: &str, text: &str) -> Result<Option<Postings>> {
        let Some(info) = self.term_info(field, text)? else {
            return Ok(None);
        };
        let store_payloads = self
            .field_infos
            .by_name(field)
            .is_some_and(|field| field.store_payloads);
        let postings = Postings::new(
            self.freq.clone_input(),
            self.prox.clone_input(),
            self.deleted.clone(),
            info,
            store_payloads,
            SkipParams {
                interval: self.terms.skip_interval(),
                max_levels: self.terms.max_skip_levels(),
            },
        )?;
        Ok(Some(postings))
    }

    /// Norm bytes of `field`, one per document; `None` for fields without norms.
    pub fn norms(&self, field: &str) -> Option<&[u8]> {
        let number = self.field_infos.number(field)?;
        self.norms.get(number as usize)?.as_deref()
    }

    /// Stored fields of `doc`, in the order they were added.
    pub fn document(&self, doc: u32) -> Result<Vec<StoredField>> {
        verify_arg!(doc, doc < self.info.doc_count);
        let mut fdx = self.fdx.clone_input();
        fdx.seek(doc as u64 * 8)?;
        let pointer = fdx.read_long()?;
        verify_data!(fdx_pointer, pointer >= 0);
        let mut fdt = self.fdt.clone_input();
        fdt.seek(pointer as u64)?;

        let count = fdt.read_vint()?;
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let number = fdt.read_vint()?;
            let bits = fdt.read_byte()?;
            let value = fdt.read_string()?;
            let info = self.field_infos.get(number);
            verify_data!(stored_field_number, info.is_some());
            fields.push(StoredField {
                name: info.map(|info| info.name.clone()).unwrap_or_default(),
                tokenized: bits & FIELD_IS_TOKENIZED != 0,
                value,
            });
        }
        Ok(fields)
    }

    /// Term vectors of every field of `doc` that recorded them.
    pub fn term_vectors(&self, doc: u32) -> Result<Vec<TermVector>> {
        verify_arg!(doc, doc < self.info.doc_count);
        let Some(files) = &self.vectors else {
            return Ok(Vec::new());
        };
        let mut tvx = files.tvx.clone_input();
        tvx.seek(4 + doc as u64 * 8)?;
        let pointer = tvx.read_long()?;
        verify_data!(tvx_pointer, pointer >= 0);
        let mut tvd = files.tvd.clone_input();
        tvd.seek(pointer as u64)?;

        let count = tvd.read_vint()?;
        let mut numbers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            numbers.push(tvd.read_vint()?);
        }
        let mut pointers = Vec::with_capacity(count as usize);
        let mut tvf_pointer = 0;
        for i in 0..count {
            let delta = tvd.read_vlong()?;
            tvf_pointer = if i == 0 { delta } else { tvf_pointer + delta };
            pointers.push(tvf_pointer);
        }

        let mut tvf = files.tvf.clone_input();
        numbers
            .into_iter()
            .zip(pointers)
            .map(|(number, pointer)| {
                let field = self.field_infos.get(number).map(|info| info.name.clone());
                verify_data!(term_vector_field, field.is_some());
                tvf.seek(pointer)?;
                read_term_vector(tvf.as_mut(), field.unwrap_or_default())
            })
            .collect()
    }

    /// Term vector of one field of `doc`; `None` if it recorded none.
    pub fn term_vector(&self, doc: u32, field: &str) -> Result<Option<TermVector>> {
        Ok(self
            .term_vectors(doc)?
            .into_iter()
            .find(|vector| vector.field == field))
    }
}

fn read_norms(
    directory: &dyn Directory,
    segment: &str,
    field_infos: &FieldInfos,
    doc_count: u32,
) -> Result<Vec<Option<Vec<u8>>>> {
    let mut norms = vec![None; field_infos.len()];
    if !field_infos.has_norms() {
        return Ok(norms);
    }
    let mut input = open(directory, segment, NORMS_EXT)?;
    let mut header = [0u8; 4];
    input.read_bytes(&mut header)?;
    verify_data!(norms_header, header == NORMS_HEADER);
    for info in field_infos.iter().filter(|info| info.has_norms()) {
        let mut bytes = vec![0u8; doc_count as usize];
        input.read_bytes(&mut bytes)?;
        norms[info.number as usize] = Some(bytes);
    }
    Ok(norms)
}

fn read_term_vector(tvf: &mut dyn IndexInput, field: String) -> Result<TermVector> {
    let num_terms = tvf.read_vint()?;
    let bits = tvf.read_byte()?;
    let with_positions = bits & VECTOR_POSITIONS != 0;
    let with_offsets = bits & VECTOR_OFFSETS != 0;

    let mut terms = Vec::with_capacity(num_terms as usize);
    let mut text: Vec<u16> = Vec::new();
    for _ in 0..num_terms {
        let prefix = tvf.read_vint()? as usize;
        let suffix = tvf.read_vint()? as usize;
        verify_data!(term_vector_prefix, prefix <= text.len());
        text.truncate(prefix);
        tvf.read_chars(suffix, &mut text)?;
        let freq = tvf.read_vint()?;

        let mut positions = Vec::new();
        if with_positions {
            let mut position = 0u32;
            for _ in 0..freq {
                position = position.wrapping_add(tvf.read_vint()?);
                positions.push(position);
            }
        }
        let mut offsets = Vec::new();
        if with_offsets {
            let mut last_end = 0u32;
            for _ in 0..freq {
                let start = last_end.wrapping_add(tvf.read_vint()?);
                let end = start.wrapping_add(tvf.read_vint()?);
                offsets.push((start, end));
                last_end = end;
            }
        }
        terms.push(TermVectorEntry {
            text: String::from_utf16_lossy(&text),
            freq,
            positions,
            offsets,
        });
    }
    Ok(TermVector { field, terms })
}
