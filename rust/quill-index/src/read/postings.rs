//! Iteration over the documents and positions of one term.

use std::sync::Arc;

use quill_common::{Result, try_or_ret_some_err};
use quill_io::IndexInput;

use super::skip::SkipListReader;
use crate::{segment::BitVector, term_info::TermInfo};

/// Skip parameters of the term dictionary the postings come from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SkipParams {
    pub interval: u32,
    pub max_levels: u32,
}

/// Documents of one term in increasing id order, with their term frequencies and
/// positions. Deleted documents are skipped.
///
/// Positions of a document are read lazily: documents passed over without
/// reading their positions only cost a seek later.
pub struct Postings {
    freq: Box<dyn IndexInput>,
    prox: Box<dyn IndexInput>,
    deleted: Option<Arc<BitVector>>,
    info: TermInfo,
    store_payloads: bool,
    skip_params: SkipParams,
    skip: Option<SkipListReader>,
    have_skipped: bool,

    count: u32,
    doc: u32,
    freq_value: u32,

    prox_count: u32,
    position: u32,
    lazy_skip_pointer: Option<u64>,
    lazy_skip_count: u64,
    payload_length: u32,
    need_to_load_payload: bool,
    payload: Vec<u8>,
}

impl Postings {
    pub(crate) fn new(
        mut freq: Box<dyn IndexInput>,
        prox: Box<dyn IndexInput>,
        deleted: Option<Arc<BitVector>>,
        info: TermInfo,
        store_payloads: bool,
        skip_params: SkipParams,
    ) -> Result<Postings> {
        freq.seek(info.freq_pointer)?;
        Ok(Postings {
            freq,
            prox,
            deleted,
            info,
            store_payloads,
            skip_params,
            skip: None,
            have_skipped: false,
            count: 0,
            doc: 0,
            freq_value: 0,
            prox_count: 0,
            position: 0,
            lazy_skip_pointer: Some(info.prox_pointer),
            lazy_skip_count: 0,
            payload_length: 0,
            need_to_load_payload: false,
            payload: Vec::new(),
        })
    }

    /// Number of documents containing the term, deleted ones included.
    pub fn doc_freq(&self) -> u32 {
        self.info.doc_freq
    }

    /// Current document; meaningful after `next_doc` or `skip_to` returned `true`.
    pub fn doc(&self) -> u32 {
        self.doc
    }

    /// Occurrences of the term in the current document.
    pub fn freq(&self) -> u32 {
        self.freq_value
    }

    /// Moves to the next live document; `false` at the end.
    pub fn next_doc(&mut self) -> Result<bool> {
        self.lazy_skip_count += self.prox_count as u64;
        self.prox_count = 0;
        loop {
            if self.count == self.info.doc_freq {
                return Ok(false);
            }
            let code = self.freq.read_vint()?;
            self.doc += code >> 1;
            self.freq_value = if code & 1 != 0 {
                1
            } else {
                self.freq.read_vint()?
            };
            self.count += 1;
            if !self.is_deleted(self.doc) {
                break;
            }
            self.lazy_skip_count += self.freq_value as u64;
        }
        self.prox_count = self.freq_value;
        self.position = 0;
        Ok(true)
    }

    /// Moves to the first live document whose id is at least `target`; `false`
    /// if there is none.
    pub fn skip_to(&mut self, target: u32) -> Result<bool> {
        if self.info.doc_freq >= self.skip_params.interval {
            let info = self.info;
            let store_payloads = self.store_payloads;
            let params = self.skip_params;
            let freq = &self.freq;
            let skip = self.skip.get_or_insert_with(|| {
                SkipListReader::new(freq.clone_input(), params.interval, params.max_levels)
            });
            if !self.have_skipped {
                skip.init(
                    info.freq_pointer + info.skip_offset as u64,
                    info.freq_pointer,
                    info.prox_pointer,
                    info.doc_freq,
                    store_payloads,
                );
                self.have_skipped = true;
            }
            if let Some(count) = skip.skip_to(target)?.filter(|&count| count > self.count) {
                self.freq.seek(skip.freq_pointer())?;
                self.lazy_skip_pointer = Some(skip.prox_pointer());
                self.lazy_skip_count = 0;
                self.prox_count = 0;
                self.payload_length = skip.payload_length();
                self.need_to_load_payload = false;
                self.doc = skip.doc();
                self.count = count;
            }
        }
        loop {
            if !self.next_doc()? {
                return Ok(false);
            }
            if target <= self.doc {
                return Ok(true);
            }
        }
    }

    /// Returns the next position of the term in the current document. Must be
    /// called at most `freq()` times per document.
    pub fn next_position(&mut self) -> Result<u32> {
        self.lazy_skip()?;
        self.prox_count -= 1;
        self.position += self.read_delta_position()?;
        Ok(self.position)
    }

    /// Reads the positions of the current document not read yet.
    pub fn positions(&mut self) -> Result<Vec<u32>> {
        let mut positions = Vec::with_capacity(self.prox_count as usize);
        while self.prox_count > 0 {
            positions.push(self.next_position()?);
        }
        Ok(positions)
    }

    /// Length of the payload at the current position.
    pub fn payload_length(&self) -> u32 {
        self.payload_length
    }

    /// Whether the payload at the current position can still be read.
    pub fn is_payload_available(&self) -> bool {
        self.need_to_load_payload && self.payload_length > 0
    }

    /// Reads the payload at the current position. Returns `None` if the position
    /// has none or it was already read.
    pub fn payload(&mut self) -> Result<Option<&[u8]>> {
        if !self.is_payload_available() {
            return Ok(None);
        }
        self.payload.resize(self.payload_length as usize, 0);
        self.prox.read_bytes(&mut self.payload)?;
        self.need_to_load_payload = false;
        Ok(Some(self.payload.as_slice()))
    }

    fn is_deleted(&self, doc: u32) -> bool {
        self.deleted.as_ref().is_some_and(|deleted| deleted.get(doc))
    }

    fn read_delta_position(&mut self) -> Result<u32> {
        let mut delta = self.prox.read_vint()?;
        if self.store_payloads {
            if delta & 1 != 0 {
                self.payload_length = self.prox.read_vint()?;
            }
            delta >>= 1;
            self.need_to_load_payload = true;
        }
        Ok(delta)
    }

    fn skip_payload(&mut self) -> Result<()> {
        if self.need_to_load_payload && self.payload_length > 0 {
            let pointer = self.prox.file_pointer() + self.payload_length as u64;
            self.prox.seek(pointer)?;
        }
        self.need_to_load_payload = false;
        Ok(())
    }

    /// Catches the prox stream up with the freq stream.
    fn lazy_skip(&mut self) -> Result<()> {
        self.skip_payload()?;
        if let Some(pointer) = self.lazy_skip_pointer.take() {
            self.prox.seek(pointer)?;
        }
        while self.lazy_skip_count > 0 {
            self.read_delta_position()?;
            self.skip_payload()?;
            self.lazy_skip_count -= 1;
        }
        Ok(())
    }
}

impl Iterator for Postings {
    type Item = Result<(u32, u32)>;

    fn next(&mut self) -> Option<Self::Item> {
        if !try_or_ret_some_err!(self.next_doc()) {
            return None;
        }
        Some(Ok((self.doc, self.freq_value)))
    }
}
