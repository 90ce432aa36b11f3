//! Writer of the term dictionary (`.tis`) and its sparse index (`.tii`).
//!
//! Terms arrive sorted by field name, then text. Every `index_interval`-th term is
//! also added to the index, which starts with an empty sentinel entry. Both files
//! are buffered in memory, since their headers carry the final term count.

use quill_io::{DataOutput, Directory, RamOutput};

use super::field_data::common_prefix;
use crate::term_info::{SENTINEL_FIELD, TERM_INFOS_FORMAT, TERM_INFOS_HEADER_LEN, TermInfo};

/// One of the two outputs: the state needed to delta-encode the next entry.
struct TermsOutput {
    body: RamOutput,
    size: u64,
    last_text: Vec<u16>,
    last_field: u32,
    last_info: TermInfo,
}

impl TermsOutput {
    fn new() -> TermsOutput {
        TermsOutput {
            body: RamOutput::new(),
            size: 0,
            last_text: Vec::new(),
            last_field: SENTINEL_FIELD,
            last_info: TermInfo::default(),
        }
    }

    fn write_entry(
        &mut self,
        field: u32,
        text: &[u16],
        info: &TermInfo,
        skip_interval: u32,
    ) -> std::io::Result<()> {
        debug_assert!(info.freq_pointer >= self.last_info.freq_pointer);
        debug_assert!(info.prox_pointer >= self.last_info.prox_pointer);
        let prefix = common_prefix(&self.last_text, text);
        self.body.write_vint(prefix as u32)?;
        self.body.write_vint((text.len() - prefix) as u32)?;
        self.body.write_chars(&text[prefix..])?;
        self.body.write_vint(field)?;
        self.body.write_vint(info.doc_freq)?;
        self.body
            .write_vlong(info.freq_pointer - self.last_info.freq_pointer)?;
        self.body
            .write_vlong(info.prox_pointer - self.last_info.prox_pointer)?;
        if info.doc_freq >= skip_interval {
            self.body.write_vint(info.skip_offset)?;
        }
        self.last_text.clear();
        self.last_text.extend_from_slice(text);
        self.last_field = field;
        self.last_info = *info;
        self.size += 1;
        Ok(())
    }

    fn write_file(
        &self,
        directory: &dyn Directory,
        name: &str,
        index_interval: u32,
        skip_interval: u32,
        max_skip_levels: u32,
    ) -> std::io::Result<()> {
        let mut out = directory.create_output(name)?;
        out.write_int(TERM_INFOS_FORMAT)?;
        out.write_long(self.size as i64)?;
        out.write_int(index_interval as i32)?;
        out.write_int(skip_interval as i32)?;
        out.write_int(max_skip_levels as i32)?;
        self.body.write_to(out.as_mut())?;
        out.seal()
    }
}

pub(crate) struct TermInfosWriter {
    terms: TermsOutput,
    index: TermsOutput,
    /// Position in `.tis` recorded by the previous index entry.
    last_index_pointer: u64,
    index_interval: u32,
    skip_interval: u32,
    max_skip_levels: u32,
}

impl TermInfosWriter {
    pub fn new(index_interval: u32, skip_interval: u32, max_skip_levels: u32) -> TermInfosWriter {
        TermInfosWriter {
            terms: TermsOutput::new(),
            index: TermsOutput::new(),
            last_index_pointer: 0,
            index_interval,
            skip_interval,
            max_skip_levels,
        }
    }

    /// Adds a term; terms must come in increasing `(field name, text)` order.
    pub fn add(&mut self, field: u32, text: &[u16], info: &TermInfo) -> std::io::Result<()> {
        if self.terms.size % self.index_interval as u64 == 0 {
            self.add_index_entry()?;
        }
        self.terms
            .write_entry(field, text, info, self.skip_interval)
    }

    /// Indexes the last term written (the sentinel before the first term), pointing
    /// at the entry about to be written.
    fn add_index_entry(&mut self) -> std::io::Result<()> {
        let TermsOutput {
            last_field,
            last_text,
            last_info,
            body,
            ..
        } = &self.terms;
        self.index
            .write_entry(*last_field, last_text, last_info, self.skip_interval)?;
        let pointer = TERM_INFOS_HEADER_LEN + body.file_pointer();
        self.index
            .body
            .write_vlong(pointer - self.last_index_pointer)?;
        self.last_index_pointer = pointer;
        Ok(())
    }

    pub fn num_terms(&self) -> u64 {
        self.terms.size
    }

    /// Writes both files.
    pub fn finish(
        &self,
        directory: &dyn Directory,
        tis_name: &str,
        tii_name: &str,
    ) -> std::io::Result<()> {
        self.terms.write_file(
            directory,
            tis_name,
            self.index_interval,
            self.skip_interval,
            self.max_skip_levels,
        )?;
        self.index.write_file(
            directory,
            tii_name,
            self.index_interval,
            self.skip_interval,
            self.max_skip_levels,
        )
    }
}
