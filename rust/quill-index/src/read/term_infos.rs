//! Reading the term dictionary of a segment.

use std::cmp::Ordering;

use quill_common::{Result, try_or_ret_some_err, verify_data};
use quill_io::{Directory, IndexInput};

use crate::{
    field_infos::FieldInfos,
    segment::{TERMS_EXT, TERMS_INDEX_EXT, file_name},
    term_info::{SENTINEL_FIELD, TERM_INFOS_FORMAT, TermInfo},
};

/// Header shared by `.tis` and `.tii`.
#[derive(Debug, Clone, Copy)]
struct Header {
    size: u64,
    index_interval: u32,
    skip_interval: u32,
    max_skip_levels: u32,
}

fn read_header(input: &mut dyn IndexInput) -> Result<Header> {
    let format = input.read_int()?;
    verify_data!(term_infos_format, format == TERM_INFOS_FORMAT);
    let size = input.read_long()?;
    let index_interval = input.read_int()?;
    let skip_interval = input.read_int()?;
    let max_skip_levels = input.read_int()?;
    verify_data!(
        term_infos_header,
        size >= 0 && index_interval > 0 && skip_interval > 1 && max_skip_levels > 0
    );
    Ok(Header {
        size: size as u64,
        index_interval: index_interval as u32,
        skip_interval: skip_interval as u32,
        max_skip_levels: max_skip_levels as u32,
    })
}

/// One term of the dictionary, as decoded by [`TermEnum`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEntry {
    pub field: u32,
    pub text: Vec<u16>,
    pub info: TermInfo,
}

/// Sequential decoder of a `.tis` or `.tii` body.
pub struct TermEnum {
    input: Box<dyn IndexInput>,
    remaining: u64,
    skip_interval: u32,
    /// `.tii` entries are each followed by a `.tis` pointer delta.
    is_index: bool,
    index_pointer: u64,
    current: TermEntry,
}

impl TermEnum {
    fn new(input: Box<dyn IndexInput>, header: &Header, is_index: bool) -> TermEnum {
        TermEnum {
            input,
            remaining: header.size,
            skip_interval: header.skip_interval,
            is_index,
            index_pointer: 0,
            current: TermEntry {
                field: SENTINEL_FIELD,
                text: Vec::new(),
                info: TermInfo::default(),
            },
        }
    }

    /// Positions the enum right after `entry`, located at `pointer` in the file.
    fn seek(&mut self, pointer: u64, entry: &TermEntry, remaining: u64) -> Result<()> {
        self.input.seek(pointer)?;
        self.current.clone_from(entry);
        self.remaining = remaining;
        Ok(())
    }

    /// Decodes the next term; `false` at the end of the dictionary.
    pub fn advance(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        let input = self.input.as_mut();
        let prefix = input.read_vint()? as usize;
        let suffix = input.read_vint()? as usize;
        verify_data!(term_prefix, prefix <= self.current.text.len());
        self.current.text.truncate(prefix);
        input.read_chars(suffix, &mut self.current.text)?;
        self.current.field = input.read_vint()?;
        let info = &mut self.current.info;
        info.doc_freq = input.read_vint()?;
        info.freq_pointer += input.read_vlong()?;
        info.prox_pointer += input.read_vlong()?;
        info.skip_offset = if info.doc_freq >= self.skip_interval {
            input.read_vint()?
        } else {
            0
        };
        if self.is_index {
            self.index_pointer += input.read_vlong()?;
        }
        self.remaining -= 1;
        Ok(true)
    }

    pub fn term(&self) -> &TermEntry {
        &self.current
    }
}

impl Iterator for TermEnum {
    type Item = Result<TermEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if !try_or_ret_some_err!(self.advance()) {
            return None;
        }
        Some(Ok(self.current.clone()))
    }
}

/// The in-memory term index and a handle on the dictionary.
pub struct TermInfosReader {
    tis: Box<dyn IndexInput>,
    header: Header,
    /// Every `index_interval`-th term, led by the sentinel, with its `.tis` pointer.
    index: Vec<(TermEntry, u64)>,
    /// Field names by number, for ordering terms.
    field_names: Vec<String>,
}

impl TermInfosReader {
    pub fn open(
        directory: &dyn Directory,
        segment: &str,
        field_infos: &FieldInfos,
    ) -> Result<TermInfosReader> {
        let mut tis = directory.open_input(&file_name(segment, TERMS_EXT))?;
        let header = read_header(tis.as_mut())?;
        let mut tii = directory.open_input(&file_name(segment, TERMS_INDEX_EXT))?;
        let index_header = read_header(tii.as_mut())?;

        let mut entries = TermEnum::new(tii, &index_header, true);
        let mut index = Vec::with_capacity(index_header.size as usize);
        while entries.advance()? {
            index.push((entries.current.clone(), entries.index_pointer));
        }
        verify_data!(
            term_index_sentinel,
            index.is_empty() || index[0].0.field == SENTINEL_FIELD
        );
        Ok(TermInfosReader {
            tis,
            header,
            index,
            field_names: field_infos.iter().map(|info| info.name.clone()).collect(),
        })
    }

    /// Number of terms in the dictionary.
    pub fn size(&self) -> u64 {
        self.header.size
    }

    pub fn skip_interval(&self) -> u32 {
        self.header.skip_interval
    }

    pub fn max_skip_levels(&self) -> u32 {
        self.header.max_skip_levels
    }

    /// Enumerates every term in order.
    pub fn terms(&self) -> Result<TermEnum> {
        let mut terms = TermEnum::new(self.tis.clone_input(), &self.header, false);
        let Some((sentinel, pointer)) = self.index.first() else {
            return Ok(terms);
        };
        terms.seek(*pointer, sentinel, self.header.size)?;
        Ok(terms)
    }

    /// Looks up the entry of `(field number, text)`.
    pub fn get(&self, field: u32, text: &[u16]) -> Result<Option<TermInfo>> {
        let target = (field, text);
        let found = self
            .index
            .partition_point(|(entry, _)| self.compare(entry.field, &entry.text, target).is_le());
        let Some(slot) = found.checked_sub(1) else {
            return Ok(None);
        };
        let (entry, pointer) = &self.index[slot];
        if entry.field != SENTINEL_FIELD
            && self.compare(entry.field, &entry.text, target) == Ordering::Equal
        {
            return Ok(Some(entry.info));
        }

        let first = slot as u64 * self.header.index_interval as u64;
        let mut terms = TermEnum::new(self.tis.clone_input(), &self.header, false);
        terms.seek(*pointer, entry, self.header.size - first)?;
        for _ in 0..self.header.index_interval {
            if !terms.advance()? {
                break;
            }
            let term = terms.term();
            match self.compare(term.field, &term.text, target) {
                Ordering::Less => continue,
                Ordering::Equal => return Ok(Some(term.info)),
                Ordering::Greater => break,
            }
        }
        Ok(None)
    }

    /// Orders terms by field name, then text; the sentinel sorts first.
    fn compare(&self, field: u32, text: &[u16], (other_field, other_text): (u32, &[u16])) -> Ordering {
        let name = |field: u32| {
            (field != SENTINEL_FIELD).then(|| {
                self.field_names
                    .get(field as usize)
                    .map_or("", String::as_str)
            })
        };
        name(field)
            .cmp(&name(other_field))
            .then_with(|| text.cmp(other_text))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quill_io::RamDirectory;

    use super::*;
    use crate::{
        config::IndexWriterConfig,
        document::{Document, Field},
        write::DocumentsWriter,
    };

    fn units(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    /// Flushes one document per `(field, value)` pair into segment `_0`.
    fn build(fields: &[(&str, String)]) -> (Arc<RamDirectory>, FieldInfos) {
        let dir = Arc::new(RamDirectory::new());
        let config = IndexWriterConfig::new()
            .with_tokenizer("trivial")
            .with_term_index_interval(4);
        let dw = DocumentsWriter::new(dir.clone(), config, 0).unwrap();
        for (name, value) in fields {
            dw.add_document(Document::new().with_field(Field::keyword(*name, value.as_str())))
                .unwrap();
        }
        dw.flush().unwrap();
        let mut fnm = dir.open_input("_0.fnm").unwrap();
        let infos = FieldInfos::read(fnm.as_mut()).unwrap();
        (dir, infos)
    }

    #[test]
    fn test_terms_in_field_name_order() {
        let mut fields = Vec::new();
        for i in 0..20 {
            fields.push(("title", format!("t{i:02}")));
            fields.push(("body", format!("b{i:02}")));
        }
        let (dir, infos) = build(&fields);
        assert_eq!(infos.number("title"), Some(0));
        let reader = TermInfosReader::open(dir.as_ref(), "_0", &infos).unwrap();
        assert_eq!(reader.size(), 40);

        let seen: Vec<(u32, String)> = reader
            .terms()
            .unwrap()
            .map(|term| {
                let term = term.unwrap();
                (term.field, String::from_utf16(&term.text).unwrap())
            })
            .collect();
        assert_eq!(seen.len(), 40);
        assert_eq!(seen[0], (1, "b00".to_string()));
        assert_eq!(seen[19], (1, "b19".to_string()));
        assert_eq!(seen[20], (0, "t00".to_string()));

        for i in 0..20 {
            let info = reader.get(0, &units(&format!("t{i:02}"))).unwrap().unwrap();
            assert_eq!(info.doc_freq, 1);
            assert!(reader.get(1, &units(&format!("b{i:02}"))).unwrap().is_some());
        }
        assert!(reader.get(0, &units("t20")).unwrap().is_none());
        assert!(reader.get(1, &units("a")).unwrap().is_none());
        assert!(reader.get(0, &units("a")).unwrap().is_none());
    }

    #[test]
    fn test_lookup_finds_indexed_terms() {
        let fields: Vec<_> = (0..9).map(|i| ("id", format!("{i}"))).collect();
        let (dir, infos) = build(&fields);
        let reader = TermInfosReader::open(dir.as_ref(), "_0", &infos).unwrap();
        // with an index interval of 4, terms 3 and 7 are index entries
        for i in 0..9 {
            let info = reader.get(0, &units(&format!("{i}"))).unwrap().unwrap();
            assert_eq!(info.doc_freq, 1);
        }
    }

    #[test]
    fn test_empty_dictionary() {
        let fields = [("raw", "x".to_string())];
        let dir = Arc::new(RamDirectory::new());
        let dw = DocumentsWriter::new(dir.clone(), IndexWriterConfig::new(), 0).unwrap();
        for (name, value) in &fields {
            dw.add_document(Document::new().with_field(Field::stored(*name, value.as_str())))
                .unwrap();
        }
        dw.flush().unwrap();
        let mut fnm = dir.open_input("_0.fnm").unwrap();
        let infos = FieldInfos::read(fnm.as_mut()).unwrap();

        let reader = TermInfosReader::open(dir.as_ref(), "_0", &infos).unwrap();
        assert_eq!(reader.size(), 0);
        assert!(reader.terms().unwrap().next().is_none());
        assert!(reader.get(0, &units("x")).unwrap().is_none());
    }
}
