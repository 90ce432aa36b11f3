//! Flushing buffered documents into a new segment.
//!
//! Every field's postings are spread over the contexts that saw the field. The
//! flush walks the terms of all those contexts in sorted order and, for each term,
//! merges the per-context document lists by document id into `.frq` and `.prx`.

use std::cmp::Ordering;

use itertools::Itertools;
use quill_common::{Result, error::Error};
use quill_io::{DataInput, Directory, IndexOutput};

use super::{
    byte_slices::{ByteSlicePool, SliceReader},
    char_pool::{CharPool, compare_terms},
    context::IndexingContext,
    deletes::BufferedDeletes,
    documents_writer::DocumentsWriter,
    norms::write_norms,
    posting::Posting,
    sequencer::WriterState,
    skip::SkipListWriter,
    term_infos::TermInfosWriter,
};
use crate::{
    segment::{
        FIELD_INFOS_EXT, FREQ_EXT, NORMS_EXT, PROX_EXT, TERMS_EXT, TERMS_INDEX_EXT, file_name,
    },
    term_info::TermInfo,
};

/// A segment written by a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedSegment {
    pub name: String,
    pub doc_count: u32,
    pub has_vectors: bool,
    pub files: Vec<String>,
}

/// Result of [`DocumentsWriter::flush`].
#[derive(Debug, Default)]
pub struct FlushOutcome {
    /// `None` when no document was buffered.
    pub segment: Option<FlushedSegment>,
    /// Deletes buffered up to the flush; their limits and document ids refer to the
    /// flushed segment.
    pub deletes: BufferedDeletes,
}

impl DocumentsWriter {
    /// Writes every buffered document to a new segment and hands out the buffered
    /// deletes. Blocks admission until done.
    ///
    /// On failure everything buffered is discarded, the files of the partial segment
    /// are deleted and a `WriterFault` is returned.
    pub fn flush(&self) -> Result<FlushOutcome> {
        let state = self.lock();
        if state.closed {
            return Err(Error::already_closed("documents writer"));
        }
        let mut state = self.pause_all(state);
        let mut created = Vec::new();
        match self.write_segment(&mut state, &mut created) {
            Ok(segment) => {
                let deletes = state.deletes.take(&self.budget);
                state.norms.clear();
                self.reset_postings(&mut state);
                self.resume(&mut state);
                Ok(FlushOutcome { segment, deletes })
            }
            Err(e) => {
                log::warn!("flush failed, discarding buffered documents: {e}");
                for name in &created {
                    if self.directory.file_exists(name) {
                        if let Err(e) = self.directory.delete_file(name) {
                            log::warn!("failed to delete {name}: {e}");
                        }
                    }
                }
                self.discard_buffered(&mut state);
                self.resume(&mut state);
                Err(Error::writer_fault(e))
            }
        }
    }

    fn write_segment(
        &self,
        state: &mut WriterState,
        created: &mut Vec<String>,
    ) -> Result<Option<FlushedSegment>> {
        let num_docs = state.num_docs_in_ram;
        if num_docs == 0 {
            return Ok(None);
        }
        let ram_before = self.budget.used();
        let store = state
            .doc_store
            .take()
            .ok_or_else(|| Error::invalid_operation("document store is not open"))?;
        let segment = store.segment().to_string();
        let has_vectors = store.has_vectors();
        debug_assert_eq!(store.num_docs(), num_docs);
        created.extend(store.files().iter().cloned());
        store.close().map_err(|e| Error::io(segment.as_str(), e))?;

        for ctx in &mut state.pool.idle {
            ctx.trim_fields();
        }
        let state = &*state;

        let fnm = file_name(&segment, FIELD_INFOS_EXT);
        let mut out = self.create_output(&fnm, created)?;
        state
            .field_infos
            .write(out.as_mut())
            .and_then(|()| out.seal())
            .map_err(|e| Error::io(fnm.as_str(), e))?;

        let num_terms = self.write_postings(state, &segment, created)?;

        if state.field_infos.has_norms() {
            let nrm = file_name(&segment, NORMS_EXT);
            let mut out = self.create_output(&nrm, created)?;
            write_norms(out.as_mut(), &state.field_infos, &state.norms, num_docs)
                .and_then(|()| out.seal())
                .map_err(|e| Error::io(nrm.as_str(), e))?;
        }

        let segment_bytes: u64 = created
            .iter()
            .filter_map(|name| self.directory.file_length(name).ok())
            .sum();
        log::info!(
            "flushed segment {segment}: {num_docs} docs, {num_terms} terms, RAM used {ram_before} \
             bytes, {segment_bytes} bytes on disk ({:.1}% of RAM)",
            100.0 * segment_bytes as f64 / ram_before.max(1) as f64
        );
        Ok(Some(FlushedSegment {
            name: segment,
            doc_count: num_docs,
            has_vectors,
            files: created.clone(),
        }))
    }

    fn create_output(
        &self,
        name: &str,
        created: &mut Vec<String>,
    ) -> Result<Box<dyn IndexOutput>> {
        let out = self
            .directory
            .create_output(name)
            .map_err(|e| Error::io(name, e))?;
        created.push(name.to_string());
        Ok(out)
    }

    /// Writes `.frq`, `.prx`, `.tis` and `.tii`. Returns the number of terms.
    fn write_postings(
        &self,
        state: &WriterState,
        segment: &str,
        created: &mut Vec<String>,
    ) -> Result<u64> {
        let mut fields: Vec<(&str, &IndexingContext, usize)> = Vec::new();
        for ctx in &state.pool.idle {
            for (index, fd) in ctx.fields.iter().enumerate() {
                if !fd.postings.is_empty() {
                    fields.push((fd.name.as_str(), &**ctx, index));
                }
            }
        }
        fields.sort_by(|a, b| a.0.cmp(b.0));

        let frq = file_name(segment, FREQ_EXT);
        let prx = file_name(segment, PROX_EXT);
        let freq = self.create_output(&frq, created)?;
        let prox = self.create_output(&prx, created)?;
        let mut postings = PostingsWriter {
            freq,
            prox,
            skip: SkipListWriter::new(
                self.config.skip_interval,
                self.config.max_skip_levels,
                state.num_docs_in_ram,
            ),
            terms: TermInfosWriter::new(
                self.config.term_index_interval,
                self.config.skip_interval,
                self.config.max_skip_levels,
            ),
            skip_interval: self.config.skip_interval,
            payload: Vec::new(),
        };

        let io_err = |e| Error::io(segment, e);
        let groups = fields.iter().chunk_by(|entry| entry.0);
        for (name, group) in &groups {
            let info = state
                .field_infos
                .by_name(name)
                .ok_or_else(|| Error::invalid_operation(format!("unknown field {name}")))?;
            let mut cursors: Vec<TermCursor<'_>> = group
                .map(|&(_, ctx, index)| TermCursor::new(ctx, index))
                .collect();
            postings
                .append_field(&mut cursors, info.number, info.store_payloads)
                .map_err(io_err)?;
        }

        postings
            .freq
            .seal()
            .and_then(|()| postings.prox.seal())
            .map_err(io_err)?;
        let tis = file_name(segment, TERMS_EXT);
        let tii = file_name(segment, TERMS_INDEX_EXT);
        created.push(tis.clone());
        created.push(tii.clone());
        postings
            .terms
            .finish(self.directory.as_ref(), &tis, &tii)
            .map_err(io_err)?;
        Ok(postings.terms.num_terms())
    }
}

/// The postings of one field of one context, in term order.
struct TermCursor<'a> {
    chars: &'a CharPool,
    pool: &'a ByteSlicePool,
    postings: &'a [Posting],
    order: Vec<u32>,
    upto: usize,
}

impl<'a> TermCursor<'a> {
    fn new(ctx: &'a IndexingContext, field: usize) -> TermCursor<'a> {
        let chars = ctx.chars();
        let postings = ctx.fields[field].postings.as_slice();
        let mut order: Vec<u32> = (0..postings.len() as u32).collect();
        order.sort_unstable_by(|&a, &b| {
            compare_terms(
                chars.text(postings[a as usize].text_start),
                chars.text(postings[b as usize].text_start),
            )
        });
        TermCursor {
            chars,
            pool: ctx.postings_pool(),
            postings,
            order,
            upto: 0,
        }
    }

    fn current(&self) -> Option<&'a [u16]> {
        let chars = self.chars;
        let postings = self.postings;
        self.order
            .get(self.upto)
            .map(|&id| chars.text(postings[id as usize].text_start))
    }

    /// Opens the document list of the current term and moves to the next term.
    fn take_stream(&mut self) -> std::io::Result<DocStream<'a>> {
        let pool = self.pool;
        let postings = self.postings;
        let posting = &postings[self.order[self.upto] as usize];
        self.upto += 1;
        let mut stream = DocStream {
            freq: pool.reader(&posting.freq),
            prox: pool.reader(&posting.prox),
            posting,
            doc: 0,
            term_freq: 0,
            pending: true,
        };
        stream.next_doc()?;
        Ok(stream)
    }
}

/// The documents of one term buffered by one context.
struct DocStream<'a> {
    freq: SliceReader<'a>,
    prox: SliceReader<'a>,
    posting: &'a Posting,
    doc: u32,
    term_freq: u32,
    /// The last document lives in the posting record, not in the freq stream.
    pending: bool,
}

impl DocStream<'_> {
    fn next_doc(&mut self) -> std::io::Result<bool> {
        if !self.freq.is_eof() {
            let code = self.freq.read_vint()?;
            self.doc += code >> 1;
            self.term_freq = if code & 1 != 0 {
                1
            } else {
                self.freq.read_vint()?
            };
            Ok(true)
        } else if self.pending {
            self.pending = false;
            self.doc = self.posting.last_doc_id;
            self.term_freq = self.posting.doc_freq;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

struct PostingsWriter {
    freq: Box<dyn IndexOutput>,
    prox: Box<dyn IndexOutput>,
    skip: SkipListWriter,
    terms: TermInfosWriter,
    skip_interval: u32,
    payload: Vec<u8>,
}

impl PostingsWriter {
    fn append_field(
        &mut self,
        cursors: &mut [TermCursor<'_>],
        number: u32,
        store_payloads: bool,
    ) -> std::io::Result<()> {
        let mut streams = Vec::with_capacity(cursors.len());
        loop {
            let Some(text) = cursors
                .iter()
                .filter_map(TermCursor::current)
                .min_by(|a, b| compare_terms(a, b))
            else {
                return Ok(());
            };
            for cursor in cursors.iter_mut() {
                if cursor
                    .current()
                    .is_some_and(|current| compare_terms(current, text) == Ordering::Equal)
                {
                    streams.push(cursor.take_stream()?);
                }
            }
            let info = self.append_term(&mut streams, store_payloads)?;
            self.terms.add(number, text, &info)?;
        }
    }

    /// Merges the document lists of one term by document id; drains `streams`.
    fn append_term(
        &mut self,
        streams: &mut Vec<DocStream<'_>>,
        store_payloads: bool,
    ) -> std::io::Result<TermInfo> {
        let freq_pointer = self.freq.file_pointer();
        let prox_pointer = self.prox.file_pointer();
        self.skip.reset(freq_pointer, prox_pointer);
        let mut last_doc = 0;
        let mut last_payload_length = -1;
        let mut df = 0;

        while let Some(i) = streams.iter().position_min_by_key(|s| s.doc) {
            df += 1;
            if df % self.skip_interval == 0 {
                self.skip.set_skip_data(
                    last_doc,
                    store_payloads,
                    last_payload_length,
                    self.freq.file_pointer(),
                    self.prox.file_pointer(),
                );
                self.skip.buffer_skip(df)?;
            }

            let stream = &mut streams[i];
            let doc = stream.doc;
            debug_assert!(df == 1 || doc > last_doc);
            for _ in 0..stream.term_freq {
                let code = stream.prox.read_vint()?;
                if !store_payloads {
                    self.prox.write_vint(code >> 1)?;
                    continue;
                }
                let payload_length = if code & 1 != 0 {
                    stream.prox.read_vint()? as i32
                } else {
                    0
                };
                if payload_length != last_payload_length {
                    self.prox.write_vint(code | 1)?;
                    self.prox.write_vint(payload_length as u32)?;
                    last_payload_length = payload_length;
                } else {
                    self.prox.write_vint(code & !1)?;
                }
                if payload_length > 0 {
                    self.payload.resize(payload_length as usize, 0);
                    stream.prox.read_bytes(&mut self.payload)?;
                    self.prox.write_bytes(&self.payload)?;
                }
            }

            let code = (doc - last_doc) << 1;
            last_doc = doc;
            if stream.term_freq == 1 {
                self.freq.write_vint(code | 1)?;
            } else {
                self.freq.write_vint(code)?;
                self.freq.write_vint(stream.term_freq)?;
            }

            if !stream.next_doc()? {
                streams.swap_remove(i);
            }
        }

        let skip_pointer = self.freq.file_pointer();
        self.skip.write_skip(self.freq.as_mut())?;
        Ok(TermInfo {
            doc_freq: df,
            freq_pointer,
            prox_pointer,
            skip_offset: (skip_pointer - freq_pointer) as u32,
        })
    }
}
