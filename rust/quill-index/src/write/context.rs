//! Indexing contexts: the private workspace one document at a time is inverted in.
//!
//! A context is initialized for a document under the writer lock, processes it
//! without any lock, and hands its per-document buffers back for the in-order
//! commit. Postings accumulate in the context across documents until the next flush.

use std::panic::{self, AssertUnwindSafe};

use ahash::AHashMap;
use quill_common::{Result, error::Error};
use quill_io::{DataOutput, RamOutput};

use super::{
    blocks::{BlockSource, Recycled},
    byte_slices::ByteSlicePool,
    char_pool::{CharPool, encode_term},
    doc_store::FIELD_IS_TOKENIZED,
    field_data::{FieldData, TermSink},
    norms::BufferedNorms,
    posting::PostingVector,
};
use crate::{
    analysis::{Tokenizer, TokenizerType},
    document::{Document, Field, FieldValue},
    field_infos::{FieldFlags, FieldInfos},
    similarity::Similarity,
};

/// Pools and scratch state shared by all fields of one context.
struct ContextBuffers {
    postings_pool: ByteSlicePool,
    vectors_pool: ByteSlicePool,
    chars: CharPool,
    vectors: Vec<PostingVector>,
    posting_quota: usize,
    max_term_prefix: Option<String>,
}

impl ContextBuffers {
    fn sink<'a>(&'a mut self, source: &'a dyn BlockSource, doc_id: u32) -> TermSink<'a> {
        TermSink {
            source,
            postings_pool: &mut self.postings_pool,
            vectors_pool: &mut self.vectors_pool,
            chars: &mut self.chars,
            vectors: &mut self.vectors,
            posting_quota: &mut self.posting_quota,
            doc_id,
            max_term_prefix: &mut self.max_term_prefix,
        }
    }
}

pub(crate) struct IndexingContext {
    pub fields: Vec<FieldData>,
    field_lookup: AHashMap<String, usize>,
    /// Incremented per document; a field whose `last_gen` differs has not been seen
    /// in the current document yet.
    field_gen: i64,
    /// Fields of the current document, in order of first occurrence (by name once
    /// term vectors are being written).
    doc_fields: Vec<usize>,
    doc: Vec<Field>,
    doc_boost: f32,
    buffers: ContextBuffers,
    /// Field whose term vectors are being collected.
    vector_field: Option<usize>,
    term_text: Vec<u16>,

    pub doc_id: u32,
    /// Set when admitting or committing this document raised the flush-pending flag.
    pub flush_after: bool,
    pub num_stored_fields: u32,
    pub fdt_local: RamOutput,
    pub tvf_local: RamOutput,
    /// `(field number, offset in tvf_local)` of every field with term vectors.
    pub vector_fields: Vec<(u32, u64)>,
    /// Terms of the current document skipped for being too long.
    pub skipped_terms: u32,
}

impl IndexingContext {
    pub fn new() -> IndexingContext {
        IndexingContext {
            fields: Vec::new(),
            field_lookup: AHashMap::new(),
            field_gen: 0,
            doc_fields: Vec::new(),
            doc: Vec::new(),
            doc_boost: 1.0,
            buffers: ContextBuffers {
                postings_pool: ByteSlicePool::new(true),
                vectors_pool: ByteSlicePool::new(false),
                chars: CharPool::new(),
                vectors: Vec::new(),
                posting_quota: 0,
                max_term_prefix: None,
            },
            vector_field: None,
            term_text: Vec::new(),
            doc_id: 0,
            flush_after: false,
            num_stored_fields: 0,
            fdt_local: RamOutput::new(),
            tvf_local: RamOutput::new(),
            vector_fields: Vec::new(),
            skipped_terms: 0,
        }
    }

    /// Takes `doc` in as document `doc_id` and registers its fields. Runs under the
    /// writer lock. Returns whether the document has term vectors.
    pub fn init(&mut self, doc: Document, doc_id: u32, field_infos: &mut FieldInfos) -> bool {
        self.doc_id = doc_id;
        self.doc_boost = doc.boost();
        self.flush_after = false;
        self.num_stored_fields = 0;
        self.fdt_local.reset();
        self.tvf_local.reset();
        self.vector_fields.clear();
        self.skipped_terms = 0;
        self.buffers.max_term_prefix = None;
        self.doc_fields.clear();
        self.field_gen += 1;

        self.doc = doc.into_fields();
        let mut has_vectors = false;
        for (i, field) in self.doc.iter().enumerate() {
            let term_vector = field.term_vector();
            let flags = FieldFlags {
                indexed: field.is_indexed(),
                term_vector: term_vector.is_stored(),
                vector_positions: term_vector.with_positions(),
                vector_offsets: term_vector.with_offsets(),
                omit_norms: field.omit_norms(),
                payloads: false,
            };
            let number = field_infos.add(field.name(), flags);
            let index = match self.field_lookup.get(field.name()) {
                Some(&index) => index,
                None => {
                    let index = self.fields.len();
                    self.fields.push(FieldData::new(field.name(), number));
                    self.field_lookup.insert(field.name().to_string(), index);
                    index
                }
            };
            let fd = &mut self.fields[index];
            if fd.last_gen != self.field_gen {
                fd.start_doc(self.field_gen);
                self.doc_fields.push(index);
            }
            fd.instances.push(i);
            if field.is_indexed() {
                if term_vector.is_stored() {
                    has_vectors = true;
                    fd.do_vectors = true;
                    fd.do_vector_positions |= term_vector.with_positions();
                    fd.do_vector_offsets |= term_vector.with_offsets();
                }
                if !field.omit_norms() {
                    fd.do_norms = true;
                }
            }
        }
        has_vectors
    }

    /// Orders the document's fields by name, as required for documents written
    /// while the term vector files are open.
    pub fn sort_doc_fields(&mut self) {
        let fields = &self.fields;
        self.doc_fields
            .sort_by(|&a, &b| fields[a].name.cmp(&fields[b].name));
    }

    /// Inverts the current document into the context's postings and builds its
    /// stored fields and term vectors. Runs without the writer lock.
    ///
    /// On failure the postings written so far stay in place; the document is then
    /// deleted by id. A panic while inverting is resumed once the per-document
    /// buffers are released.
    pub fn process(
        &mut self,
        source: &dyn BlockSource,
        tokenizer: &TokenizerType,
        max_field_length: u32,
    ) -> Result<()> {
        let inverted = panic::catch_unwind(AssertUnwindSafe(|| {
            self.invert_document(source, tokenizer, max_field_length)
        }));
        self.end_document(source, !matches!(inverted, Ok(Ok(()))));
        match inverted {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn end_document(&mut self, source: &dyn BlockSource, failed: bool) {
        if failed {
            self.discard_pending_vectors();
        }
        let recycled = self.buffers.vectors_pool.reset();
        if !recycled.is_empty() {
            source.recycle_byte_blocks(recycled);
        }
        self.doc.clear();
        if let Some(prefix) = self.buffers.max_term_prefix.take() {
            log::warn!(
                "document {} has {} term(s) longer than the maximum term length, skipped; first starts with \"{prefix}...\"",
                self.doc_id,
                self.skipped_terms
            );
        }
    }

    fn invert_document(
        &mut self,
        source: &dyn BlockSource,
        tokenizer: &TokenizerType,
        max_field_length: u32,
    ) -> Result<()> {
        let IndexingContext {
            fields,
            doc_fields,
            doc,
            doc_boost,
            buffers,
            vector_field,
            term_text,
            doc_id,
            num_stored_fields,
            fdt_local,
            tvf_local,
            vector_fields,
            skipped_terms,
            ..
        } = self;

        for &index in doc_fields.iter() {
            let fd = &mut fields[index];
            fd.start_inversion(*doc_boost);
            if fd.do_vectors {
                *vector_field = Some(index);
            }
            for k in 0..fd.instances.len() {
                let field = &mut doc[fd.instances[k]];
                if field.is_indexed() {
                    let mut sink = buffers.sink(source, *doc_id);
                    let skipped =
                        invert_field(fd, field, &mut sink, tokenizer, term_text, max_field_length)?;
                    *skipped_terms += skipped;
                    fd.boost *= field.boost();
                }
                if field.is_stored() {
                    if let Some(text) = field.text_value() {
                        *num_stored_fields += 1;
                        fdt_local.write_vint(fd.number)?;
                        let bits = if field.is_tokenized() {
                            FIELD_IS_TOKENIZED
                        } else {
                            0
                        };
                        fdt_local.write_byte(bits)?;
                        fdt_local.write_string(text)?;
                    }
                }
            }
            if fd.do_vectors {
                vector_fields.push((fd.number, tvf_local.file_pointer()));
                fd.write_vectors(
                    &buffers.chars,
                    &buffers.vectors_pool,
                    &mut buffers.vectors,
                    tvf_local,
                )?;
                fd.detach_vectors(&buffers.vectors);
                buffers.vectors.clear();
                *vector_field = None;
            }
        }
        Ok(())
    }

    fn discard_pending_vectors(&mut self) {
        if let Some(index) = self.vector_field.take() {
            self.fields[index].detach_vectors(&self.buffers.vectors);
        }
        self.buffers.vectors.clear();
    }

    /// Appends the norm of every normed field of the current document.
    pub fn add_norms(&self, similarity: &dyn Similarity, norms: &mut Vec<Option<BufferedNorms>>) {
        for &index in &self.doc_fields {
            let fd = &self.fields[index];
            if !fd.do_norms {
                continue;
            }
            let number = fd.number as usize;
            if norms.len() <= number {
                norms.resize(number + 1, None);
            }
            let buffered = norms[number].get_or_insert_with(BufferedNorms::default);
            buffered.fill(self.doc_id);
            buffered.add(fd.boost * similarity.length_norm(&fd.name, fd.length));
        }
    }

    /// Numbers of the current document's fields that carried payloads.
    pub fn payload_fields(&self) -> impl Iterator<Item = u32> + '_ {
        self.doc_fields
            .iter()
            .map(|&index| &self.fields[index])
            .filter(|fd| fd.store_payloads)
            .map(|fd| fd.number)
    }

    pub fn chars(&self) -> &CharPool {
        &self.buffers.chars
    }

    pub fn postings_pool(&self) -> &ByteSlicePool {
        &self.buffers.postings_pool
    }

    /// Drops the fields not seen since the previous flush and shrinks sparse
    /// posting tables.
    pub fn trim_fields(&mut self) {
        let chars = &self.buffers.chars;
        self.fields.retain_mut(|fd| fd.trim(chars));
        self.field_lookup.clear();
        for (index, fd) in self.fields.iter().enumerate() {
            self.field_lookup.insert(fd.name.clone(), index);
        }
    }

    /// Forgets every buffered posting, returning the pool blocks and posting
    /// records for reuse.
    pub fn reset(&mut self) -> Recycled {
        let mut postings = std::mem::take(&mut self.buffers.posting_quota);
        for fd in &mut self.fields {
            postings += fd.reset_postings();
            fd.last_gen = -1;
        }
        self.field_gen = 0;
        self.doc_fields.clear();
        self.doc.clear();
        self.vector_field = None;
        self.buffers.vectors.clear();
        self.fdt_local.reset();
        self.tvf_local.reset();
        self.vector_fields.clear();
        self.flush_after = false;

        let mut byte_blocks = self.buffers.postings_pool.reset();
        byte_blocks.extend(self.buffers.vectors_pool.reset());
        Recycled {
            byte_blocks,
            char_blocks: self.buffers.chars.reset(),
            postings,
        }
    }
}

/// Inverts one instance of an indexed field. Returns the number of terms skipped
/// for being too long.
fn invert_field(
    fd: &mut FieldData,
    field: &mut Field,
    sink: &mut TermSink<'_>,
    tokenizer: &TokenizerType,
    term_text: &mut Vec<u16>,
    max_field_length: u32,
) -> Result<u32> {
    let tokenized = field.is_tokenized();
    let mut skipped = 0;
    // returns whether the field reached its maximum length
    let mut add = |fd: &mut FieldData, text: &str, start: u32, end: u32, payload: Option<&[u8]>| {
        encode_term(text, term_text);
        if !fd.add_position(sink, term_text, start, end, payload) {
            skipped += 1;
        }
        fd.length += 1;
        if fd.length >= max_field_length {
            log::debug!(
                "field {} reached max_field_length {max_field_length}, remaining terms ignored",
                fd.name
            );
            return true;
        }
        false
    };

    match field.value_mut() {
        FieldValue::Text(value) if !tokenized => {
            let len = value.len() as u32;
            add(fd, value.as_str(), 0, len, None);
            fd.offset += len;
        }
        FieldValue::Text(value) => {
            let mut last_end = None;
            for span in tokenizer.tokenize(value.as_str()) {
                let end = span.end as u32;
                let full = add(fd, span.text.as_ref(), span.start as u32, end, None);
                last_end = Some(end);
                if full {
                    break;
                }
            }
            if let Some(end) = last_end {
                fd.offset += end + 1;
            }
        }
        FieldValue::Tokens(tokens) => {
            let mut last_end = None;
            loop {
                let token = match tokens.next_token() {
                    Ok(Some(token)) => token,
                    Ok(None) => break,
                    Err(e) => return Err(Error::tokenization(fd.name.as_str(), e)),
                };
                // a zero increment stacks the token on the previous position
                fd.position = (fd.position + token.position_increment).saturating_sub(1);
                let full = add(
                    fd,
                    token.text.as_str(),
                    token.start_offset,
                    token.end_offset,
                    token.payload.as_deref(),
                );
                last_end = Some(token.end_offset);
                if full {
                    break;
                }
            }
            if let Some(end) = last_end {
                fd.offset += end + 1;
            }
        }
    }
    Ok(skipped)
}

#[cfg(test)]
mod tests {
    use quill_common::error::StdErrorBoxed;
    use quill_io::DataInput;

    use super::*;
    use crate::{
        analysis::{PreAnalyzed, Token, create_tokenizer},
        document::{Field, TermVectorOptions},
        write::blocks::testing::LocalBlocks,
    };

    fn find<'a>(ctx: &'a IndexingContext, field: &str, term: &str) -> Option<&'a crate::write::posting::Posting> {
        let fd = ctx.fields.iter().find(|fd| fd.name == field)?;
        let text: Vec<u16> = term.encode_utf16().collect();
        fd.postings
            .iter()
            .find(|p| ctx.chars().text(p.text_start) == text.as_slice())
    }

    #[test]
    fn test_process_document() {
        let blocks = LocalBlocks::default();
        let tokenizer = create_tokenizer("unicode-word").unwrap();
        let mut infos = FieldInfos::new();
        let mut ctx = IndexingContext::new();

        let doc = Document::new()
            .with_field(Field::keyword("id", "d0"))
            .with_field(Field::text("body", "the quick fox jumps over the dog"));
        assert!(!ctx.init(doc, 0, &mut infos));
        ctx.process(&blocks, &tokenizer, 10_000).unwrap();

        assert_eq!(ctx.num_stored_fields, 2);
        let the = find(&ctx, "body", "the").unwrap();
        assert_eq!((the.last_doc_id, the.doc_freq), (0, 2));
        assert!(find(&ctx, "id", "d0").is_some());
        let body = ctx.fields.iter().find(|fd| fd.name == "body").unwrap();
        assert_eq!(body.length, 7);

        let mut fdt = ctx.fdt_local.as_bytes();
        assert_eq!(fdt.read_vint().unwrap(), 0);
        assert_eq!(fdt.read_byte().unwrap(), 0);
        assert_eq!(fdt.read_string().unwrap(), "d0");
        assert_eq!(fdt.read_vint().unwrap(), 1);
        assert_eq!(fdt.read_byte().unwrap(), FIELD_IS_TOKENIZED);
    }

    #[test]
    fn test_max_field_length_and_instances() {
        let blocks = LocalBlocks::default();
        let tokenizer = create_tokenizer("unicode-word").unwrap();
        let mut infos = FieldInfos::new();
        let mut ctx = IndexingContext::new();
        let doc = Document::new()
            .with_field(Field::unstored("body", "a b"))
            .with_field(Field::unstored("body", "c d e"));
        ctx.init(doc, 0, &mut infos);
        ctx.process(&blocks, &tokenizer, 4).unwrap();
        let body = &ctx.fields[0];
        assert_eq!(body.length, 4);
        assert_eq!(body.position, 4);
        assert!(find(&ctx, "body", "d").is_some());
        assert!(find(&ctx, "body", "e").is_none());
    }

    #[test]
    fn test_norms_and_payload_fields() {
        let blocks = LocalBlocks::default();
        let tokenizer = create_tokenizer("unicode-word").unwrap();
        let mut infos = FieldInfos::new();
        let mut ctx = IndexingContext::new();
        let tokens = PreAnalyzed::new(vec![
            Token::new("x", 0, 1).with_payload(vec![9]),
            Token::new("y", 2, 3),
        ]);
        let doc = Document::new()
            .with_boost(2.0)
            .with_field(Field::tokens("pre", tokens))
            .with_field(Field::unstored("plain", "a").with_omit_norms(true));
        ctx.init(doc, 3, &mut infos);
        ctx.process(&blocks, &tokenizer, 100).unwrap();
        assert_eq!(ctx.payload_fields().collect::<Vec<_>>(), [0]);

        let mut norms = Vec::new();
        ctx.add_norms(&crate::similarity::DefaultSimilarity, &mut norms);
        assert_eq!(norms.len(), 1);
        let pre = norms[0].as_ref().unwrap();
        assert_eq!(pre.len(), 4);
    }

    #[test]
    fn test_failing_token_source() {
        struct Failing;
        impl crate::analysis::TokenSource for Failing {
            fn next_token(&mut self) -> std::result::Result<Option<Token>, StdErrorBoxed> {
                Err("broken stream".into())
            }
        }
        let blocks = LocalBlocks::default();
        let tokenizer = create_tokenizer("unicode-word").unwrap();
        let mut infos = FieldInfos::new();
        let mut ctx = IndexingContext::new();
        let doc = Document::new()
            .with_field(
                Field::unstored("body", "kept").with_term_vector(TermVectorOptions::Yes),
            )
            .with_field(Field::tokens("broken", Failing));
        ctx.init(doc, 0, &mut infos);
        let err = ctx.process(&blocks, &tokenizer, 100).unwrap_err();
        assert!(matches!(
            err.kind(),
            quill_common::ErrorKind::Tokenization { field, .. } if field == "broken"
        ));
        assert!(ctx.fields.iter().flat_map(|fd| &fd.postings).all(|p| p.vector.is_none()));
    }

    #[test]
    fn test_reset_returns_postings() {
        let blocks = LocalBlocks::default();
        let tokenizer = create_tokenizer("unicode-word").unwrap();
        let mut infos = FieldInfos::new();
        let mut ctx = IndexingContext::new();
        ctx.init(Document::new().with_field(Field::unstored("body", "a b c")), 0, &mut infos);
        ctx.process(&blocks, &tokenizer, 100).unwrap();
        let recycled = ctx.reset();
        assert_eq!(recycled.postings, crate::write::blocks::POSTINGS_BATCH);
        assert!(ctx.fields[0].postings.is_empty());
        assert_eq!(ctx.fields[0].last_gen, -1);
    }
}
