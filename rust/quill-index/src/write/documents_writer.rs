//! The in-memory indexing engine.
//!
//! Documents are inverted concurrently into a small pool of indexing contexts and
//! committed in document id order (see the `sequencer` module). A flush merges the
//! postings of all contexts into one new segment.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use quill_budget_tracker::RamBudget;
use quill_common::{Result, error::Error};
use quill_io::Directory;

use super::{
    blocks::{BYTE_BLOCK_SIZE, BlockSource, CHAR_BLOCK_BYTES, POSTING_NUM_BYTE},
    sequencer::WriterState,
};
use crate::{
    analysis::TokenizerType,
    config::IndexWriterConfig,
    document::{Document, Term},
};

/// Builds segments from documents added by any number of threads.
///
/// # Thread Safety
///
/// All methods take `&self`. Tokenization and inversion of a document run outside
/// the writer lock; admission, commit, deletes and flushes are serialized on it.
pub struct DocumentsWriter {
    pub(super) directory: Arc<dyn Directory>,
    pub(super) config: IndexWriterConfig,
    pub(super) tokenizer: TokenizerType,
    pub(super) budget: RamBudget,
    pub(super) state: Mutex<WriterState>,
    pub(super) cond: Condvar,
    skipped_terms: AtomicU64,
}

impl DocumentsWriter {
    /// Creates a writer over `directory`. New segments are named from
    /// `segment_counter` on.
    pub fn new(
        directory: Arc<dyn Directory>,
        config: IndexWriterConfig,
        segment_counter: u64,
    ) -> Result<DocumentsWriter> {
        config.validate()?;
        let tokenizer = config.create_tokenizer()?;
        let budget = if config.ram_flush_enabled() {
            RamBudget::from_mb(config.ram_buffer_size_mb)
        } else {
            RamBudget::new(None)
        };
        Ok(DocumentsWriter {
            directory,
            config,
            tokenizer,
            budget,
            state: Mutex::new(WriterState::new(segment_counter)),
            cond: Condvar::new(),
            skipped_terms: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &IndexWriterConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// Indexes `doc`. Returns `true` when the caller should flush.
    pub fn add_document(&self, doc: Document) -> Result<bool> {
        self.update_document(doc, None)
    }

    /// Indexes `doc`, deleting every earlier document containing `del_term`.
    /// Returns `true` when the caller should flush.
    ///
    /// A document that fails during inversion still consumes its id and is
    /// deleted at the next flush; the error is returned and the writer stays
    /// usable. Errors of kind `WriterFault` mean every buffered document was
    /// discarded. A panic inside a token source is propagated after the document
    /// is committed as failed.
    pub fn update_document(&self, doc: Document, del_term: Option<Term>) -> Result<bool> {
        doc.validate()?;
        let mut ctx = self.acquire(doc, del_term)?;
        let processed = panic::catch_unwind(AssertUnwindSafe(|| {
            ctx.process(self, &self.tokenizer, self.config.max_field_length)
        }));
        let processed = match processed {
            Ok(processed) => processed,
            Err(payload) => {
                log::warn!("document {} panicked while being inverted, deleting it", ctx.doc_id);
                // commit the id so documents after it are not held back
                let _ = self.finish(ctx, true);
                panic::resume_unwind(payload);
            }
        };
        if ctx.skipped_terms > 0 {
            self.skipped_terms
                .fetch_add(ctx.skipped_terms as u64, Ordering::Relaxed);
        }
        let failed = processed.is_err();
        if !failed && self.config.ram_flush_enabled() && self.budget.should_balance() {
            let mut state = self.lock();
            self.balance_ram(&mut state);
        }
        let flush = self.finish(ctx, failed)?;
        processed.map(|()| flush)
    }

    /// Buffers a delete of every document containing `term` that was added before
    /// this call. Returns `true` when the caller should flush.
    pub fn buffer_delete_term(&self, term: Term) -> Result<bool> {
        self.buffer_delete_terms(std::iter::once(term))
    }

    pub fn buffer_delete_terms(&self, terms: impl IntoIterator<Item = Term>) -> Result<bool> {
        let mut state = self.lock();
        while !state.closed
            && (state.barrier.is_paused() || state.flush_pending || state.abort_count > 0)
        {
            state = self.wait(state);
        }
        if state.closed {
            return Err(Error::already_closed("documents writer"));
        }
        let state = &mut *state;
        for term in terms {
            state.deletes.add_term(term, state.next_doc_id, &self.budget);
        }
        Ok(self.time_to_flush_deletes(state))
    }

    /// Discards every buffered document and delete. Documents being added
    /// concurrently fail with a writer fault.
    pub fn abort(&self) {
        let state = self.lock();
        drop(self.abort_locked(state));
    }

    /// Rejects any further document or delete. Buffered documents are kept; flush
    /// them first.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Documents buffered since the last flush, failed ones included.
    pub fn num_docs_in_ram(&self) -> u32 {
        self.lock().num_docs_in_ram
    }

    pub fn has_buffered_deletes(&self) -> bool {
        !self.lock().deletes.is_empty()
    }

    /// Bytes of buffered postings, term text and deletes.
    pub fn ram_used(&self) -> u64 {
        self.budget.used()
    }

    /// Term occurrences skipped so far for exceeding the maximum term length.
    pub fn skipped_terms(&self) -> u64 {
        self.skipped_terms.load(Ordering::Relaxed)
    }

    /// Number of segment names handed out so far.
    pub fn segment_counter(&self) -> u64 {
        self.lock().segment_counter
    }
}

impl BlockSource for DocumentsWriter {
    fn byte_block(&self, track_used: bool) -> Box<[u8]> {
        let (block, fresh) = self.lock().allocator.take_byte_block();
        if fresh {
            self.budget.note_allocation(BYTE_BLOCK_SIZE as u64);
        }
        if track_used {
            self.budget.note_use(BYTE_BLOCK_SIZE as u64);
        }
        block
    }

    fn char_block(&self) -> Box<[u16]> {
        let (block, fresh) = self.lock().allocator.take_char_block();
        if fresh {
            self.budget.note_allocation(CHAR_BLOCK_BYTES);
        }
        self.budget.note_use(CHAR_BLOCK_BYTES);
        block
    }

    fn recycle_byte_blocks(&self, blocks: Vec<Box<[u8]>>) {
        self.lock().allocator.recycle_byte_blocks(blocks);
    }

    fn reserve_postings(&self, count: usize) {
        let fresh = self.lock().allocator.take_postings(count);
        self.budget.note_allocation(fresh as u64 * POSTING_NUM_BYTE);
        self.budget.note_use(count as u64 * POSTING_NUM_BYTE);
    }
}

#[cfg(test)]
mod tests {
    use quill_io::RamDirectory;

    use super::*;
    use crate::{
        analysis::{PreAnalyzed, Token},
        document::Field,
    };

    fn writer(config: IndexWriterConfig) -> DocumentsWriter {
        DocumentsWriter::new(Arc::new(RamDirectory::new()), config, 0).unwrap()
    }

    fn doc(body: &str) -> Document {
        Document::new().with_field(Field::text("body", body))
    }

    #[test]
    fn test_documents_are_buffered() {
        let dw = writer(IndexWriterConfig::new());
        assert!(!dw.add_document(doc("a b c")).unwrap());
        assert!(!dw.add_document(doc("b c d")).unwrap());
        assert_eq!(dw.num_docs_in_ram(), 2);
        assert!(dw.ram_used() > 0);
        assert_eq!(dw.segment_counter(), 1);
        assert!(dw.directory().file_exists("_0.fdt"));
    }

    #[test]
    fn test_max_buffered_docs_requests_flush() {
        let dw = writer(IndexWriterConfig::new().with_max_buffered_docs(Some(2)));
        assert!(!dw.add_document(doc("one")).unwrap());
        assert!(dw.add_document(doc("two")).unwrap());
    }

    #[test]
    fn test_max_buffered_delete_terms_requests_flush() {
        let dw = writer(IndexWriterConfig::new().with_max_buffered_delete_terms(Some(2)));
        dw.add_document(doc("one")).unwrap();
        assert!(!dw.buffer_delete_term(Term::new("body", "one")).unwrap());
        assert!(dw.buffer_delete_term(Term::new("body", "two")).unwrap());
        assert!(dw.has_buffered_deletes());
    }

    #[test]
    fn test_failed_document_consumes_its_id() {
        struct Failing;
        impl crate::analysis::TokenSource for Failing {
            fn next_token(
                &mut self,
            ) -> std::result::Result<Option<Token>, quill_common::error::StdErrorBoxed> {
                Err("broken stream".into())
            }
        }

        let dw = writer(IndexWriterConfig::new());
        dw.add_document(doc("first")).unwrap();
        let err = dw
            .add_document(Document::new().with_field(Field::tokens("body", Failing)))
            .unwrap_err();
        assert!(!err.is_writer_fault());
        dw.add_document(
            Document::new().with_field(Field::tokens(
                "body",
                PreAnalyzed::new(vec![Token::new("third", 0, 5)]),
            )),
        )
        .unwrap();
        assert_eq!(dw.num_docs_in_ram(), 3);
        assert_eq!(dw.lock().deletes.doc_ids, vec![1]);
    }

    #[test]
    fn test_abort_discards_buffered_documents() {
        let dw = writer(IndexWriterConfig::new());
        dw.add_document(doc("a b")).unwrap();
        dw.buffer_delete_term(Term::new("body", "a")).unwrap();
        dw.abort();
        assert_eq!(dw.num_docs_in_ram(), 0);
        assert_eq!(dw.ram_used(), 0);
        assert!(!dw.has_buffered_deletes());
        assert!(!dw.directory().file_exists("_0.fdt"));
        dw.add_document(doc("c")).unwrap();
        assert_eq!(dw.num_docs_in_ram(), 1);
    }

    #[test]
    fn test_closed_writer_rejects_documents() {
        let dw = writer(IndexWriterConfig::new());
        dw.close();
        assert!(dw.is_closed());
        assert!(dw.add_document(doc("a")).unwrap_err().is_already_closed());
        assert!(
            dw.buffer_delete_term(Term::new("body", "a"))
                .unwrap_err()
                .is_already_closed()
        );
    }

    #[test]
    fn test_balance_releases_free_blocks_before_requesting_flush() {
        let dw = writer(IndexWriterConfig::new().with_ram_buffer_size_mb(64.0));
        let body = (0..10_000).map(|i| format!("term{i}")).collect::<Vec<_>>().join(" ");
        assert!(!dw.add_document(doc(&body)).unwrap());
        dw.flush().unwrap();
        assert_eq!(dw.ram_used(), 0);

        let allocated = dw.budget.allocated();
        let mut state = dw.lock();
        let (bytes, chars, postings) = (
            state.allocator.free_byte_blocks(),
            state.allocator.free_char_blocks(),
            state.allocator.free_postings(),
        );
        assert!(bytes > 0 && chars > 0 && postings > 0);

        dw.budget.set_limit(Some(allocated * 3 / 4));
        let level = dw.budget.thresholds().unwrap().free_level;
        dw.balance_ram(&mut state);
        assert!(dw.budget.allocated() <= level);
        assert!(!state.buffer_is_full);
        // released round-robin, one unit of each kind per round
        assert!(state.allocator.free_byte_blocks() < bytes);
        assert!(state.allocator.free_char_blocks() < chars);
        assert!(state.allocator.free_postings() < postings);
        assert!(!state.allocator.is_empty());
        drop(state);

        // the next document's blocks are in use, so freeing cannot reach the level
        dw.budget.set_limit(Some(1));
        assert!(dw.add_document(doc("small")).unwrap());
        let state = dw.lock();
        assert!(state.allocator.is_empty());
        assert!(state.buffer_is_full);
        assert!(state.flush_pending);
        assert!(dw.budget.allocated() > 0);
    }

    #[test]
    fn test_oversized_terms_are_counted() {
        let dw = writer(IndexWriterConfig::new().with_tokenizer("trivial"));
        let long = "x".repeat(20_000);
        dw.add_document(Document::new().with_field(Field::keyword("id", long)))
            .unwrap();
        assert_eq!(dw.skipped_terms(), 1);
        assert_eq!(dw.num_docs_in_ram(), 1);
    }
}
