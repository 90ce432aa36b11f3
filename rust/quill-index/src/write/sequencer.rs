//! Admission and in-order commit of documents.
//!
//! Every document passes two short critical sections on the writer lock:
//! [`acquire`](DocumentsWriter::acquire) assigns its id and checks out a context,
//! [`finish`](DocumentsWriter::finish) appends its stored fields, vectors and norms
//! once every document with a smaller id has been appended. Inversion in between
//! runs without the lock.

use std::sync::MutexGuard;

use quill_budget_tracker::BalanceAction;
use quill_common::{Result, error::Error};

use super::{
    blocks::{BlockAllocator, FreeKind},
    context::IndexingContext,
    deletes::BufferedDeletes,
    doc_store::DocStoreWriter,
    documents_writer::DocumentsWriter,
    norms::BufferedNorms,
};
use crate::{
    document::{Document, Term},
    field_infos::FieldInfos,
    segment::segment_name,
};

/// Upper bound on the number of indexing contexts, and so on the number of
/// documents inverted at the same time.
pub const MAX_CONTEXTS: usize = 5;

/// Order in which balancing releases free memory.
const FREE_ORDER: [FreeKind; 3] = [FreeKind::ByteBlock, FreeKind::CharBlock, FreeKind::Postings];

/// Stop-the-world barrier. While raised, no document is admitted; the raiser waits
/// for every context to become idle before touching shared buffers.
#[derive(Debug, Default)]
pub(crate) struct PauseBarrier {
    pauses: u32,
    generation: u64,
}

impl PauseBarrier {
    /// Returns the generation of this pause.
    pub fn raise(&mut self) -> u64 {
        self.pauses += 1;
        self.generation += 1;
        self.generation
    }

    /// Returns `true` when the last pause was lifted.
    pub fn lower(&mut self) -> bool {
        debug_assert!(self.pauses > 0);
        self.pauses -= 1;
        self.pauses == 0
    }

    pub fn is_paused(&self) -> bool {
        self.pauses > 0
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Indexing contexts: idle ones, and checked-in ones whose document waits for an
/// earlier document to be committed.
#[derive(Default)]
pub(crate) struct ContextPool {
    pub idle: Vec<Box<IndexingContext>>,
    pub waiting: Vec<Box<IndexingContext>>,
    created: usize,
}

impl ContextPool {
    pub fn can_take(&self) -> bool {
        !self.idle.is_empty() || self.created < MAX_CONTEXTS
    }

    pub fn take(&mut self) -> Option<Box<IndexingContext>> {
        if let Some(ctx) = self.idle.pop() {
            return Some(ctx);
        }
        if self.created < MAX_CONTEXTS {
            self.created += 1;
            return Some(Box::new(IndexingContext::new()));
        }
        None
    }

    pub fn put_back(&mut self, ctx: Box<IndexingContext>) {
        self.idle.push(ctx);
    }

    /// Whether no context is checked out or waiting.
    pub fn all_idle(&self) -> bool {
        self.idle.len() == self.created
    }

    pub fn created(&self) -> usize {
        self.created
    }
}

/// Everything guarded by the writer lock.
pub(crate) struct WriterState {
    pub pool: ContextPool,
    pub barrier: PauseBarrier,
    pub allocator: BlockAllocator,
    pub field_infos: FieldInfos,
    /// Buffered norms by field number.
    pub norms: Vec<Option<BufferedNorms>>,
    pub deletes: BufferedDeletes,
    /// Stored fields and vectors of the segment being built; opened by the first
    /// document admitted after a flush.
    pub doc_store: Option<DocStoreWriter>,
    /// Number of segment names handed out.
    pub segment_counter: u64,
    pub next_doc_id: u32,
    pub next_write_doc_id: u32,
    pub num_docs_in_ram: u32,
    pub flush_pending: bool,
    pub buffer_is_full: bool,
    pub abort_count: u32,
    pub closed: bool,
}

impl WriterState {
    pub fn new(segment_counter: u64) -> WriterState {
        WriterState {
            pool: ContextPool::default(),
            barrier: PauseBarrier::default(),
            allocator: BlockAllocator::default(),
            field_infos: FieldInfos::new(),
            norms: Vec::new(),
            deletes: BufferedDeletes::default(),
            doc_store: None,
            segment_counter,
            next_doc_id: 0,
            next_write_doc_id: 0,
            num_docs_in_ram: 0,
            flush_pending: false,
            buffer_is_full: false,
            abort_count: 0,
            closed: false,
        }
    }

    /// Raises the flush-pending flag; `true` for the caller that raised it.
    pub fn set_flush_pending(&mut self) -> bool {
        if self.flush_pending {
            false
        } else {
            self.flush_pending = true;
            true
        }
    }

    fn admission_blocked(&self) -> bool {
        self.barrier.is_paused()
            || self.flush_pending
            || self.abort_count > 0
            || !self.pool.can_take()
    }
}

impl DocumentsWriter {
    pub(super) fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap()
    }

    pub(super) fn wait<'a>(&'a self, state: MutexGuard<'a, WriterState>) -> MutexGuard<'a, WriterState> {
        self.cond.wait(state).unwrap()
    }

    /// Admits `doc`: assigns the next document id, checks out a context and
    /// initializes it for the document. Buffers `del_term` for documents admitted
    /// before this one.
    pub(super) fn acquire(
        &self,
        doc: Document,
        del_term: Option<Term>,
    ) -> Result<Box<IndexingContext>> {
        let mut state = self.lock();
        while !state.closed && state.admission_blocked() {
            state = self.wait(state);
        }
        if state.closed {
            return Err(Error::already_closed("documents writer"));
        }
        let Some(mut ctx) = state.pool.take() else {
            return Err(Error::invalid_operation("no indexing context available"));
        };

        let doc_id = state.next_doc_id;
        if let Err(e) = self.open_doc_store(&mut state) {
            state.pool.put_back(ctx);
            let state = self.abort_locked(state);
            drop(state);
            return Err(Error::writer_fault(e));
        }

        let has_vectors = ctx.init(doc, doc_id, &mut state.field_infos);
        if has_vectors {
            let opened = match state.doc_store.as_mut() {
                Some(store) => store
                    .open_vectors(self.directory.as_ref())
                    .map_err(|e| Error::io(store.segment(), e)),
                None => Ok(()),
            };
            if let Err(e) = opened {
                state.pool.put_back(ctx);
                let state = self.abort_locked(state);
                drop(state);
                return Err(Error::writer_fault(e));
            }
        }
        if state.doc_store.as_ref().is_some_and(DocStoreWriter::has_vectors) {
            ctx.sort_doc_fields();
        }

        if let Some(term) = del_term {
            let state = &mut *state;
            state.deletes.add_term(term, doc_id, &self.budget);
            ctx.flush_after = self.time_to_flush_deletes(state);
        }
        state.next_doc_id += 1;
        state.num_docs_in_ram += 1;
        if !state.flush_pending
            && self
                .config
                .max_buffered_docs
                .is_some_and(|max| state.num_docs_in_ram >= max)
        {
            state.flush_pending = true;
            ctx.flush_after = true;
        }
        Ok(ctx)
    }

    fn open_doc_store(&self, state: &mut WriterState) -> Result<()> {
        if state.doc_store.is_some() {
            return Ok(());
        }
        let name = segment_name(state.segment_counter);
        state.segment_counter += 1;
        let store = DocStoreWriter::open(self.directory.as_ref(), &name)
            .map_err(|e| Error::io(name.as_str(), e))?;
        log::debug!("opened segment {name}");
        state.doc_store = Some(store);
        Ok(())
    }

    /// Checks `ctx` back in. Commits its document, and every waiting document it
    /// unblocks, in document id order. A `failed` document is still committed (its
    /// id is consumed) and marked deleted.
    ///
    /// Returns whether the caller should flush.
    pub(super) fn finish(&self, mut ctx: Box<IndexingContext>, failed: bool) -> Result<bool> {
        let mut state = self.lock();
        if state.abort_count > 0 {
            state.pool.put_back(ctx);
            self.cond.notify_all();
            return Err(Error::writer_fault(Error::invalid_operation(
                "document was in flight while the writer aborted",
            )));
        }

        let mut flush = std::mem::take(&mut ctx.flush_after);
        if failed {
            let doc_id = ctx.doc_id;
            state.deletes.add_doc_id(doc_id, &self.budget);
        }

        if ctx.doc_id != state.next_write_doc_id {
            state.pool.waiting.push(ctx);
        } else {
            let mut ctx = ctx;
            loop {
                let written = self.write_document(&mut state, &ctx);
                state.pool.put_back(ctx);
                match written {
                    Ok(triggered) => flush |= triggered,
                    Err(e) => {
                        let state = self.abort_locked(state);
                        drop(state);
                        return Err(Error::writer_fault(e));
                    }
                }
                let next = state.next_write_doc_id;
                match state.pool.waiting.iter().position(|c| c.doc_id == next) {
                    Some(i) => ctx = state.pool.waiting.swap_remove(i),
                    None => break,
                }
            }
        }

        if failed {
            if flush {
                state.flush_pending = false;
                flush = false;
            }
        } else {
            flush |= self.time_to_flush_deletes(&mut state);
        }
        self.cond.notify_all();
        Ok(flush)
    }

    /// Appends the document staged in `ctx` to the segment. Returns `true` if this
    /// raised the flush-pending flag because the RAM buffer is full.
    fn write_document(&self, state: &mut WriterState, ctx: &IndexingContext) -> Result<bool> {
        debug_assert_eq!(ctx.doc_id, state.next_write_doc_id);
        let store = state
            .doc_store
            .as_mut()
            .ok_or_else(|| Error::invalid_operation("document store is not open"))?;
        store
            .add_document(
                ctx.num_stored_fields,
                &ctx.fdt_local,
                &ctx.vector_fields,
                &ctx.tvf_local,
            )
            .map_err(|e| Error::io(store.segment(), e))?;
        ctx.add_norms(&*self.config.similarity, &mut state.norms);
        for number in ctx.payload_fields() {
            state.field_infos.set_store_payloads(number);
        }
        state.next_write_doc_id += 1;

        Ok(state.buffer_is_full && state.set_flush_pending())
    }

    /// Whether buffered deletes (or a full RAM buffer) call for a flush. Raises the
    /// flush-pending flag; only the caller that raised it gets `true`.
    pub(super) fn time_to_flush_deletes(&self, state: &mut WriterState) -> bool {
        (state.buffer_is_full || self.deletes_full(state)) && state.set_flush_pending()
    }

    fn deletes_full(&self, state: &WriterState) -> bool {
        let ram_full = self.config.ram_flush_enabled()
            && self
                .budget
                .limit()
                .is_some_and(|limit| self.budget.used() >= limit);
        let terms_full = self
            .config
            .max_buffered_delete_terms
            .is_some_and(|max| state.deletes.num_terms() >= max as usize);
        ram_full || terms_full
    }

    /// Raises the pause barrier and waits until every context is idle.
    pub(super) fn pause_all<'a>(
        &'a self,
        mut state: MutexGuard<'a, WriterState>,
    ) -> MutexGuard<'a, WriterState> {
        let generation = state.barrier.raise();
        log::trace!("pause {generation}: waiting for idle contexts");
        while !state.pool.all_idle() {
            state = self.wait(state);
        }
        state
    }

    pub(super) fn resume(&self, state: &mut WriterState) {
        if state.barrier.lower() {
            self.cond.notify_all();
        }
    }

    /// Releases free blocks, or marks the buffer full, once RAM use approaches the
    /// budget.
    pub(super) fn balance_ram(&self, state: &mut WriterState) {
        if !self.config.ram_flush_enabled() || state.buffer_is_full {
            return;
        }
        match self.budget.plan() {
            BalanceAction::None => {}
            BalanceAction::Flush => {
                log::debug!(
                    "RAM used {} exceeds the budget, flush required",
                    self.budget.used()
                );
                state.buffer_is_full = true;
            }
            BalanceAction::Free { level } => {
                let before = self.budget.allocated();
                let mut step = 0;
                while self.budget.allocated() > level {
                    if state.allocator.is_empty() {
                        state.buffer_is_full = true;
                        break;
                    }
                    state
                        .allocator
                        .release_one(FREE_ORDER[step % FREE_ORDER.len()], &self.budget);
                    step += 1;
                }
                log::debug!(
                    "released {} bytes of free buffers, allocated now {}, used {}{}",
                    before - self.budget.allocated(),
                    self.budget.allocated(),
                    self.budget.used(),
                    if state.buffer_is_full {
                        "; nothing left to release, flush required"
                    } else {
                        ""
                    }
                );
            }
        }
    }

    /// Discards everything buffered: documents, postings, norms and deletes. Waits
    /// for in-flight documents, which then fail with a writer fault.
    pub(super) fn abort_locked<'a>(
        &'a self,
        mut state: MutexGuard<'a, WriterState>,
    ) -> MutexGuard<'a, WriterState> {
        state.abort_count += 1;
        let waiting = std::mem::take(&mut state.pool.waiting);
        for ctx in waiting {
            state.pool.put_back(ctx);
        }
        self.cond.notify_all();

        let mut state = self.pause_all(state);
        log::warn!(
            "aborting: discarding {} buffered document(s)",
            state.num_docs_in_ram
        );
        self.discard_buffered(&mut state);
        self.resume(&mut state);
        state.abort_count -= 1;
        self.cond.notify_all();
        state
    }

    pub(super) fn discard_buffered(&self, state: &mut WriterState) {
        state.deletes.clear(&self.budget);
        if let Some(store) = state.doc_store.take() {
            store.discard(self.directory.as_ref());
        }
        state.norms.clear();
        self.reset_postings(state);
    }

    /// Resets every context and the document counters after a flush or an abort.
    /// Requires all contexts idle.
    pub(super) fn reset_postings(&self, state: &mut WriterState) {
        debug_assert!(state.pool.all_idle());
        for ctx in &mut state.pool.idle {
            state.allocator.recycle(ctx.reset());
        }
        state.next_doc_id = 0;
        state.next_write_doc_id = 0;
        state.num_docs_in_ram = 0;
        state.flush_pending = false;
        self.budget.reset_used();
        state.buffer_is_full = false;
        self.balance_ram(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_barrier_nests() {
        let mut barrier = PauseBarrier::default();
        assert!(!barrier.is_paused());
        assert_eq!(barrier.raise(), 1);
        assert_eq!(barrier.raise(), 2);
        assert!(!barrier.lower());
        assert!(barrier.is_paused());
        assert!(barrier.lower());
        assert!(!barrier.is_paused());
        assert_eq!(barrier.generation(), 2);
    }

    #[test]
    fn test_context_pool_is_bounded() {
        let mut pool = ContextPool::default();
        let taken: Vec<_> = (0..MAX_CONTEXTS).map(|_| pool.take().unwrap()).collect();
        assert!(!pool.can_take());
        assert!(pool.take().is_none());
        assert!(!pool.all_idle());
        for ctx in taken {
            pool.put_back(ctx);
        }
        assert!(pool.all_idle());
        assert_eq!(pool.created(), MAX_CONTEXTS);
        assert!(pool.take().is_some());
    }

    #[test]
    fn test_set_flush_pending_once() {
        let mut state = WriterState::new(0);
        assert!(state.set_flush_pending());
        assert!(!state.set_flush_pending());
        assert!(state.admission_blocked());
    }
}
