//! Deletes buffered since the last flush.

use std::collections::BTreeMap;

use quill_budget_tracker::RamBudget;

use crate::document::Term;

/// Accounted bytes of one buffered delete term, on top of its characters.
const BYTES_PER_DEL_TERM: u64 = 4 + 5 * 8 + 5 * 4;
/// Accounted bytes of one buffered deleted document id.
const BYTES_PER_DEL_DOC: u64 = 16;

/// Delete terms, each with the number of buffered documents it applies to, and
/// ids of buffered documents to delete outright.
#[derive(Debug, Default)]
pub struct BufferedDeletes {
    /// Term to limit: buffered documents with an id below the limit that contain
    /// the term are deleted. Documents in flushed segments always are.
    pub terms: BTreeMap<Term, u32>,
    pub doc_ids: Vec<u32>,
    bytes: u64,
}

impl BufferedDeletes {
    /// Buffers `term`, applying to documents with an id below `limit`. Buffering a
    /// term again only ever raises its limit.
    pub fn add_term(&mut self, term: Term, limit: u32, budget: &RamBudget) {
        match self.terms.get_mut(&term) {
            Some(existing) => *existing = (*existing).max(limit),
            None => {
                let bytes =
                    (term.field.encode_utf16().count() + term.text.encode_utf16().count()) as u64
                        * 2
                        + BYTES_PER_DEL_TERM;
                self.note(bytes, budget);
                self.terms.insert(term, limit);
            }
        }
    }

    pub fn add_doc_id(&mut self, doc_id: u32, budget: &RamBudget) {
        self.doc_ids.push(doc_id);
        self.note(BYTES_PER_DEL_DOC, budget);
    }

    fn note(&mut self, bytes: u64, budget: &RamBudget) {
        budget.note_allocation(bytes);
        budget.note_use(bytes);
        self.bytes += bytes;
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.doc_ids.is_empty()
    }

    /// Moves every buffered delete out, releasing its accounted memory.
    pub fn take(&mut self, budget: &RamBudget) -> BufferedDeletes {
        self.release(budget);
        BufferedDeletes {
            terms: std::mem::take(&mut self.terms),
            doc_ids: std::mem::take(&mut self.doc_ids),
            bytes: 0,
        }
    }

    pub fn clear(&mut self, budget: &RamBudget) {
        self.release(budget);
        self.terms.clear();
        self.doc_ids.clear();
    }

    fn release(&mut self, budget: &RamBudget) {
        if self.bytes > 0 {
            budget.release_use(self.bytes);
            budget.release_allocation(self.bytes);
            self.bytes = 0;
        }
    }
}
