//! Building segments in memory.

mod blocks;
mod byte_slices;
mod char_pool;
mod context;
mod deletes;
mod doc_store;
mod documents_writer;
mod field_data;
mod flush;
mod norms;
mod posting;
mod posting_table;
mod sequencer;
mod skip;
mod term_infos;

pub use blocks::MAX_TERM_LENGTH;
pub use deletes::BufferedDeletes;
pub use documents_writer::DocumentsWriter;
pub use flush::{FlushOutcome, FlushedSegment};
pub use sequencer::MAX_CONTEXTS;
pub use skip::num_skip_levels;
#[cfg(test)]
pub(crate) use skip::SkipListWriter;

pub(crate) use doc_store::{FIELD_IS_TOKENIZED, TERM_VECTORS_FORMAT};
pub(crate) use norms::NORMS_HEADER;
