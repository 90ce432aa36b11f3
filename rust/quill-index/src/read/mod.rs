//! Reading flushed segments back.

mod postings;
mod segment_reader;
mod skip;
mod term_infos;

pub use postings::Postings;
pub use segment_reader::{SegmentReader, StoredField, TermVector, TermVectorEntry};
pub use term_infos::{TermEntry, TermEnum, TermInfosReader};
