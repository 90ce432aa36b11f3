//! In-memory inverted index construction.
//!
//! Documents added from any number of threads are tokenized and inverted into
//! in-memory postings, then flushed into immutable segments: a term dictionary,
//! document/frequency and position lists with multi-level skip data, norms, stored
//! fields and term vectors.
//!
//! # Overview
//!
//! - [`IndexWriter`] is the entry point: it buffers documents, flushes segments
//!   when the RAM budget or the buffered document count is exceeded, and applies
//!   deletes to buffered and flushed documents.
//! - [`write::DocumentsWriter`] is the indexing engine underneath it.
//! - [`read::SegmentReader`] reads a flushed segment back.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use quill_index::{Document, Field, IndexWriter, IndexWriterConfig, Term};
//! use quill_io::RamDirectory;
//!
//! let writer = IndexWriter::new(Arc::new(RamDirectory::new()), IndexWriterConfig::new()).unwrap();
//! writer
//!     .add_document(Document::new().with_field(Field::text("body", "Hello, world!")))
//!     .unwrap();
//! writer.delete_term(Term::new("body", "missing")).unwrap();
//! writer.flush().unwrap();
//!
//! let readers = writer.segment_readers().unwrap();
//! assert_eq!(readers[0].doc_freq("body", "hello").unwrap(), 1);
//! ```

pub mod analysis;
pub mod config;
pub mod document;
pub mod field_infos;
pub mod index_writer;
pub mod read;
pub mod segment;
pub mod similarity;
pub mod term_info;
pub mod write;

pub use analysis::{PreAnalyzed, Token, TokenSource, Tokenizer, create_tokenizer};
pub use config::IndexWriterConfig;
pub use document::{Document, Field, TermVectorOptions, Term};
pub use index_writer::IndexWriter;
pub use segment::{SegmentInfo, SegmentInfos};
