//! The index writer: buffers documents through a [`DocumentsWriter`], flushes them
//! into segments and keeps the segment list and deletions on disk.

use std::sync::{Arc, Mutex};

use quill_common::{Result, error::Error};
use quill_io::Directory;

use crate::{
    config::IndexWriterConfig,
    document::{Document, Term},
    read::SegmentReader,
    segment::{BitVector, DELETES_EXT, SegmentInfo, SegmentInfos, file_name},
    write::{BufferedDeletes, DocumentsWriter, FlushOutcome},
};

/// New deletion bits of one segment.
struct DeletesChange {
    segment: usize,
    previous: Option<BitVector>,
    bits: BitVector,
    deleted: u32,
}

/// Adds, updates and deletes documents of one index.
///
/// # Thread Safety
///
/// All methods take `&self` and may be called from any number of threads. Flushes
/// are serialized; documents added during a flush wait for it to finish.
pub struct IndexWriter {
    directory: Arc<dyn Directory>,
    documents: DocumentsWriter,
    segments: Mutex<SegmentInfos>,
}

impl IndexWriter {
    /// Opens the index in `directory`, creating it if there is none.
    pub fn new(directory: Arc<dyn Directory>, config: IndexWriterConfig) -> Result<IndexWriter> {
        let segments = SegmentInfos::load(directory.as_ref())?;
        log::debug!(
            "opened index with {} segments, {} docs",
            segments.segments.len(),
            segments.total_docs()
        );
        let documents = DocumentsWriter::new(directory.clone(), config, segments.counter)?;
        Ok(IndexWriter {
            directory,
            documents,
            segments: Mutex::new(segments),
        })
    }

    pub fn config(&self) -> &IndexWriterConfig {
        self.documents.config()
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn add_document(&self, doc: Document) -> Result<()> {
        if self.documents.add_document(doc)? {
            self.flush()?;
        }
        Ok(())
    }

    /// Deletes every document containing `term`, then adds `doc`.
    pub fn update_document(&self, term: Term, doc: Document) -> Result<()> {
        if self.documents.update_document(doc, Some(term))? {
            self.flush()?;
        }
        Ok(())
    }

    /// Deletes every document added so far that contains `term`.
    pub fn delete_term(&self, term: Term) -> Result<()> {
        if self.documents.buffer_delete_term(term)? {
            self.flush()?;
        }
        Ok(())
    }

    pub fn delete_terms(&self, terms: impl IntoIterator<Item = Term>) -> Result<()> {
        if self.documents.buffer_delete_terms(terms)? {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes buffered documents to a new segment and applies buffered deletes.
    ///
    /// If the new segment or its deletions cannot be committed, the segment is
    /// dropped, deletion files are restored and a `WriterFault` is returned; the
    /// buffered documents and deletes are lost as after any aborted flush.
    pub fn flush(&self) -> Result<()> {
        let mut segments = self.segments.lock().unwrap();
        let FlushOutcome { segment, deletes } = self.documents.flush()?;
        if segment.is_none() && deletes.is_empty() {
            return Ok(());
        }

        let mut updated = segments.clone();
        let num_existing = updated.segments.len();
        let mut new_files = Vec::new();
        if let Some(segment) = segment {
            new_files = segment.files;
            updated.segments.push(SegmentInfo {
                name: segment.name,
                doc_count: segment.doc_count,
                del_count: 0,
                has_vectors: segment.has_vectors,
            });
        }
        updated.counter = self.documents.segment_counter();

        match self.commit(&segments, &mut updated, num_existing, &deletes) {
            Ok(()) => {
                *segments = updated;
                Ok(())
            }
            Err(e) => {
                log::warn!("failed to commit flushed segment, rolling back: {e}");
                if let Some(info) = updated.segments.get(num_existing) {
                    new_files.push(file_name(&info.name, DELETES_EXT));
                }
                for name in &new_files {
                    if self.directory.file_exists(name) {
                        if let Err(e) = self.directory.delete_file(name) {
                            log::warn!("failed to delete {name}: {e}");
                        }
                    }
                }
                Err(Error::writer_fault(e))
            }
        }
    }

    /// Applies `deletes` and saves `updated`. Segments from `flushed` on were
    /// written by this flush and honor the delete limits. On failure, deletion files
    /// of earlier segments are put back as recorded in `current`.
    fn commit(
        &self,
        current: &SegmentInfos,
        updated: &mut SegmentInfos,
        flushed: usize,
        deletes: &BufferedDeletes,
    ) -> Result<()> {
        let changes = self.collect_deletes(&updated.segments, flushed, deletes)?;
        let mut written = 0;
        let mut result = Ok(());
        for change in &changes {
            let info = &mut updated.segments[change.segment];
            if let Err(e) = self.write_deletes(&info.name, &change.bits) {
                result = Err(e);
                break;
            }
            written += 1;
            log::debug!("segment {}: {} docs deleted", info.name, change.deleted);
            info.del_count = change.bits.count();
        }
        if result.is_ok() {
            result = updated.save(self.directory.as_ref());
        }
        match result {
            Ok(()) => {
                let deleted: u32 = changes.iter().map(|c| c.deleted).sum();
                if deleted > 0 {
                    log::info!(
                        "applied {} delete terms: {deleted} docs deleted",
                        deletes.num_terms()
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.restore(current, &changes[..written]);
                Err(e)
            }
        }
    }

    /// Computes the deletion bits of every segment `deletes` changes.
    fn collect_deletes(
        &self,
        segments: &[SegmentInfo],
        flushed: usize,
        deletes: &BufferedDeletes,
    ) -> Result<Vec<DeletesChange>> {
        let mut changes = Vec::new();
        for (i, info) in segments.iter().enumerate() {
            let is_new = i >= flushed;
            if !is_new && deletes.terms.is_empty() {
                continue;
            }
            let reader = SegmentReader::open(self.directory.as_ref(), info)?;
            let previous = reader.deleted_docs().cloned();
            let mut bits = previous
                .clone()
                .unwrap_or_else(|| BitVector::new(info.doc_count));
            let mut deleted = 0u32;
            for (term, &limit) in &deletes.terms {
                let Some(mut postings) = reader.postings(&term.field, &term.text)? else {
                    continue;
                };
                while postings.next_doc()? {
                    if is_new && postings.doc() >= limit {
                        break;
                    }
                    if bits.set(postings.doc()) {
                        deleted += 1;
                    }
                }
            }
            if is_new {
                for &doc in &deletes.doc_ids {
                    if bits.set(doc) {
                        deleted += 1;
                    }
                }
            }
            if deleted > 0 {
                changes.push(DeletesChange {
                    segment: i,
                    previous,
                    bits,
                    deleted,
                });
            }
        }
        Ok(changes)
    }

    fn write_deletes(&self, segment: &str, bits: &BitVector) -> Result<()> {
        let name = file_name(segment, DELETES_EXT);
        let mut out = self
            .directory
            .create_output(&name)
            .map_err(|e| Error::io(name.as_str(), e))?;
        bits.write(out.as_mut())
            .and_then(|()| out.seal())
            .map_err(|e| Error::io(name.as_str(), e))
    }

    /// Puts back the deletion files of `written` segments and the saved segment list.
    fn restore(&self, current: &SegmentInfos, written: &[DeletesChange]) {
        for change in written {
            let Some(info) = current.segments.get(change.segment) else {
                continue;
            };
            let restored = match &change.previous {
                Some(bits) => self.write_deletes(&info.name, bits),
                None => {
                    let name = file_name(&info.name, DELETES_EXT);
                    self.directory
                        .delete_file(&name)
                        .map_err(|e| Error::io(name.as_str(), e))
                }
            };
            if let Err(e) = restored {
                log::warn!("failed to restore deletions of segment {}: {e}", info.name);
            }
        }
        if let Err(e) = current.save(self.directory.as_ref()) {
            log::warn!("failed to restore the segment list: {e}");
        }
    }

    /// Flushes buffered documents and rejects any further change.
    pub fn close(&self) -> Result<()> {
        if self.documents.is_closed() {
            return Ok(());
        }
        self.flush()?;
        self.documents.close();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.documents.is_closed()
    }

    /// Discards buffered documents and deletes; flushed segments stay.
    pub fn abort(&self) {
        self.documents.abort();
    }

    /// Live documents, buffered ones included.
    pub fn num_docs(&self) -> u64 {
        let segments = self.segments.lock().unwrap();
        segments.live_docs() + self.documents.num_docs_in_ram() as u64
    }

    /// Documents including deleted ones and buffered ones.
    pub fn max_doc(&self) -> u64 {
        let segments = self.segments.lock().unwrap();
        segments.total_docs() + self.documents.num_docs_in_ram() as u64
    }

    pub fn num_docs_in_ram(&self) -> u32 {
        self.documents.num_docs_in_ram()
    }

    /// The flushed segments.
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.segments.lock().unwrap().segments.clone()
    }

    pub fn ram_used(&self) -> u64 {
        self.documents.ram_used()
    }

    /// Term occurrences skipped for exceeding the maximum term length.
    pub fn skipped_terms(&self) -> u64 {
        self.documents.skipped_terms()
    }

    /// Opens a reader over every flushed segment.
    pub fn segment_readers(&self) -> Result<Vec<SegmentReader>> {
        self.segments()
            .iter()
            .map(|info| SegmentReader::open(self.directory.as_ref(), info))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use quill_io::RamDirectory;

    use super::*;
    use crate::document::Field;

    fn doc(id: &str, body: &str) -> Document {
        Document::new()
            .with_field(Field::keyword("id", id))
            .with_field(Field::text("body", body))
    }

    #[test]
    fn test_flush_records_segment() {
        let dir = Arc::new(RamDirectory::new());
        let writer = IndexWriter::new(dir.clone(), IndexWriterConfig::new()).unwrap();
        writer.add_document(doc("1", "a b")).unwrap();
        writer.add_document(doc("2", "b c")).unwrap();
        assert_eq!(writer.num_docs(), 2);
        writer.flush().unwrap();
        assert_eq!(writer.num_docs_in_ram(), 0);

        let segments = writer.segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].name, "_0");
        assert_eq!(segments[0].doc_count, 2);

        let loaded = SegmentInfos::load(dir.as_ref()).unwrap();
        assert_eq!(loaded.segments, segments);
        assert_eq!(loaded.counter, 1);
    }

    #[test]
    fn test_delete_in_ram_respects_limit() {
        let writer =
            IndexWriter::new(Arc::new(RamDirectory::new()), IndexWriterConfig::new()).unwrap();
        writer.add_document(doc("1", "x")).unwrap();
        writer.delete_term(Term::new("body", "x")).unwrap();
        writer.add_document(doc("2", "x")).unwrap();
        writer.flush().unwrap();

        let segments = writer.segments();
        assert_eq!(segments[0].del_count, 1);
        assert_eq!(writer.num_docs(), 1);
        let reader = &writer.segment_readers().unwrap()[0];
        assert!(reader.is_deleted(0));
        assert!(!reader.is_deleted(1));
    }

    #[test]
    fn test_delete_reaches_earlier_segments() {
        let dir = Arc::new(RamDirectory::new());
        let writer = IndexWriter::new(dir.clone(), IndexWriterConfig::new()).unwrap();
        writer.add_document(doc("1", "old")).unwrap();
        writer.add_document(doc("2", "keep")).unwrap();
        writer.flush().unwrap();
        writer.delete_term(Term::new("body", "old")).unwrap();
        writer.flush().unwrap();

        let segments = writer.segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].del_count, 1);
        assert!(dir.file_exists("_0.del"));
        assert_eq!(writer.num_docs(), 1);
        assert_eq!(writer.max_doc(), 2);
    }

    #[test]
    fn test_delete_several_terms() {
        let writer =
            IndexWriter::new(Arc::new(RamDirectory::new()), IndexWriterConfig::new()).unwrap();
        for (id, body) in [("1", "a"), ("2", "b"), ("3", "c")] {
            writer.add_document(doc(id, body)).unwrap();
        }
        writer
            .delete_terms([Term::new("id", "1"), Term::new("body", "c")])
            .unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.segments()[0].del_count, 2);
        assert_eq!(writer.num_docs(), 1);
    }

    #[test]
    fn test_reopen_continues_segment_names() {
        let dir = Arc::new(RamDirectory::new());
        {
            let writer = IndexWriter::new(dir.clone(), IndexWriterConfig::new()).unwrap();
            writer.add_document(doc("1", "a")).unwrap();
            writer.close().unwrap();
            assert!(writer.add_document(doc("2", "b")).is_err());
        }
        let writer = IndexWriter::new(dir.clone(), IndexWriterConfig::new()).unwrap();
        writer.add_document(doc("2", "b")).unwrap();
        writer.close().unwrap();
        let names: Vec<_> = writer.segments().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["_0", "_1"]);
        assert_eq!(writer.num_docs(), 2);
    }

    #[test]
    fn test_auto_flush_on_buffered_docs() {
        let writer = IndexWriter::new(
            Arc::new(RamDirectory::new()),
            IndexWriterConfig::new().with_max_buffered_docs(Some(3)),
        )
        .unwrap();
        for i in 0..7 {
            writer.add_document(doc(&i.to_string(), "t")).unwrap();
        }
        assert_eq!(writer.segments().len(), 2);
        assert_eq!(writer.num_docs_in_ram(), 1);
        assert_eq!(writer.num_docs(), 7);
    }
}
