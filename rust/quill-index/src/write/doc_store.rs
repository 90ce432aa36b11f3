//! Stored fields and term vectors files of the segment being built.
//!
//! Documents are appended in document order from per-document staging buffers.
//! The vector files are opened the first time a document has term vectors; every
//! document stored before that gets an empty entry.

use quill_io::{Directory, IndexOutput, RamOutput};

use crate::segment::{
    FIELDS_EXT, FIELDS_INDEX_EXT, VECTORS_DOCUMENTS_EXT, VECTORS_FIELDS_EXT, VECTORS_INDEX_EXT,
    file_name,
};

/// Format version written at the start of each term vectors file.
pub const TERM_VECTORS_FORMAT: i32 = 2;

/// Stored bit of a field tokenized at index time.
pub const FIELD_IS_TOKENIZED: u8 = 0x1;

struct VectorsWriter {
    tvx: Box<dyn IndexOutput>,
    tvd: Box<dyn IndexOutput>,
    tvf: Box<dyn IndexOutput>,
}

pub(crate) struct DocStoreWriter {
    segment: String,
    fdx: Box<dyn IndexOutput>,
    fdt: Box<dyn IndexOutput>,
    vectors: Option<VectorsWriter>,
    num_docs: u32,
    files: Vec<String>,
}

impl DocStoreWriter {
    pub fn open(directory: &dyn Directory, segment: &str) -> std::io::Result<DocStoreWriter> {
        let fdt_name = file_name(segment, FIELDS_EXT);
        let fdx_name = file_name(segment, FIELDS_INDEX_EXT);
        let fdt = directory.create_output(&fdt_name)?;
        let fdx = directory.create_output(&fdx_name)?;
        Ok(DocStoreWriter {
            segment: segment.to_string(),
            fdx,
            fdt,
            vectors: None,
            num_docs: 0,
            files: vec![fdt_name, fdx_name],
        })
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn has_vectors(&self) -> bool {
        self.vectors.is_some()
    }

    /// Names of the files created so far.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Opens the term vectors files, writing an empty entry for every document
    /// stored so far.
    pub fn open_vectors(&mut self, directory: &dyn Directory) -> std::io::Result<()> {
        if self.vectors.is_some() {
            return Ok(());
        }
        let mut open = |ext: &str| -> std::io::Result<Box<dyn IndexOutput>> {
            let name = file_name(&self.segment, ext);
            let mut out = directory.create_output(&name)?;
            self.files.push(name);
            out.write_int(TERM_VECTORS_FORMAT)?;
            Ok(out)
        };
        let mut tvx = open(VECTORS_INDEX_EXT)?;
        let mut tvd = open(VECTORS_DOCUMENTS_EXT)?;
        let tvf = open(VECTORS_FIELDS_EXT)?;
        for _ in 0..self.num_docs {
            tvx.write_long(tvd.file_pointer() as i64)?;
            tvd.write_vint(0)?;
        }
        self.vectors = Some(VectorsWriter { tvx, tvd, tvf });
        Ok(())
    }

    /// Appends one document: its stored fields, and its term vectors when the vector
    /// files are open. `vector_fields` holds `(field number, offset in tvf_local)`
    /// pairs, the first at offset 0.
    pub fn add_document(
        &mut self,
        num_stored_fields: u32,
        fdt_local: &RamOutput,
        vector_fields: &[(u32, u64)],
        tvf_local: &RamOutput,
    ) -> std::io::Result<()> {
        self.fdx.write_long(self.fdt.file_pointer() as i64)?;
        self.fdt.write_vint(num_stored_fields)?;
        fdt_local.write_to(self.fdt.as_mut())?;

        if let Some(vectors) = self.vectors.as_mut() {
            vectors.tvx.write_long(vectors.tvd.file_pointer() as i64)?;
            vectors.tvd.write_vint(vector_fields.len() as u32)?;
            if let Some(&(_, first)) = vector_fields.first() {
                debug_assert_eq!(first, 0);
                for &(number, _) in vector_fields {
                    vectors.tvd.write_vint(number)?;
                }
                vectors.tvd.write_vlong(vectors.tvf.file_pointer())?;
                for pair in vector_fields.windows(2) {
                    vectors.tvd.write_vlong(pair[1].1 - pair[0].1)?;
                }
                tvf_local.write_to(vectors.tvf.as_mut())?;
            }
        }
        self.num_docs += 1;
        Ok(())
    }

    /// Seals every file; returns their names.
    pub fn close(mut self) -> std::io::Result<Vec<String>> {
        self.fdx.seal()?;
        self.fdt.seal()?;
        if let Some(vectors) = self.vectors.as_mut() {
            vectors.tvx.seal()?;
            vectors.tvd.seal()?;
            vectors.tvf.seal()?;
        }
        Ok(self.files)
    }

    /// Drops the writer and deletes whatever it created.
    pub fn discard(self, directory: &dyn Directory) {
        let DocStoreWriter { files, .. } = self;
        for name in files {
            if let Err(e) = directory.delete_file(&name) {
                log::warn!("failed to delete {name}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use quill_io::{DataOutput, RamDirectory};

    use super::*;

    #[test]
    fn test_vectors_backfill_earlier_documents() {
        let dir = RamDirectory::new();
        let mut store = DocStoreWriter::open(&dir, "_0").unwrap();
        let mut fdt_local = RamOutput::new();
        fdt_local.write_vint(0).unwrap();
        fdt_local.write_byte(FIELD_IS_TOKENIZED).unwrap();
        fdt_local.write_string("hi").unwrap();
        let empty = RamOutput::new();
        store.add_document(1, &fdt_local, &[], &empty).unwrap();
        assert!(!store.has_vectors());

        store.open_vectors(&dir).unwrap();
        let mut tvf_local = RamOutput::new();
        tvf_local.write_bytes(&[1, 2, 3]).unwrap();
        store
            .add_document(0, &empty, &[(0, 0), (2, 2)], &tvf_local)
            .unwrap();
        assert_eq!(store.num_docs(), 2);

        let files = store.close().unwrap();
        assert_eq!(files, ["_0.fdt", "_0.fdx", "_0.tvx", "_0.tvd", "_0.tvf"]);

        let mut tvx = dir.open_input("_0.tvx").unwrap();
        assert_eq!(tvx.read_int().unwrap(), TERM_VECTORS_FORMAT);
        assert_eq!(tvx.read_long().unwrap(), 4);
        assert_eq!(tvx.read_long().unwrap(), 5);

        let mut tvd = dir.open_input("_0.tvd").unwrap();
        tvd.seek(4).unwrap();
        assert_eq!(tvd.read_vint().unwrap(), 0);
        assert_eq!(tvd.read_vint().unwrap(), 2);
        assert_eq!(tvd.read_vint().unwrap(), 0);
        assert_eq!(tvd.read_vint().unwrap(), 2);
        assert_eq!(tvd.read_vlong().unwrap(), 4);
        assert_eq!(tvd.read_vlong().unwrap(), 2);

        let mut fdx = dir.open_input("_0.fdx").unwrap();
        assert_eq!(fdx.read_long().unwrap(), 0);
        // field count, number, bits, then "hi" with its length
        assert_eq!(fdx.read_long().unwrap(), 6);
        assert_eq!(dir.file_length("_0.fdt").unwrap(), 7);
    }

    #[test]
    fn test_discard_deletes_files() {
        let dir = RamDirectory::new();
        let mut store = DocStoreWriter::open(&dir, "_1").unwrap();
        store.open_vectors(&dir).unwrap();
        store.discard(&dir);
        assert!(dir.list_all().unwrap().is_empty());
    }
}
