//! Buffered norm bytes and the segment norms file.

use quill_io::IndexOutput;

use crate::{
    field_infos::FieldInfos,
    similarity::{DEFAULT_NORM, encode_norm},
};

/// Header of the `.nrm` file.
pub const NORMS_HEADER: [u8; 4] = [b'N', b'R', b'M', 0xFF];

/// Norm bytes of one field, one per document up to the last document that had the
/// field.
#[derive(Debug, Default, Clone)]
pub(crate) struct BufferedNorms {
    bytes: Vec<u8>,
}

impl BufferedNorms {
    /// Pads with the default norm up to (excluding) `doc_id`.
    pub fn fill(&mut self, doc_id: u32) {
        debug_assert!(self.bytes.len() <= doc_id as usize);
        self.bytes.resize(doc_id as usize, DEFAULT_NORM);
    }

    pub fn add(&mut self, norm: f32) {
        self.bytes.push(encode_norm(norm));
    }

    /// Number of documents covered so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn reset(&mut self) {
        self.bytes.clear();
    }
}

/// Writes the norms of every indexed field with norms, in field number order, each
/// padded with the default norm to `num_docs` bytes.
pub(crate) fn write_norms(
    out: &mut dyn IndexOutput,
    field_infos: &FieldInfos,
    norms: &[Option<BufferedNorms>],
    num_docs: u32,
) -> std::io::Result<()> {
    out.write_bytes(&NORMS_HEADER)?;
    let mut padding = Vec::new();
    for info in field_infos.iter().filter(|info| info.has_norms()) {
        let buffered = norms
            .get(info.number as usize)
            .and_then(Option::as_ref)
            .map_or(&[][..], |n| n.bytes.as_slice());
        out.write_bytes(buffered)?;
        padding.clear();
        padding.resize(num_docs as usize - buffered.len(), DEFAULT_NORM);
        out.write_bytes(&padding)?;
    }
    Ok(())
}
