//! In-memory posting records.

use super::byte_slices::ByteStream;

/// Everything buffered for one unique term of one field.
///
/// The document currently being indexed is not yet in `freq`: its delta code and
/// in-document frequency stay in `last_doc_code`/`doc_freq` until the next document
/// containing the term arrives, or until the segment is flushed.
#[derive(Debug, Clone, Copy)]
pub struct Posting {
    /// Address of the term text in the char pool.
    pub text_start: u32,
    /// Occurrences of the term in the last document seen.
    pub doc_freq: u32,
    pub last_doc_id: u32,
    /// `(doc delta) << 1` of the last document seen.
    pub last_doc_code: u32,
    pub last_position: u32,
    /// Doc-delta/frequency pairs of the finished documents.
    pub freq: ByteStream,
    /// Position deltas (and payloads) of every document, including the last one.
    pub prox: ByteStream,
    /// Term vector entry of the document being processed.
    pub vector: Option<u32>,
}

/// Term vector data of one term in the field being processed.
#[derive(Debug, Clone, Copy)]
pub struct PostingVector {
    /// Index of the posting in its field.
    pub posting: u32,
    pub last_offset: u32,
    pub positions: Option<ByteStream>,
    pub offsets: Option<ByteStream>,
}

/// Hash code of a term: `31 * h + unit` over the units from last to first.
pub fn term_hash(text: &[u16]) -> i32 {
    text.iter()
        .rev()
        .fold(0i32, |code, &unit| code.wrapping_mul(31).wrapping_add(unit as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_hash() {
        assert_eq!(term_hash(&[]), 0);
        assert_eq!(term_hash(&[b'a' as u16]), 97);
        // "ab": 'b' first, then 31 * 98 + 97
        assert_eq!(term_hash(&[b'a' as u16, b'b' as u16]), 31 * 98 + 97);
        let long: Vec<u16> = std::iter::repeat_n(0xFFFE, 50).collect();
        let _ = term_hash(&long);
    }
}
