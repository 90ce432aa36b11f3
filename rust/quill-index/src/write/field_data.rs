//! Buffered postings of one field within one indexing context, and the per-document
//! inversion state of that field.

use quill_io::{DataOutput, RamOutput};

use super::{
    blocks::{BlockSource, MAX_TERM_LENGTH, POSTINGS_BATCH},
    byte_slices::ByteSlicePool,
    char_pool::CharPool,
    posting::{Posting, PostingVector, term_hash},
    posting_table::{Probe, PostingTable},
};

/// Units of an oversized term kept for the warning message.
const MAX_TERM_PREFIX_LEN: usize = 30;

const VECTOR_POSITIONS: u8 = 0x1;
const VECTOR_OFFSETS: u8 = 0x2;

pub(crate) struct FieldData {
    pub name: String,
    pub number: u32,
    pub table: PostingTable,
    pub postings: Vec<Posting>,
    /// Generation of the last document that contained the field; `-1` once the
    /// field was carried over a flush.
    pub last_gen: i64,

    /// Indices of this field's instances in the current document.
    pub instances: Vec<usize>,
    pub do_vectors: bool,
    pub do_vector_positions: bool,
    pub do_vector_offsets: bool,
    pub do_norms: bool,
    /// Set once any position of this field carried a payload.
    pub store_payloads: bool,

    pub length: u32,
    pub position: u32,
    pub offset: u32,
    pub boost: f32,
}

/// The context-wide buffers term occurrences are written to.
pub(crate) struct TermSink<'a> {
    pub source: &'a dyn BlockSource,
    pub postings_pool: &'a mut ByteSlicePool,
    pub vectors_pool: &'a mut ByteSlicePool,
    pub chars: &'a mut CharPool,
    pub vectors: &'a mut Vec<PostingVector>,
    pub posting_quota: &'a mut usize,
    pub doc_id: u32,
    /// Prefix of the first oversized term of the document.
    pub max_term_prefix: &'a mut Option<String>,
}

impl FieldData {
    pub fn new(name: &str, number: u32) -> FieldData {
        FieldData {
            name: name.to_string(),
            number,
            table: PostingTable::new(),
            postings: Vec::new(),
            last_gen: -1,
            instances: Vec::new(),
            do_vectors: false,
            do_vector_positions: false,
            do_vector_offsets: false,
            do_norms: false,
            store_payloads: false,
            length: 0,
            position: 0,
            offset: 0,
            boost: 1.0,
        }
    }

    /// Clears the per-document state on the first instance of the field in a
    /// document.
    pub fn start_doc(&mut self, gen_: i64) {
        self.last_gen = gen_;
        self.instances.clear();
        self.do_vectors = false;
        self.do_vector_positions = false;
        self.do_vector_offsets = false;
        self.do_norms = false;
        self.store_payloads = false;
    }

    /// Starts the inversion of all instances of the field in the current document.
    pub fn start_inversion(&mut self, doc_boost: f32) {
        self.length = 0;
        self.position = 0;
        self.offset = 0;
        self.boost = doc_boost;
    }

    /// Drops every buffered posting. The table keeps its size.
    pub fn reset_postings(&mut self) -> usize {
        let count = self.postings.len();
        self.table.clear();
        self.postings.clear();
        count
    }

    /// Records one occurrence of `text` at the current position.
    ///
    /// `start` and `end` are the token's offsets relative to the current instance.
    /// Returns `false` if the term was too long to be indexed.
    pub fn add_position(
        &mut self,
        sink: &mut TermSink<'_>,
        text: &[u16],
        start: u32,
        end: u32,
        payload: Option<&[u8]>,
    ) -> bool {
        let code = term_hash(text);
        let doc_id = sink.doc_id;
        let probe = self.table.probe(text, code, &self.postings, sink.chars);

        let (id, prox_code, new_vector) = match probe {
            Probe::Found(id) => {
                let p = &mut self.postings[id as usize];
                if p.last_doc_id != doc_id {
                    debug_assert!(p.doc_freq > 0);
                    let mut freq = p.freq;
                    if p.doc_freq == 1 {
                        sink.postings_pool
                            .write_vint(sink.source, &mut freq, p.last_doc_code | 1);
                    } else {
                        sink.postings_pool
                            .write_vint(sink.source, &mut freq, p.last_doc_code);
                        sink.postings_pool.write_vint(sink.source, &mut freq, p.doc_freq);
                    }
                    p.freq = freq;
                    p.doc_freq = 1;
                    p.last_doc_code = (doc_id - p.last_doc_id) << 1;
                    p.last_doc_id = doc_id;
                    (id, self.position, true)
                } else {
                    p.doc_freq += 1;
                    (id, self.position - p.last_position, p.vector.is_none())
                }
            }
            Probe::Vacant(slot) => {
                if *sink.posting_quota == 0 {
                    sink.source.reserve_postings(POSTINGS_BATCH);
                    *sink.posting_quota = POSTINGS_BATCH;
                }
                if text.len() > MAX_TERM_LENGTH {
                    if sink.max_term_prefix.is_none() {
                        let prefix = &text[..MAX_TERM_PREFIX_LEN.min(text.len())];
                        *sink.max_term_prefix = Some(String::from_utf16_lossy(prefix));
                    }
                    self.position += 1;
                    return false;
                }
                let Some(text_start) = sink.chars.intern(sink.source, text) else {
                    self.position += 1;
                    return false;
                };
                *sink.posting_quota -= 1;
                let freq = sink.postings_pool.new_stream(sink.source);
                let prox = sink.postings_pool.new_stream(sink.source);
                let id = self.postings.len() as u32;
                self.postings.push(Posting {
                    text_start,
                    doc_freq: 1,
                    last_doc_id: doc_id,
                    last_doc_code: doc_id << 1,
                    last_position: 0,
                    freq,
                    prox,
                    vector: None,
                });
                self.table.insert(slot, id, &self.postings, sink.chars);
                (id, self.position, true)
            }
        };

        let p = &mut self.postings[id as usize];
        let mut prox = p.prox;
        match payload {
            Some(payload) if !payload.is_empty() => {
                sink.postings_pool
                    .write_vint(sink.source, &mut prox, (prox_code << 1) | 1);
                sink.postings_pool
                    .write_vint(sink.source, &mut prox, payload.len() as u32);
                sink.postings_pool.write_bytes(sink.source, &mut prox, payload);
                self.store_payloads = true;
            }
            _ => sink
                .postings_pool
                .write_vint(sink.source, &mut prox, prox_code << 1),
        }
        p.prox = prox;
        p.last_position = self.position;
        self.position += 1;

        if !self.do_vectors {
            return true;
        }
        let vector_index = match (new_vector, p.vector) {
            (false, Some(index)) => index,
            _ => {
                let index = sink.vectors.len() as u32;
                let positions = self
                    .do_vector_positions
                    .then(|| sink.vectors_pool.new_stream(sink.source));
                let offsets = self
                    .do_vector_offsets
                    .then(|| sink.vectors_pool.new_stream(sink.source));
                sink.vectors.push(PostingVector {
                    posting: id,
                    last_offset: 0,
                    positions,
                    offsets,
                });
                p.vector = Some(index);
                index
            }
        };
        let vector = &mut sink.vectors[vector_index as usize];
        if let Some(positions) = vector.positions.as_mut() {
            sink.vectors_pool.write_vint(sink.source, positions, prox_code);
        }
        if let Some(offsets) = vector.offsets.as_mut() {
            let start = self.offset.wrapping_add(start);
            let end = self.offset.wrapping_add(end);
            // a new vector has last_offset 0, so its first start is absolute
            sink.vectors_pool
                .write_vint(sink.source, offsets, start.wrapping_sub(vector.last_offset));
            sink.vectors_pool
                .write_vint(sink.source, offsets, end.wrapping_sub(start));
            vector.last_offset = end;
        }
        true
    }

    /// Writes the term vectors of the field for the current document to `out` and
    /// detaches the vector entries from their postings.
    pub fn write_vectors(
        &mut self,
        chars: &CharPool,
        vectors_pool: &ByteSlicePool,
        vectors: &mut [PostingVector],
        out: &mut RamOutput,
    ) -> std::io::Result<()> {
        let postings = &self.postings;
        vectors.sort_unstable_by(|a, b| {
            let a = chars.text(postings[a.posting as usize].text_start);
            let b = chars.text(postings[b.posting as usize].text_start);
            a.cmp(b)
        });

        out.write_vint(vectors.len() as u32)?;
        let mut bits = 0u8;
        if self.do_vector_positions {
            bits |= VECTOR_POSITIONS;
        }
        if self.do_vector_offsets {
            bits |= VECTOR_OFFSETS;
        }
        out.write_byte(bits)?;

        let mut last: &[u16] = &[];
        for vector in vectors.iter() {
            let posting = &postings[vector.posting as usize];
            let text = chars.text(posting.text_start);
            let prefix = common_prefix(last, text);
            out.write_vint(prefix as u32)?;
            out.write_vint((text.len() - prefix) as u32)?;
            out.write_chars(&text[prefix..])?;
            out.write_vint(posting.doc_freq)?;
            if let Some(positions) = &vector.positions {
                vectors_pool.reader(positions).write_to(out)?;
            }
            if let Some(offsets) = &vector.offsets {
                vectors_pool.reader(offsets).write_to(out)?;
            }
            last = text;
        }
        Ok(())
    }

    /// Clears the vector references left on postings by the current document.
    pub fn detach_vectors(&mut self, vectors: &[PostingVector]) {
        for vector in vectors {
            self.postings[vector.posting as usize].vector = None;
        }
    }

    /// Prepares a field that survived a flush: marks it unseen, and shrinks its
    /// table if it ended up mostly empty. Returns `false` if the field did not occur
    /// since the previous flush and should be dropped.
    pub fn trim(&mut self, chars: &CharPool) -> bool {
        if self.last_gen == -1 {
            return false;
        }
        self.last_gen = -1;
        self.table.shrink(&self.postings, chars);
        true
    }
}

/// Length of the common prefix of two terms.
pub(crate) fn common_prefix(a: &[u16], b: &[u16]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use quill_io::DataInput;

    use super::*;
    use crate::write::{blocks::testing::LocalBlocks, char_pool::encode_term};

    struct Buffers {
        blocks: LocalBlocks,
        postings_pool: ByteSlicePool,
        vectors_pool: ByteSlicePool,
        chars: CharPool,
        vectors: Vec<PostingVector>,
        quota: usize,
        prefix: Option<String>,
    }

    impl Buffers {
        fn new() -> Buffers {
            Buffers {
                blocks: LocalBlocks::default(),
                postings_pool: ByteSlicePool::new(true),
                vectors_pool: ByteSlicePool::new(false),
                chars: CharPool::new(),
                vectors: Vec::new(),
                quota: 0,
                prefix: None,
            }
        }

        fn sink(&mut self, doc_id: u32) -> TermSink<'_> {
            TermSink {
                source: &self.blocks,
                postings_pool: &mut self.postings_pool,
                vectors_pool: &mut self.vectors_pool,
                chars: &mut self.chars,
                vectors: &mut self.vectors,
                posting_quota: &mut self.quota,
                doc_id,
                max_term_prefix: &mut self.prefix,
            }
        }
    }

    fn add(field: &mut FieldData, buffers: &mut Buffers, doc_id: u32, term: &str) {
        let mut text = Vec::new();
        encode_term(term, &mut text);
        field.add_position(&mut buffers.sink(doc_id), &text, 0, term.len() as u32, None);
    }

    #[test]
    fn test_freq_stream_lags_one_document() {
        let mut buffers = Buffers::new();
        let mut field = FieldData::new("body", 0);

        field.start_inversion(1.0);
        add(&mut field, &mut buffers, 0, "a");
        add(&mut field, &mut buffers, 0, "a");
        add(&mut field, &mut buffers, 0, "b");
        field.start_inversion(1.0);
        add(&mut field, &mut buffers, 3, "a");

        assert_eq!(field.postings.len(), 2);
        assert_eq!(buffers.quota, POSTINGS_BATCH - 2);
        let a = field.postings[0];
        // doc 0 with freq 2 was written when doc 3 arrived
        let mut freq = buffers.postings_pool.reader(&a.freq);
        assert_eq!(freq.read_vint().unwrap(), 0);
        assert_eq!(freq.read_vint().unwrap(), 2);
        assert!(freq.is_eof());
        assert_eq!((a.last_doc_id, a.last_doc_code, a.doc_freq), (3, 6, 1));

        // positions 0, 1 in doc 0 and 0 in doc 3, shifted for the payload bit
        let mut prox = buffers.postings_pool.reader(&a.prox);
        assert_eq!(prox.read_vint().unwrap(), 0);
        assert_eq!(prox.read_vint().unwrap(), 2);
        assert_eq!(prox.read_vint().unwrap(), 0);
        assert!(prox.is_eof());

        let b = field.postings[1];
        assert!(buffers.postings_pool.reader(&b.freq).is_eof());
        assert_eq!(b.last_doc_code, 0);
    }

    #[test]
    fn test_payload_sets_flag() {
        let mut buffers = Buffers::new();
        let mut field = FieldData::new("body", 0);
        field.start_inversion(1.0);
        let text: Vec<u16> = "x".encode_utf16().collect();
        field.add_position(&mut buffers.sink(0), &text, 0, 1, Some(&[1, 2]));
        field.add_position(&mut buffers.sink(0), &text, 2, 3, Some(&[]));
        assert!(field.store_payloads);

        let mut prox = buffers.postings_pool.reader(&field.postings[0].prox);
        assert_eq!(prox.read_vint().unwrap(), 1);
        assert_eq!(prox.read_vint().unwrap(), 2);
        let mut payload = [0u8; 2];
        prox.read_bytes(&mut payload).unwrap();
        assert_eq!(payload, [1, 2]);
        assert_eq!(prox.read_vint().unwrap(), 2);
    }

    #[test]
    fn test_oversized_term_is_skipped() {
        let mut buffers = Buffers::new();
        let mut field = FieldData::new("body", 0);
        field.start_inversion(1.0);
        let huge = vec![b'z' as u16; MAX_TERM_LENGTH + 1];
        assert!(!field.add_position(&mut buffers.sink(0), &huge, 0, 1, None));
        add(&mut field, &mut buffers, 0, "ok");
        assert_eq!(field.postings.len(), 1);
        assert_eq!(field.position, 2);
        assert_eq!(field.postings[0].last_position, 1);
        assert_eq!(buffers.prefix.as_deref(), Some("z".repeat(30).as_str()));
    }

    #[test]
    fn test_vectors_with_positions_and_offsets() {
        let mut buffers = Buffers::new();
        let mut field = FieldData::new("body", 0);
        field.do_vectors = true;
        field.do_vector_positions = true;
        field.do_vector_offsets = true;
        field.start_inversion(1.0);
        for (term, start) in [("b", 0u32), ("a", 2), ("b", 4)] {
            let text: Vec<u16> = term.encode_utf16().collect();
            field.add_position(&mut buffers.sink(0), &text, start, start + 1, None);
        }
        assert_eq!(buffers.vectors.len(), 2);

        let mut out = RamOutput::new();
        let mut vectors = std::mem::take(&mut buffers.vectors);
        field
            .write_vectors(&buffers.chars, &buffers.vectors_pool, &mut vectors, &mut out)
            .unwrap();
        field.detach_vectors(&vectors);
        assert!(field.postings.iter().all(|p| p.vector.is_none()));

        assert_eq!(
            out.as_bytes(),
            [
                2, 0x3, // two terms, positions and offsets
                0, 1, b'a', 1, 1, 2, 1, // "a": freq 1, position 1, offsets 2..3
                0, 1, b'b', 2, 0, 2, 0, 1, 3, 1, // "b": positions 0, +2, offsets 0..1, +3..5
            ]
        );
    }

    #[test]
    fn test_trim() {
        let buffers = Buffers::new();
        let mut field = FieldData::new("body", 0);
        assert!(!field.trim(&buffers.chars));
        field.start_doc(4);
        assert!(field.trim(&buffers.chars));
        assert_eq!(field.last_gen, -1);
    }
}
