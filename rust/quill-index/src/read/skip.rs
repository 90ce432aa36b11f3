//! Reader of the multi-level skip lists trailing each term's document list.

use quill_io::IndexInput;

use crate::write::num_skip_levels;

/// Skip state of one term. Levels are loaded lazily on the first `skip_to`.
pub(crate) struct SkipListReader {
    /// Documents covered by one entry of each level.
    intervals: Vec<u64>,
    max_levels: usize,
    num_levels: usize,
    base: Box<dyn IndexInput>,
    streams: Vec<Option<Box<dyn IndexInput>>>,
    skip_pointer: Vec<u64>,
    num_skipped: Vec<u64>,
    skip_doc: Vec<u32>,
    child_pointer: Vec<u64>,
    freq_pointer: Vec<u64>,
    prox_pointer: Vec<u64>,
    payload_length: Vec<u32>,
    doc_count: u32,
    store_payloads: bool,
    loaded: bool,

    last_doc: u32,
    last_child_pointer: u64,
    last_freq_pointer: u64,
    last_prox_pointer: u64,
    last_payload_length: u32,
}

impl SkipListReader {
    pub fn new(freq: Box<dyn IndexInput>, interval: u32, max_levels: u32) -> SkipListReader {
        let max_levels = max_levels as usize;
        let mut intervals = Vec::with_capacity(max_levels);
        let mut span = interval as u64;
        for _ in 0..max_levels {
            intervals.push(span);
            span = span.saturating_mul(interval as u64);
        }
        SkipListReader {
            intervals,
            max_levels,
            num_levels: 0,
            base: freq,
            streams: (0..max_levels).map(|_| None).collect(),
            skip_pointer: vec![0; max_levels],
            num_skipped: vec![0; max_levels],
            skip_doc: vec![0; max_levels],
            child_pointer: vec![0; max_levels],
            freq_pointer: vec![0; max_levels],
            prox_pointer: vec![0; max_levels],
            payload_length: vec![0; max_levels],
            doc_count: 0,
            store_payloads: false,
            loaded: false,
            last_doc: 0,
            last_child_pointer: 0,
            last_freq_pointer: 0,
            last_prox_pointer: 0,
            last_payload_length: 0,
        }
    }

    /// Prepares for a term whose skip data starts at `skip_pointer` in `.frq`.
    pub fn init(
        &mut self,
        skip_pointer: u64,
        freq_base: u64,
        prox_base: u64,
        doc_count: u32,
        store_payloads: bool,
    ) {
        self.skip_pointer[0] = skip_pointer;
        self.doc_count = doc_count;
        self.store_payloads = store_payloads;
        self.skip_doc.fill(0);
        self.num_skipped.fill(0);
        self.child_pointer.fill(0);
        self.freq_pointer.fill(freq_base);
        self.prox_pointer.fill(prox_base);
        self.payload_length.fill(0);
        self.last_doc = 0;
        self.last_child_pointer = 0;
        self.last_freq_pointer = freq_base;
        self.last_prox_pointer = prox_base;
        self.last_payload_length = 0;
        self.loaded = false;
        for stream in &mut self.streams {
            *stream = None;
        }
    }

    /// Advances to the last skip entry before `target`. Returns the number of
    /// documents preceding the entry's file pointers, or `None` when no entry
    /// was passed.
    pub fn skip_to(&mut self, target: u32) -> std::io::Result<Option<u32>> {
        if !self.loaded {
            self.load_levels()?;
            self.loaded = true;
            if self.num_levels == 0 {
                return Ok(None);
            }
        }

        let mut level = 0;
        while level + 1 < self.num_levels && target > self.skip_doc[level + 1] {
            level += 1;
        }
        loop {
            if target > self.skip_doc[level] {
                self.load_next_skip(level)?;
                continue;
            }
            if level > 0 && self.last_child_pointer > self.stream_pointer(level - 1) {
                self.seek_child(level - 1)?;
            }
            if level == 0 {
                break;
            }
            level -= 1;
        }
        let skipped = self.num_skipped[0].checked_sub(self.intervals[0] + 1);
        Ok(skipped.map(|count| count as u32))
    }

    fn stream_pointer(&self, level: usize) -> u64 {
        self.streams[level]
            .as_ref()
            .map_or(0, |stream| stream.file_pointer())
    }

    fn load_levels(&mut self) -> std::io::Result<()> {
        self.num_levels = num_skip_levels(
            self.doc_count,
            self.intervals[0] as u32,
            self.max_levels as u32,
        ) as usize;
        let mut stream = self.base.clone_input();
        stream.seek(self.skip_pointer[0])?;
        for level in (1..self.num_levels).rev() {
            let length = stream.read_vlong()?;
            self.skip_pointer[level] = stream.file_pointer();
            self.streams[level] = Some(stream.clone_input());
            stream.seek(stream.file_pointer() + length)?;
        }
        self.skip_pointer[0] = stream.file_pointer();
        self.streams[0] = Some(stream);
        Ok(())
    }

    /// Reads the next entry of `level`; `false` once the level is exhausted.
    fn load_next_skip(&mut self, level: usize) -> std::io::Result<bool> {
        self.set_last_skip_data(level);
        self.num_skipped[level] += self.intervals[level];
        if self.num_skipped[level] > self.doc_count as u64 {
            self.skip_doc[level] = u32::MAX;
            if self.num_levels > level {
                self.num_levels = level;
            }
            return Ok(false);
        }
        let Some(stream) = self.streams[level].as_mut() else {
            return Ok(false);
        };
        let delta = if self.store_payloads {
            let code = stream.read_vint()?;
            if code & 1 != 0 {
                self.payload_length[level] = stream.read_vint()?;
            }
            code >> 1
        } else {
            stream.read_vint()?
        };
        self.freq_pointer[level] += stream.read_vint()? as u64;
        self.prox_pointer[level] += stream.read_vint()? as u64;
        self.skip_doc[level] += delta;
        if level != 0 {
            self.child_pointer[level] = stream.read_vlong()? + self.skip_pointer[level - 1];
        }
        Ok(true)
    }

    fn seek_child(&mut self, level: usize) -> std::io::Result<()> {
        let Some(stream) = self.streams[level].as_mut() else {
            return Ok(());
        };
        stream.seek(self.last_child_pointer)?;
        self.num_skipped[level] = self.num_skipped[level + 1] - self.intervals[level + 1];
        self.skip_doc[level] = self.last_doc;
        if level > 0 {
            self.child_pointer[level] = stream.read_vlong()? + self.skip_pointer[level - 1];
        }
        self.freq_pointer[level] = self.last_freq_pointer;
        self.prox_pointer[level] = self.last_prox_pointer;
        self.payload_length[level] = self.last_payload_length;
        Ok(())
    }

    fn set_last_skip_data(&mut self, level: usize) {
        self.last_doc = self.skip_doc[level];
        self.last_child_pointer = self.child_pointer[level];
        self.last_freq_pointer = self.freq_pointer[level];
        self.last_prox_pointer = self.prox_pointer[level];
        self.last_payload_length = self.payload_length[level];
    }

    /// Document of the entry skipped to.
    pub fn doc(&self) -> u32 {
        self.last_doc
    }

    pub fn freq_pointer(&self) -> u64 {
        self.last_freq_pointer
    }

    pub fn prox_pointer(&self) -> u64 {
        self.last_prox_pointer
    }

    pub fn payload_length(&self) -> u32 {
        self.last_payload_length
    }
}
