//! Term dictionary entries and the constants of the term dictionary format.

/// Version of the `.tis`/`.tii` format.
pub const TERM_INFOS_FORMAT: i32 = -3;

/// Bytes of the `.tis`/`.tii` header: format, term count, index interval, skip
/// interval and maximum skip levels.
pub const TERM_INFOS_HEADER_LEN: u64 = 4 + 8 + 4 + 4 + 4;

/// Field number of the leading entry of the term index, which stands before every
/// real term.
pub const SENTINEL_FIELD: u32 = u32::MAX;

/// Where the postings of one term live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermInfo {
    /// Number of documents containing the term.
    pub doc_freq: u32,
    pub freq_pointer: u64,
    pub prox_pointer: u64,
    /// Offset of the skip data from `freq_pointer`; only meaningful when `doc_freq`
    /// reaches the skip interval.
    pub skip_offset: u32,
}
