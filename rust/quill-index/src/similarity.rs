//! Length normalization and the one-byte norm encoding.

/// Norm byte of a document that never saw the field: the encoding of `1.0`.
pub const DEFAULT_NORM: u8 = 124;

/// Computes the length factor folded into each document's norm.
pub trait Similarity: Send + Sync + std::fmt::Debug {
    /// Normalization factor for a field instance holding `num_terms` indexed terms.
    fn length_norm(&self, field: &str, num_terms: u32) -> f32;
}

/// `1 / sqrt(num_terms)`. A field with no terms gets an infinite factor, which
/// encodes to the largest norm byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSimilarity;

impl Similarity for DefaultSimilarity {
    fn length_norm(&self, _field: &str, num_terms: u32) -> f32 {
        1.0 / (num_terms as f32).sqrt()
    }
}

const MANTISSA_BITS: u32 = 3;
const ZERO_EXPONENT: i32 = 15;
const ZERO_POINT: i32 = (63 - ZERO_EXPONENT) << MANTISSA_BITS;

/// Encodes a norm into one byte: 3 mantissa bits and 5 exponent bits, with the
/// exponent biased so that values from about `5.8e-10` to `7.5e9` are covered.
/// Negative values and zero encode to `0`; values too small to represent but
/// positive encode to `1`; values too large saturate at `255`.
pub fn encode_norm(f: f32) -> u8 {
    let bits = f.to_bits() as i32;
    let small = bits >> (24 - MANTISSA_BITS);
    if small < ZERO_POINT {
        return if bits <= 0 { 0 } else { 1 };
    }
    if small >= ZERO_POINT + 0x100 {
        return 255;
    }
    (small - ZERO_POINT) as u8
}

pub fn decode_norm(b: u8) -> f32 {
    if b == 0 {
        return 0.0;
    }
    let bits = ((b as u32) << (24 - MANTISSA_BITS)) + (((63 - ZERO_EXPONENT) as u32) << 24);
    f32::from_bits(bits)
}
