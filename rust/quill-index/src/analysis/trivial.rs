//! Trivial Tokenizer - returns the input unchanged.

use std::{borrow::Cow, iter};

use super::{DEFAULT_MIN_TERM_LENGTH, TokenSpan, Tokenizer, TokenizerKind};

/// Trivial Tokenizer - returns the whole value as one term.
///
/// If the input is shorter than the minimum length or empty, no token is returned.
/// Useful for identifier-like values indexed through a tokenized field.
pub struct TrivialTokenizer {
    min_term_length: usize,
}

impl TrivialTokenizer {
    /// Create a new TrivialTokenizer with a custom minimum term length.
    pub fn with_min_length(min_term_length: usize) -> Self {
        Self { min_term_length }
    }

    /// Create a new TrivialTokenizer with default settings.
    pub fn new() -> Self {
        Self {
            min_term_length: DEFAULT_MIN_TERM_LENGTH,
        }
    }
}

impl Default for TrivialTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for TrivialTokenizer {
    type TokenIter<'a> = iter::Take<iter::Once<TokenSpan<'a>>>;

    fn tokenize<'a>(&'a self, input: &'a str) -> Self::TokenIter<'a> {
        let span = TokenSpan {
            text: Cow::Borrowed(input),
            start: 0,
            end: input.len(),
        };
        let count = usize::from(!input.is_empty() && input.len() >= self.min_term_length);
        iter::once(span).take(count)
    }

    fn kind(&self) -> TokenizerKind {
        TokenizerKind::Trivial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trivial_tokenizer() {
        let tokenizer = TrivialTokenizer::new();

        let spans: Vec<_> = tokenizer.tokenize("guid-12345-ABCDEF").collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "guid-12345-ABCDEF");
        assert_eq!((spans[0].start, spans[0].end), (0, 17));

        assert_eq!(tokenizer.tokenize("").count(), 0);
    }

    #[test]
    fn test_min_length() {
        let tokenizer = TrivialTokenizer::with_min_length(4);
        assert_eq!(tokenizer.tokenize("abc").count(), 0);
        assert_eq!(tokenizer.tokenize("abcd").count(), 1);
    }
}
