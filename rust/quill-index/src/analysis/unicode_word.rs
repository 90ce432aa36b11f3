//! Unicode Word Tokenizer - splits text on Unicode word boundaries.

use std::borrow::Cow;

use unicode_segmentation::{UnicodeSegmentation, UnicodeWordIndices};

use super::{DEFAULT_MIN_TERM_LENGTH, TokenSpan, Tokenizer, TokenizerKind};

/// Word Tokenizer - extracts words as defined by the Unicode word boundary rules
/// (UAX #29), skipping punctuation and whitespace runs.
///
/// Words are lower-cased by default. Words shorter than the minimum length are
/// excluded entirely.
pub struct UnicodeWordTokenizer {
    min_term_length: usize,
    lowercase: bool,
}

impl UnicodeWordTokenizer {
    /// Create a new UnicodeWordTokenizer with default settings.
    pub fn new() -> Self {
        Self {
            min_term_length: DEFAULT_MIN_TERM_LENGTH,
            lowercase: true,
        }
    }

    pub fn with_min_length(mut self, min_term_length: usize) -> Self {
        self.min_term_length = min_term_length;
        self
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }
}

impl Default for UnicodeWordTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator that yields word tokens from a string input.
pub struct WordTokenIterator<'a> {
    words: UnicodeWordIndices<'a>,
    min_term_length: usize,
    lowercase: bool,
}

impl<'a> Iterator for WordTokenIterator<'a> {
    type Item = TokenSpan<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for (start, word) in self.words.by_ref() {
            if word.len() < self.min_term_length {
                continue;
            }
            let text = if self.lowercase && word.chars().any(char::is_uppercase) {
                Cow::Owned(word.to_lowercase())
            } else {
                Cow::Borrowed(word)
            };
            return Some(TokenSpan {
                text,
                start,
                end: start + word.len(),
            });
        }
        None
    }
}

impl Tokenizer for UnicodeWordTokenizer {
    type TokenIter<'a> = WordTokenIterator<'a>;

    fn tokenize<'a>(&'a self, input: &'a str) -> Self::TokenIter<'a> {
        WordTokenIterator {
            words: input.unicode_word_indices(),
            min_term_length: self.min_term_length,
            lowercase: self.lowercase,
        }
    }

    fn kind(&self) -> TokenizerKind {
        TokenizerKind::UnicodeWord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(tokenizer: &UnicodeWordTokenizer, input: &str) -> Vec<String> {
        tokenizer
            .tokenize(input)
            .map(|span| span.text.into_owned())
            .collect()
    }

    #[test]
    fn test_basic_words() {
        let tokenizer = UnicodeWordTokenizer::new();
        assert_eq!(
            terms(&tokenizer, "Hello, world! This is a test."),
            ["hello", "world", "this", "is", "a", "test"]
        );
        assert!(terms(&tokenizer, "  ,;  ").is_empty());
    }

    #[test]
    fn test_offsets_are_byte_ranges() {
        let tokenizer = UnicodeWordTokenizer::new();
        let input = "naïve café";
        let spans: Vec<_> = tokenizer.tokenize(input).collect();
        assert_eq!(spans.len(), 2);
        for span in &spans {
            assert_eq!(&input[span.start..span.end], span.text);
        }
    }

    #[test]
    fn test_lowercase_only_when_needed() {
        let tokenizer = UnicodeWordTokenizer::new();
        let spans: Vec<_> = tokenizer.tokenize("plain Mixed").collect();
        assert!(matches!(spans[0].text, Cow::Borrowed(_)));
        assert!(matches!(spans[1].text, Cow::Owned(_)));

        let keep_case = UnicodeWordTokenizer::new().with_lowercase(false);
        assert_eq!(terms(&keep_case, "Mixed Case"), ["Mixed", "Case"]);
    }

    #[test]
    fn test_min_length_filter() {
        let tokenizer = UnicodeWordTokenizer::new().with_min_length(3);
        assert_eq!(terms(&tokenizer, "a an the fox"), ["the", "fox"]);
    }

    #[test]
    fn test_non_latin_scripts() {
        let tokenizer = UnicodeWordTokenizer::new();
        assert_eq!(terms(&tokenizer, "Привет мир"), ["привет", "мир"]);
    }
}
