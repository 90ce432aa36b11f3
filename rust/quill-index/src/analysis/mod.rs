//! Analysis: turning field values into term occurrences.
//!
//! Two paths feed the indexer:
//!
//! 1. **Tokenizers** split a text field value into [`TokenSpan`]s. They borrow from the
//!    input and only allocate when a term has to be rewritten (lower-cased).
//! 2. **Token sources** ([`TokenSource`]) hand over already analyzed [`Token`]s, with
//!    explicit position increments, offsets and payloads. A source may fail; such a
//!    failure rejects the document being indexed, not the writer.

pub mod trivial;
pub mod unicode_word;

use std::borrow::Cow;

use quill_common::{Result, error::Error, error::StdErrorBoxed};
pub use trivial::TrivialTokenizer;
pub use unicode_word::UnicodeWordTokenizer;

/// Default minimum length of a single term in bytes.
pub const DEFAULT_MIN_TERM_LENGTH: usize = 1;

/// One term produced by a [`Tokenizer`], with the byte range it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpan<'a> {
    pub text: Cow<'a, str>,
    pub start: usize,
    pub end: usize,
}

/// A tokenizer extracts terms from raw string values for indexing.
///
/// Offsets of the returned spans are byte offsets into the input.
pub trait Tokenizer: Send + Sync {
    /// The iterator type returned by tokenize.
    type TokenIter<'a>: Iterator<Item = TokenSpan<'a>>
    where
        Self: 'a;

    /// Extract terms from the input string.
    fn tokenize<'a>(&'a self, input: &'a str) -> Self::TokenIter<'a>;

    /// Get the kind of the tokenizer.
    fn kind(&self) -> TokenizerKind;

    /// Get the name of the tokenizer kind as a static string.
    fn name(&self) -> &'static str {
        self.kind().name()
    }
}

/// A pre-analyzed term occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    /// Distance from the previous token's position; 1 for adjacent tokens.
    pub position_increment: u32,
    pub start_offset: u32,
    pub end_offset: u32,
    pub payload: Option<Vec<u8>>,
}

impl Token {
    pub fn new(text: impl Into<String>, start_offset: u32, end_offset: u32) -> Token {
        Token {
            text: text.into(),
            position_increment: 1,
            start_offset,
            end_offset,
            payload: None,
        }
    }

    pub fn with_position_increment(mut self, increment: u32) -> Token {
        self.position_increment = increment;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Token {
        self.payload = Some(payload.into());
        self
    }
}

/// A stream of pre-analyzed tokens for one field instance.
pub trait TokenSource: Send {
    /// Returns the next token, `Ok(None)` at the end of the stream.
    fn next_token(&mut self) -> std::result::Result<Option<Token>, StdErrorBoxed>;
}

/// A [`TokenSource`] over tokens that were analyzed up front.
#[derive(Debug, Clone, Default)]
pub struct PreAnalyzed {
    tokens: std::vec::IntoIter<Token>,
}

impl PreAnalyzed {
    pub fn new(tokens: Vec<Token>) -> PreAnalyzed {
        PreAnalyzed {
            tokens: tokens.into_iter(),
        }
    }
}

impl From<Vec<Token>> for PreAnalyzed {
    fn from(tokens: Vec<Token>) -> Self {
        PreAnalyzed::new(tokens)
    }
}

impl TokenSource for PreAnalyzed {
    fn next_token(&mut self) -> std::result::Result<Option<Token>, StdErrorBoxed> {
        Ok(self.tokens.next())
    }
}

/// Creates a tokenizer instance based on the provided name string.
///
/// # Arguments
/// * `name` - The name of the tokenizer to create (case-sensitive)
///
/// # Errors
/// Returns an [`Error::invalid_arg`] if the provided tokenizer name is not recognized.
pub fn create_tokenizer(name: &str) -> Result<TokenizerType> {
    match name.try_into()? {
        TokenizerKind::Trivial => Ok(TokenizerType::Trivial(TrivialTokenizer::new())),
        TokenizerKind::UnicodeWord => Ok(TokenizerType::UnicodeWord(UnicodeWordTokenizer::new())),
    }
}

/// Enum representing the different tokenizer kinds available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    /// Returns the whole input as a single term.
    Trivial,
    /// Splits input into lower-cased terms on Unicode word boundaries.
    UnicodeWord,
}

impl TryFrom<&str> for TokenizerKind {
    type Error = Error;

    fn try_from(name: &str) -> Result<Self> {
        match name {
            "trivial" => Ok(TokenizerKind::Trivial),
            "unicode-word" => Ok(TokenizerKind::UnicodeWord),
            _ => Err(Error::invalid_arg(
                "name",
                format!("Unrecognized tokenizer: {name}"),
            )),
        }
    }
}

impl TokenizerKind {
    pub const fn name(&self) -> &'static str {
        match self {
            TokenizerKind::Trivial => "trivial",
            TokenizerKind::UnicodeWord => "unicode-word",
        }
    }
}

/// Enum that holds all available tokenizer types.
/// This allows for dynamic dispatch while maintaining the iterator-based API.
pub enum TokenizerType {
    Trivial(TrivialTokenizer),
    UnicodeWord(UnicodeWordTokenizer),
}

impl Tokenizer for TokenizerType {
    type TokenIter<'a> = Box<dyn Iterator<Item = TokenSpan<'a>> + 'a>;

    fn tokenize<'a>(&'a self, input: &'a str) -> Self::TokenIter<'a> {
        match self {
            TokenizerType::Trivial(tokenizer) => Box::new(tokenizer.tokenize(input)),
            TokenizerType::UnicodeWord(tokenizer) => Box::new(tokenizer.tokenize(input)),
        }
    }

    fn kind(&self) -> TokenizerKind {
        match self {
            TokenizerType::Trivial(tokenizer) => tokenizer.kind(),
            TokenizerType::UnicodeWord(tokenizer) => tokenizer.kind(),
        }
    }
}

impl std::fmt::Debug for TokenizerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TokenizerType").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tokenizer() {
        assert!(create_tokenizer("unicode-word").is_ok());
        assert!(create_tokenizer("trivial").is_ok());
        assert!(create_tokenizer("unknown").is_err());

        assert_eq!(
            create_tokenizer("unicode-word").unwrap().name(),
            "unicode-word"
        );
        assert_eq!(create_tokenizer("trivial").unwrap().name(), "trivial");
    }

    #[test]
    fn test_dispatch_keeps_offsets() {
        let tokenizer = create_tokenizer("unicode-word").unwrap();
        let spans: Vec<_> = tokenizer.tokenize("Quick fox").collect();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "quick");
        assert_eq!((spans[1].start, spans[1].end), (6, 9));
    }

    #[test]
    fn test_pre_analyzed_source() {
        let mut source = PreAnalyzed::new(vec![
            Token::new("a", 0, 1),
            Token::new("b", 2, 3)
                .with_position_increment(0)
                .with_payload(vec![7]),
        ]);
        assert_eq!(source.next_token().unwrap().unwrap().text, "a");
        let b = source.next_token().unwrap().unwrap();
        assert_eq!(b.position_increment, 0);
        assert_eq!(b.payload.as_deref(), Some(&[7u8][..]));
        assert!(source.next_token().unwrap().is_none());
    }
}
