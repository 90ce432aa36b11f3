//! Documents as handed to the index writer: an ordered list of named fields.

use quill_common::{Result, error::Error};

use crate::analysis::TokenSource;

/// A `(field, text)` pair identifying one term of the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Term {
    pub field: String,
    pub text: String,
}

impl Term {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Term {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

/// What a field records in the term vectors of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TermVectorOptions {
    #[default]
    No,
    Yes,
    WithPositions,
    WithOffsets,
    WithPositionsOffsets,
}

impl TermVectorOptions {
    pub fn is_stored(self) -> bool {
        self != TermVectorOptions::No
    }

    pub fn with_positions(self) -> bool {
        matches!(
            self,
            TermVectorOptions::WithPositions | TermVectorOptions::WithPositionsOffsets
        )
    }

    pub fn with_offsets(self) -> bool {
        matches!(
            self,
            TermVectorOptions::WithOffsets | TermVectorOptions::WithPositionsOffsets
        )
    }
}

pub enum FieldValue {
    Text(String),
    /// Pre-analyzed tokens; only valid for indexed, tokenized, unstored fields.
    Tokens(Box<dyn TokenSource>),
}

impl std::fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(text) => f.debug_tuple("Text").field(text).finish(),
            FieldValue::Tokens(_) => f.write_str("Tokens(..)"),
        }
    }
}

/// One named value of a document.
#[derive(Debug)]
pub struct Field {
    name: String,
    value: FieldValue,
    stored: bool,
    indexed: bool,
    tokenized: bool,
    term_vector: TermVectorOptions,
    omit_norms: bool,
    boost: f32,
}

impl Field {
    fn with_flags(
        name: impl Into<String>,
        value: FieldValue,
        stored: bool,
        indexed: bool,
        tokenized: bool,
    ) -> Field {
        Field {
            name: name.into(),
            value,
            stored,
            indexed,
            tokenized,
            term_vector: TermVectorOptions::No,
            omit_norms: false,
            boost: 1.0,
        }
    }

    /// Stored, indexed and tokenized.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Field {
        Field::with_flags(name, FieldValue::Text(value.into()), true, true, true)
    }

    /// Stored and indexed as a single term.
    pub fn keyword(name: impl Into<String>, value: impl Into<String>) -> Field {
        Field::with_flags(name, FieldValue::Text(value.into()), true, true, false)
    }

    /// Stored only.
    pub fn stored(name: impl Into<String>, value: impl Into<String>) -> Field {
        Field::with_flags(name, FieldValue::Text(value.into()), true, false, false)
    }

    /// Indexed and tokenized, not stored.
    pub fn unstored(name: impl Into<String>, value: impl Into<String>) -> Field {
        Field::with_flags(name, FieldValue::Text(value.into()), false, true, true)
    }

    /// Indexed from pre-analyzed tokens.
    pub fn tokens(name: impl Into<String>, source: impl TokenSource + 'static) -> Field {
        Field::with_flags(name, FieldValue::Tokens(Box::new(source)), false, true, true)
    }

    pub fn with_term_vector(mut self, options: TermVectorOptions) -> Field {
        self.term_vector = options;
        self
    }

    pub fn with_omit_norms(mut self, omit_norms: bool) -> Field {
        self.omit_norms = omit_norms;
        self
    }

    pub fn with_boost(mut self, boost: f32) -> Field {
        self.boost = boost;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub(crate) fn value_mut(&mut self) -> &mut FieldValue {
        &mut self.value
    }

    /// The text value, `None` for pre-analyzed fields.
    pub fn text_value(&self) -> Option<&str> {
        match &self.value {
            FieldValue::Text(text) => Some(text),
            FieldValue::Tokens(_) => None,
        }
    }

    pub fn is_stored(&self) -> bool {
        self.stored
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn is_tokenized(&self) -> bool {
        self.tokenized
    }

    pub fn term_vector(&self) -> TermVectorOptions {
        self.term_vector
    }

    pub fn omit_norms(&self) -> bool {
        self.omit_norms
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_arg("field", "field name must not be empty"));
        }
        if !self.stored && !self.indexed {
            return Err(Error::invalid_arg(
                &self.name,
                "a field must be stored, indexed or both",
            ));
        }
        if self.term_vector.is_stored() && !self.indexed {
            return Err(Error::invalid_arg(
                &self.name,
                "term vectors require an indexed field",
            ));
        }
        if let FieldValue::Tokens(_) = self.value {
            if self.stored || !self.tokenized {
                return Err(Error::invalid_arg(
                    &self.name,
                    "pre-analyzed values can only be indexed, tokenized and unstored",
                ));
            }
        }
        Ok(())
    }
}

/// A document: a boost and an ordered list of fields. A field name may occur
/// several times.
#[derive(Debug)]
pub struct Document {
    fields: Vec<Field>,
    boost: f32,
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Document {
    pub fn new() -> Document {
        Document {
            fields: Vec::new(),
            boost: 1.0,
        }
    }

    pub fn add(&mut self, field: Field) -> &mut Document {
        self.fields.push(field);
        self
    }

    pub fn with_field(mut self, field: Field) -> Document {
        self.fields.push(field);
        self
    }

    pub fn with_boost(mut self, boost: f32) -> Document {
        self.boost = boost;
        self
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub(crate) fn into_fields(self) -> Vec<Field> {
        self.fields
    }

    /// Checks the flag combinations of every field.
    pub fn validate(&self) -> Result<()> {
        self.fields.iter().try_for_each(Field::validate)
    }
}
