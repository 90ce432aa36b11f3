//! Index writer configuration.

use std::sync::Arc;

pub use quill_budget_tracker::DISABLE_AUTO_FLUSH;
use quill_common::{Result, error::Error, verify_arg};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{TokenizerType, create_tokenizer},
    similarity::{DefaultSimilarity, Similarity},
};

pub const DEFAULT_RAM_BUFFER_SIZE_MB: f64 = 16.0;
pub const DEFAULT_MAX_FIELD_LENGTH: u32 = 10_000;
pub const DEFAULT_TERM_INDEX_INTERVAL: u32 = 128;
pub const DEFAULT_SKIP_INTERVAL: u32 = 16;
pub const DEFAULT_MAX_SKIP_LEVELS: u32 = 10;
pub const DEFAULT_TOKENIZER: &str = "unicode-word";

/// Settings of an [`IndexWriter`](crate::IndexWriter).
///
/// Deserializes from JSON with every member optional; the similarity is not part of
/// the serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexWriterConfig {
    /// RAM buffer size in MB that triggers a flush; [`DISABLE_AUTO_FLUSH`] turns
    /// RAM-triggered flushing off.
    pub ram_buffer_size_mb: f64,
    /// Number of buffered documents that triggers a flush.
    pub max_buffered_docs: Option<u32>,
    /// Number of buffered delete terms that triggers a flush.
    pub max_buffered_delete_terms: Option<u32>,
    /// Maximum number of terms indexed per field per document.
    pub max_field_length: u32,
    /// One term in this many is copied into the term index.
    pub term_index_interval: u32,
    /// Documents between two skip entries.
    pub skip_interval: u32,
    pub max_skip_levels: u32,
    /// Name of the tokenizer applied to tokenized text fields.
    pub tokenizer: String,
    #[serde(skip)]
    pub similarity: SimilarityRef,
}

/// Shared handle to the [`Similarity`] in use.
#[derive(Debug, Clone)]
pub struct SimilarityRef(pub Arc<dyn Similarity>);

impl Default for SimilarityRef {
    fn default() -> Self {
        SimilarityRef(Arc::new(DefaultSimilarity))
    }
}

impl std::ops::Deref for SimilarityRef {
    type Target = dyn Similarity;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        IndexWriterConfig {
            ram_buffer_size_mb: DEFAULT_RAM_BUFFER_SIZE_MB,
            max_buffered_docs: None,
            max_buffered_delete_terms: None,
            max_field_length: DEFAULT_MAX_FIELD_LENGTH,
            term_index_interval: DEFAULT_TERM_INDEX_INTERVAL,
            skip_interval: DEFAULT_SKIP_INTERVAL,
            max_skip_levels: DEFAULT_MAX_SKIP_LEVELS,
            tokenizer: DEFAULT_TOKENIZER.to_string(),
            similarity: SimilarityRef::default(),
        }
    }
}

impl IndexWriterConfig {
    pub fn new() -> IndexWriterConfig {
        IndexWriterConfig::default()
    }

    pub fn from_json(json: &str) -> Result<IndexWriterConfig> {
        let config: IndexWriterConfig = serde_json::from_str(json)
            .map_err(|e| Error::invalid_arg("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::invalid_arg("config", e.to_string()))
    }

    pub fn with_ram_buffer_size_mb(mut self, mb: f64) -> Self {
        self.ram_buffer_size_mb = mb;
        self
    }

    pub fn with_max_buffered_docs(mut self, docs: Option<u32>) -> Self {
        self.max_buffered_docs = docs;
        self
    }

    pub fn with_max_buffered_delete_terms(mut self, terms: Option<u32>) -> Self {
        self.max_buffered_delete_terms = terms;
        self
    }

    pub fn with_max_field_length(mut self, length: u32) -> Self {
        self.max_field_length = length;
        self
    }

    pub fn with_term_index_interval(mut self, interval: u32) -> Self {
        self.term_index_interval = interval;
        self
    }

    pub fn with_skip_interval(mut self, interval: u32) -> Self {
        self.skip_interval = interval;
        self
    }

    pub fn with_max_skip_levels(mut self, levels: u32) -> Self {
        self.max_skip_levels = levels;
        self
    }

    pub fn with_tokenizer(mut self, name: impl Into<String>) -> Self {
        self.tokenizer = name.into();
        self
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = SimilarityRef(similarity);
        self
    }

    pub fn ram_flush_enabled(&self) -> bool {
        self.ram_buffer_size_mb != DISABLE_AUTO_FLUSH
    }

    pub fn create_tokenizer(&self) -> Result<TokenizerType> {
        create_tokenizer(&self.tokenizer)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ram_flush_enabled() {
            verify_arg!(ram_buffer_size_mb, self.ram_buffer_size_mb > 0.0);
        }
        verify_arg!(
            max_buffered_docs,
            self.max_buffered_docs.is_none_or(|docs| docs >= 2)
        );
        verify_arg!(
            max_buffered_delete_terms,
            self.max_buffered_delete_terms.is_none_or(|terms| terms >= 1)
        );
        if !self.ram_flush_enabled() && self.max_buffered_docs.is_none() {
            return Err(Error::invalid_arg(
                "config",
                "at least one of ram_buffer_size_mb and max_buffered_docs must be enabled",
            ));
        }
        verify_arg!(max_field_length, self.max_field_length > 0);
        verify_arg!(term_index_interval, self.term_index_interval > 0);
        verify_arg!(skip_interval, self.skip_interval >= 2);
        verify_arg!(max_skip_levels, self.max_skip_levels > 0);
        self.create_tokenizer()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IndexWriterConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_field_length, 10_000);
        assert_eq!(config.term_index_interval, 128);
        assert!(config.ram_flush_enabled());
    }

    #[test]
    fn test_some_flush_trigger_required() {
        let config = IndexWriterConfig::new().with_ram_buffer_size_mb(DISABLE_AUTO_FLUSH);
        assert!(config.validate().is_err());
        let config = config.with_max_buffered_docs(Some(10));
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_values() {
        assert!(
            IndexWriterConfig::new()
                .with_ram_buffer_size_mb(0.0)
                .validate()
                .is_err()
        );
        assert!(
            IndexWriterConfig::new()
                .with_max_buffered_docs(Some(1))
                .validate()
                .is_err()
        );
        assert!(
            IndexWriterConfig::new()
                .with_tokenizer("whitespace")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_json() {
        let config =
            IndexWriterConfig::from_json(r#"{ "ram_buffer_size_mb": 4.0, "max_buffered_docs": 100 }"#)
                .unwrap();
        assert_eq!(config.ram_buffer_size_mb, 4.0);
        assert_eq!(config.max_buffered_docs, Some(100));
        assert_eq!(config.tokenizer, DEFAULT_TOKENIZER);

        let json = config.to_json().unwrap();
        let back = IndexWriterConfig::from_json(&json).unwrap();
        assert_eq!(back.max_buffered_docs, Some(100));
        assert!(IndexWriterConfig::from_json("{ \"skip_interval\": 1 }").is_err());
    }
}
