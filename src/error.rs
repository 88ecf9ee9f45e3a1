//! Error types for topic_lens
//!
//! Configuration and shape errors are raised before any computation starts.
//! `InsufficientCooccurrence` is local to one topic's coherence term and is
//! absorbed by the evaluator; it only surfaces through the per-topic API.

use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TopicError>;

/// Main error type for topic_lens
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopicError {
    /// A caller-supplied bound is outside its valid range
    #[error("Invalid range: {message}")]
    InvalidRange { message: String },

    /// LDA hyperparameters rejected before training
    #[error("Invalid hyperparameter: {message}")]
    InvalidHyperparameter { message: String },

    /// Document-frequency filtering removed every token
    #[error("Empty vocabulary: {message}")]
    EmptyVocabulary { message: String },

    /// No documents or no vocabulary to train on
    #[error("Empty corpus: {message}")]
    EmptyCorpus { message: String },

    /// The top terms of one topic never co-occur with any other term
    #[error("Insufficient co-occurrence for topic {topic}")]
    InsufficientCooccurrence { topic: usize },

    /// Cooperative cancellation was requested between iterations
    #[error("Cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },

    /// Shape or type mismatch at a component boundary
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Checkpoint encoding/decoding failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl TopicError {
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    pub fn invalid_hyperparameter(message: impl Into<String>) -> Self {
        Self::InvalidHyperparameter {
            message: message.into(),
        }
    }

    pub fn empty_vocabulary(message: impl Into<String>) -> Self {
        Self::EmptyVocabulary {
            message: message.into(),
        }
    }

    pub fn empty_corpus(message: impl Into<String>) -> Self {
        Self::EmptyCorpus {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Configuration errors indicate a caller bug and are never worth retrying
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. } | Self::InvalidHyperparameter { .. } | Self::InvalidInput { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<serde_cbor::Error> for TopicError {
    fn from(err: serde_cbor::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
