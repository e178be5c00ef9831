//! Error types for the retrieval engine.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using RagError.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur in the retrieval engine and its collaborators.
///
/// Retrieval sub-components recover from most of these locally and record a
/// `DegradedReason` instead; only the orchestrator boundary and startup code
/// return them to the caller.
#[derive(Error, Debug)]
pub enum RagError {
    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// No chunks to build an index from.
    #[error("Empty corpus: {message}")]
    EmptyCorpus { message: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Embedding model error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Relevance scoring model error.
    #[error("Scoring error: {message}")]
    Scoring { message: String },

    /// Text generation error.
    #[error("Generation error: {message}")]
    Generation { message: String },

    /// A collaborator did not answer in time.
    #[error("{operation} timed out after {}ms", .elapsed.as_millis())]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// Chunking error.
    #[error("Chunking error: {message}")]
    Chunking { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl RagError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an empty corpus error.
    pub fn empty_corpus(message: impl Into<String>) -> Self {
        Self::EmptyCorpus {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a scoring error.
    pub fn scoring(message: impl Into<String>) -> Self {
        Self::Scoring {
            message: message.into(),
        }
    }

    /// Create a generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: &'static str, elapsed: Duration) -> Self {
        Self::Timeout { operation, elapsed }
    }

    /// Create a chunking error.
    pub fn chunking(message: impl Into<String>) -> Self {
        Self::Chunking {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Stable error code for logs and CLI output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::EmptyCorpus { .. } => "EMPTY_CORPUS",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Scoring { .. } => "SCORING_ERROR",
            Self::Generation { .. } => "GENERATION_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Chunking { .. } => "CHUNKING_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagError::empty_corpus("no chunks stored");
        assert!(err.to_string().contains("no chunks stored"));

        let err = RagError::timeout("reranking", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "reranking timed out after 1500ms");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(RagError::empty_corpus("x").error_code(), "EMPTY_CORPUS");
        assert_eq!(RagError::database("test").error_code(), "DATABASE_ERROR");
        assert!(RagError::timeout("generation", Duration::ZERO).is_timeout());
        assert!(!RagError::generation("boom").is_timeout());
    }
}
