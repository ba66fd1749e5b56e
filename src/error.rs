//! Error kinds for the indexing and question-answering core.
//!
//! Every fallible library operation returns [`Result<T>`], whose error is
//! an [`EngineError`]. Each variant maps to a stable, machine-readable kind
//! string (see [`EngineError::kind`]) so that outer layers (CLI, HTTP) can
//! surface a structured `{ kind, message }` body without string matching.
//!
//! | Kind | Raised by |
//! |------|-----------|
//! | `unsupported_format` | Normalizer, for formats it cannot read |
//! | `extraction` | Normalizer, for malformed files of a supported format |
//! | `model_unavailable` | Embedder, when the model cannot be loaded or reached |
//! | `empty_input` | Embedder, for blank text |
//! | `transient` | Embedder internals; retried, never surfaced after retries |
//! | `dimension_mismatch` | VectorIndex, for vectors of the wrong width |
//! | `invalid_query` | Retriever, Reader, Orchestrator |
//! | `index_corrupt` | Index consistency checks; requires a rebuild |
//! | `store` | Relational store collaborator |
//! | `cancelled` | Orchestrator, when the caller abandons a request |

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("cannot embed blank input")]
    EmptyInput,

    #[error("transient embedding failure: {0}")]
    Transient(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("request cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn unsupported(extension: impl Into<String>) -> Self {
        EngineError::UnsupportedFormat {
            extension: extension.into(),
        }
    }

    /// Stable snake_case identifier for this error's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::UnsupportedFormat { .. } => "unsupported_format",
            EngineError::Extraction(_) => "extraction",
            EngineError::ModelUnavailable(_) => "model_unavailable",
            EngineError::EmptyInput => "empty_input",
            EngineError::Transient(_) => "transient",
            EngineError::DimensionMismatch { .. } => "dimension_mismatch",
            EngineError::InvalidQuery(_) => "invalid_query",
            EngineError::IndexCorrupt(_) => "index_corrupt",
            EngineError::Store(_) => "store",
            EngineError::Cancelled => "cancelled",
        }
    }

    /// Whether the embedder boundary may retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Serializable error shape shared by the HTTP layer and degraded responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(EngineError::unsupported("doc").kind(), "unsupported_format");
        assert_eq!(EngineError::EmptyInput.kind(), "empty_input");
        assert_eq!(
            EngineError::InvalidQuery("blank".into()).kind(),
            "invalid_query"
        );
        assert_eq!(EngineError::IndexCorrupt("x".into()).kind(), "index_corrupt");
    }

    #[test]
    fn body_carries_kind_and_message() {
        let body = EngineError::unsupported("rtf").to_body();
        assert_eq!(body.kind, "unsupported_format");
        assert!(body.message.contains("rtf"));
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(EngineError::Transient("429".into()).is_transient());
        assert!(!EngineError::ModelUnavailable("gone".into()).is_transient());
        assert!(!EngineError::Cancelled.is_transient());
    }
}
