//! Unified error types for the crate.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Top-level error for vector-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O or filesystem errors (snapshot read/write).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing / serialization errors.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid caller input (names, batch shapes, empty ids).
    #[error("validation error: {0}")]
    Validation(String),

    /// A collection or document was not found.
    #[error("{what} not found: {name}")]
    NotFound {
        /// Either `"collection"` or `"document"`.
        what: &'static str,
        /// The missing name or id.
        name: String,
    },

    /// Embedding backend failure (propagated, never masked with zeros).
    #[error("embedding error: {0}")]
    Embedding(#[from] llm_service::LlmError),

    /// Mismatch in vector dimensionality across records.
    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },
}
