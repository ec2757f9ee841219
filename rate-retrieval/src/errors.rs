//! Unified error types for the crate.
//!
//! Only validation and store failures surface to callers. Re-rank and
//! synthesis backend failures are absorbed into deterministic fallbacks
//! and logged. A low-confidence rejection is a normal pipeline outcome
//! (`DraftOutcome::skipped`), not an error.

use thiserror::Error;
use vector_store::StoreError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Top-level error for retrieval and drafting operations.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Invalid caller input (empty tenant, empty query, zero k).
    #[error("validation error: {0}")]
    Validation(String),

    /// Store failures, including fatal embedding-path errors and
    /// missing collections or documents.
    #[error(transparent)]
    Store(#[from] StoreError),
}
