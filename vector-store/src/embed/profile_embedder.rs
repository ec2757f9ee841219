//! Embedding provider backed by the shared LLM service.

use std::sync::Arc;

use llm_service::LlmServiceProfiles;

use super::{EmbedFuture, Embedder, l2_normalize};
use crate::errors::{Result, StoreError};

/// Adapter over [`LlmServiceProfiles`]' embedding profile.
///
/// Checks each returned vector against the expected dimensionality and
/// normalizes to unit norm so dot product equals cosine similarity.
pub struct ProfileEmbedder {
    svc: Arc<LlmServiceProfiles>,
    dim: usize,
}

impl ProfileEmbedder {
    /// Creates an adapter with the expected embedding dimension.
    pub fn new(svc: Arc<LlmServiceProfiles>, dim: usize) -> Self {
        Self { svc, dim }
    }
}

impl Embedder for ProfileEmbedder {
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            let mut out = self.svc.embed_batch(texts).await?;
            for vec in &mut out {
                if vec.len() != self.dim {
                    return Err(StoreError::VectorSizeMismatch {
                        got: vec.len(),
                        want: self.dim,
                    });
                }
                l2_normalize(vec);
            }
            Ok(out)
        })
    }

    fn is_available<'a>(&'a self) -> EmbedFuture<'a, bool> {
        Box::pin(async move { self.svc.embedding_available().await })
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
