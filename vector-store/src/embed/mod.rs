//! Embedding-provider seam.
//!
//! Async is required because real providers perform HTTP requests. The
//! trait is object safe (boxed futures) so the store can hold
//! `Arc<dyn Embedder>` and tests can swap in the deterministic
//! [`hash_embedder::HashEmbedder`].

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::sync::OnceCell;

use crate::errors::{Result, StoreError};

pub mod hash_embedder;
pub mod profile_embedder;

/// Future alias for boxed embedder calls.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Provider interface for embedding generation.
///
/// Implementations must return unit-norm vectors of length [`Embedder::dim`].
/// Failures are returned as errors; a provider never substitutes zero
/// vectors for a failed call.
pub trait Embedder: Send + Sync {
    /// Embeds a batch of texts. The whole batch fails on the first error so
    /// callers never see a partially embedded batch.
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a, Result<Vec<Vec<f32>>>>;

    /// Quick availability probe for the backing service.
    fn is_available<'a>(&'a self) -> EmbedFuture<'a, bool>;

    /// Embedding dimensionality this provider produces.
    fn dim(&self) -> usize;
}

/// Init closure used by [`LazyEmbedder`].
pub type EmbedderInit =
    Box<dyn Fn() -> EmbedFuture<'static, Result<Arc<dyn Embedder>>> + Send + Sync>;

/// Lazily initialized shared embedder.
///
/// The inner provider is built on first use; concurrent first calls race on
/// a `OnceCell` so initialization runs exactly once. A failed init is
/// returned to the caller and retried on the next call instead of being
/// cached.
pub struct LazyEmbedder {
    dim: usize,
    init: EmbedderInit,
    cell: OnceCell<Arc<dyn Embedder>>,
}

impl LazyEmbedder {
    /// Creates a lazy wrapper with the expected dimensionality and an init
    /// closure producing the real provider.
    pub fn new(dim: usize, init: EmbedderInit) -> Self {
        Self {
            dim,
            init,
            cell: OnceCell::new(),
        }
    }

    async fn inner(&self) -> Result<&Arc<dyn Embedder>> {
        self.cell.get_or_try_init(|| (self.init)()).await
    }
}

impl Embedder for LazyEmbedder {
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            let inner = self.inner().await?;
            let out = inner.embed_batch(texts).await?;
            for vec in &out {
                if vec.len() != self.dim {
                    return Err(StoreError::VectorSizeMismatch {
                        got: vec.len(),
                        want: self.dim,
                    });
                }
            }
            Ok(out)
        })
    }

    fn is_available<'a>(&'a self) -> EmbedFuture<'a, bool> {
        Box::pin(async move {
            match self.inner().await {
                Ok(inner) => inner.is_available().await,
                Err(_) => false,
            }
        })
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Scales a vector to unit L2 norm. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::hash_embedder::HashEmbedder;

    #[tokio::test]
    async fn lazy_initializes_once() {
        static INITS: AtomicUsize = AtomicUsize::new(0);

        let lazy = LazyEmbedder::new(
            32,
            Box::new(|| {
                Box::pin(async {
                    INITS.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(HashEmbedder::new(32)) as Arc<dyn Embedder>)
                })
            }),
        );

        let texts = vec!["20ft container rate".to_string()];
        lazy.embed_batch(&texts).await.unwrap();
        lazy.embed_batch(&texts).await.unwrap();
        assert_eq!(INITS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lazy_surfaces_init_failure() {
        let lazy = LazyEmbedder::new(
            32,
            Box::new(|| {
                Box::pin(async {
                    Err(StoreError::Validation("backend offline".into()))
                })
            }),
        );

        let texts = vec!["anything".to_string()];
        assert!(lazy.embed_batch(&texts).await.is_err());
        assert!(!lazy.is_available().await);
    }

    #[test]
    fn normalize_handles_zero_vector() {
        let mut v = vec![0.0_f32, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);

        let mut v = vec![3.0_f32, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }
}
