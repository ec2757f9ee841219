//! Deterministic offline embedder for tests and air-gapped runs.
//!
//! Tokenizes into lowercase alphanumeric words, hashes each token into one
//! of `dim` buckets, counts, and L2-normalizes. Texts sharing tokens get
//! positive cosine similarity; disjoint texts land near zero. This is an
//! explicit, opt-in provider wired in by the caller. The store never falls
//! back to it when a real backend fails.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{EmbedFuture, Embedder, l2_normalize};
use crate::errors::Result;

/// Token-bag hashing embedder.
#[derive(Clone, Debug)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    /// Creates an embedder with the given bucket count.
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0_f32; self.dim];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dim;
            vec[bucket] += 1.0;
        }
        l2_normalize(&mut vec);
        vec
    }
}

impl Embedder for HashEmbedder {
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(async move { Ok(texts.iter().map(|t| self.embed_one(t)).collect()) })
    }

    fn is_available<'a>(&'a self) -> EmbedFuture<'a, bool> {
        Box::pin(async { true })
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shared_tokens_give_positive_similarity() {
        let e = HashEmbedder::new(64);
        let texts = vec![
            "20ft container rate Shanghai Rotterdam".to_string(),
            "rate for 20ft container".to_string(),
            "internal memo about holidays".to_string(),
        ];
        let vecs = e.embed_batch(&texts).await.unwrap();

        let sim = |a: &[f32], b: &[f32]| -> f32 {
            a.iter().zip(b).map(|(x, y)| x * y).sum()
        };
        assert!(sim(&vecs[0], &vecs[1]) > 0.0);
        assert!(sim(&vecs[0], &vecs[2]).abs() < sim(&vecs[0], &vecs[1]));
    }

    #[tokio::test]
    async fn output_is_unit_norm_and_deterministic() {
        let e = HashEmbedder::new(64);
        let texts = vec!["40ft HC Mundra to Felixstowe".to_string()];
        let a = e.embed_batch(&texts).await.unwrap();
        let b = e.embed_batch(&texts).await.unwrap();
        assert_eq!(a, b);

        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
