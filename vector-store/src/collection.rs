//! In-memory collection: aligned parallel arrays plus an id index.
//!
//! Invariant: `ids`, `documents`, `metadatas` and `embeddings` always have
//! equal length with aligned positions, and `index` mirrors `ids` exactly.
//! Mutations go through [`Collection::apply_upsert`] and
//! [`Collection::remove`] which keep the invariant; the registry only ever
//! publishes a collection after a full mutation completes.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, StoreError};
use crate::record::DocumentRecord;

/// One pending upsert entry, already embedded.
#[derive(Clone, Debug)]
pub struct UpsertEntry {
    pub id: String,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
    pub embedding: Vec<f32>,
}

/// A named collection of documents with dense embeddings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<BTreeMap<String, String>>,
    embeddings: Vec<Vec<f32>>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Collection {
    /// Creates an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ids: Vec::new(),
            documents: Vec::new(),
            metadatas: Vec::new(),
            embeddings: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuilds the id index from `ids`. Must be called after
    /// deserialization (the index is not persisted).
    pub fn rebuild_index(&mut self) {
        self.index = self
            .ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (id.clone(), pos))
            .collect();
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Embedding dimensionality, or `None` while empty.
    pub fn dim(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }

    /// O(1) position lookup by id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Fetches one document by id.
    pub fn get(&self, id: &str) -> Option<DocumentRecord> {
        let pos = self.position(id)?;
        Some(DocumentRecord {
            id: self.ids[pos].clone(),
            document: self.documents[pos].clone(),
            metadata: self.metadatas[pos].clone(),
        })
    }

    /// Record at a known position. Callers obtain positions from
    /// [`Collection::top_k`] within the same snapshot.
    pub fn record_at(&self, pos: usize) -> DocumentRecord {
        DocumentRecord {
            id: self.ids[pos].clone(),
            document: self.documents[pos].clone(),
            metadata: self.metadatas[pos].clone(),
        }
    }

    /// Applies a batch of already-embedded entries: existing ids are
    /// replaced in place, new ids append. Later entries in the batch win
    /// over earlier ones with the same id.
    ///
    /// # Errors
    /// `VectorSizeMismatch` if an entry's vector length differs from the
    /// collection's (or the batch's first) dimensionality.
    pub fn apply_upsert(&mut self, entries: Vec<UpsertEntry>) -> Result<()> {
        let mut want = self.dim();
        for entry in entries {
            match want {
                Some(w) if entry.embedding.len() != w => {
                    return Err(StoreError::VectorSizeMismatch {
                        got: entry.embedding.len(),
                        want: w,
                    });
                }
                None => want = Some(entry.embedding.len()),
                _ => {}
            }

            match self.index.get(&entry.id).copied() {
                Some(pos) => {
                    self.documents[pos] = entry.document;
                    self.metadatas[pos] = entry.metadata;
                    self.embeddings[pos] = entry.embedding;
                }
                None => {
                    let pos = self.ids.len();
                    self.index.insert(entry.id.clone(), pos);
                    self.ids.push(entry.id);
                    self.documents.push(entry.document);
                    self.metadatas.push(entry.metadata);
                    self.embeddings.push(entry.embedding);
                }
            }
        }
        Ok(())
    }

    /// Merges `patch` into an existing document's metadata. Patch keys
    /// overwrite, other keys are kept, the embedding is untouched.
    /// Returns `false` if the id was absent.
    pub fn patch_metadata(&mut self, id: &str, patch: BTreeMap<String, String>) -> bool {
        let Some(pos) = self.index.get(id).copied() else {
            return false;
        };
        self.metadatas[pos].extend(patch);
        true
    }

    /// Removes one document, compacting all four sequences.
    /// Returns `false` if the id was absent.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.index.get(id).copied() else {
            return false;
        };
        self.ids.remove(pos);
        self.documents.remove(pos);
        self.metadatas.remove(pos);
        self.embeddings.remove(pos);
        // Positions after `pos` all shifted; rebuild rather than patch.
        self.rebuild_index();
        true
    }

    /// Brute-force top-k by dot-product similarity.
    ///
    /// Returns `(position, similarity)` pairs, descending by similarity,
    /// ties broken by insertion order. Only strictly positive similarities
    /// qualify; orthogonal or opposing documents are never returned.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .embeddings
            .iter()
            .enumerate()
            .filter(|(_, emb)| emb.len() == query.len())
            .map(|(pos, emb)| (pos, dot(query, emb)))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }
}

/// Plain dot product. Inputs are unit vectors, so this equals cosine
/// similarity.
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, doc: &str, emb: Vec<f32>) -> UpsertEntry {
        UpsertEntry {
            id: id.to_string(),
            document: doc.to_string(),
            metadata: BTreeMap::new(),
            embedding: emb,
        }
    }

    #[test]
    fn upsert_appends_and_replaces() {
        let mut c = Collection::new("t");
        c.apply_upsert(vec![
            entry("a", "first", vec![1.0, 0.0]),
            entry("b", "second", vec![0.0, 1.0]),
        ])
        .unwrap();
        assert_eq!(c.len(), 2);

        c.apply_upsert(vec![entry("a", "revised", vec![0.0, 1.0])])
            .unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c.get("a").unwrap().document, "revised");
        // Replacement keeps the original position.
        assert_eq!(c.position("a"), Some(0));
    }

    #[test]
    fn upsert_rejects_dim_mismatch() {
        let mut c = Collection::new("t");
        c.apply_upsert(vec![entry("a", "x", vec![1.0, 0.0])]).unwrap();
        let err = c
            .apply_upsert(vec![entry("b", "y", vec![1.0, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::VectorSizeMismatch { got: 3, want: 2 }
        ));
    }

    #[test]
    fn remove_compacts_and_reindexes() {
        let mut c = Collection::new("t");
        c.apply_upsert(vec![
            entry("a", "x", vec![1.0, 0.0]),
            entry("b", "y", vec![0.0, 1.0]),
            entry("c", "z", vec![1.0, 0.0]),
        ])
        .unwrap();

        assert!(c.remove("b"));
        assert_eq!(c.len(), 2);
        assert_eq!(c.position("c"), Some(1));
        assert!(!c.remove("b"));
    }

    #[test]
    fn patch_metadata_merges_without_touching_embedding() {
        let mut c = Collection::new("t");
        let mut e = entry("a", "x", vec![1.0, 0.0]);
        e.metadata = BTreeMap::from([
            ("organization_id".to_string(), "org-1".to_string()),
            ("status".to_string(), "draft".to_string()),
        ]);
        c.apply_upsert(vec![e]).unwrap();

        assert!(c.patch_metadata(
            "a",
            BTreeMap::from([("status".to_string(), "published".to_string())]),
        ));
        let rec = c.get("a").unwrap();
        assert_eq!(rec.metadata.get("status").unwrap(), "published");
        assert_eq!(rec.metadata.get("organization_id").unwrap(), "org-1");
        assert_eq!(c.top_k(&[1.0, 0.0], 1)[0].0, 0);

        assert!(!c.patch_metadata("ghost", BTreeMap::new()));
    }

    #[test]
    fn top_k_excludes_nonpositive_similarity() {
        let mut c = Collection::new("t");
        c.apply_upsert(vec![
            entry("pos", "aligned", vec![1.0, 0.0]),
            entry("orth", "orthogonal", vec![0.0, 1.0]),
            entry("neg", "opposed", vec![-1.0, 0.0]),
        ])
        .unwrap();

        let hits = c.top_k(&[1.0, 0.0], 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
    }

    #[test]
    fn top_k_breaks_ties_by_insertion_order() {
        let mut c = Collection::new("t");
        c.apply_upsert(vec![
            entry("first", "x", vec![1.0, 0.0]),
            entry("second", "y", vec![1.0, 0.0]),
        ])
        .unwrap();

        let hits = c.top_k(&[1.0, 0.0], 2);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 1);
    }

    #[test]
    fn rebuild_index_restores_lookup() {
        let mut c = Collection::new("t");
        c.apply_upsert(vec![entry("a", "x", vec![1.0])]).unwrap();

        let json = serde_json::to_string(&c).unwrap();
        let mut restored: Collection = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.position("a"), None);
        restored.rebuild_index();
        assert_eq!(restored.position("a"), Some(0));
    }
}
