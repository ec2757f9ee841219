//! In-process vector collection store.
//!
//! This crate provides:
//! - Named collections of documents with dense embeddings, kept as aligned
//!   parallel arrays with an id index for O(1) upsert-by-id.
//! - Brute-force top-k similarity search (dot product over unit vectors).
//! - Full JSON snapshot persistence after every mutation, with atomic
//!   file replacement.
//! - A pluggable async [`Embedder`] seam with lazy shared initialization.
//!
//! [`VectorStore`] is the single entry point recommended for application
//! code.

mod collection;
mod errors;
mod record;
mod registry;
mod snapshot;

pub mod embed;

pub use collection::Collection;
pub use embed::{Embedder, LazyEmbedder};
pub use embed::hash_embedder::HashEmbedder;
pub use embed::profile_embedder::ProfileEmbedder;
pub use errors::{Result, StoreError};
pub use record::{CreateOutcome, DocumentRecord, QueryHits, UpsertReceipt, stable_document_id};
pub use snapshot::{JsonSnapshots, SnapshotStore};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument, trace};

use collection::UpsertEntry;
use registry::CollectionRegistry;

/// High-level facade wiring the registry, snapshots, and the embedder.
pub struct VectorStore {
    registry: CollectionRegistry,
    embedder: Arc<dyn Embedder>,
}

impl VectorStore {
    /// Opens a store with JSON snapshots under `snapshot_root`.
    ///
    /// # Errors
    /// Propagates snapshot directory creation failures.
    pub fn open(snapshot_root: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let snapshots = JsonSnapshots::open(snapshot_root)?;
        Ok(Self {
            registry: CollectionRegistry::new(Box::new(snapshots)),
            embedder,
        })
    }

    /// Opens a store over a custom snapshot backend.
    pub fn with_snapshots(snapshots: Box<dyn SnapshotStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            registry: CollectionRegistry::new(snapshots),
            embedder,
        }
    }

    /// Idempotent collection creation.
    ///
    /// # Errors
    /// `Validation` for malformed names; snapshot I/O errors.
    pub async fn create_collection(&self, name: &str) -> Result<CreateOutcome> {
        self.registry.create(name)
    }

    /// Upserts a batch of documents: existing ids are replaced, new ids
    /// appended. All texts are embedded in one batched call, the snapshot
    /// is persisted, and only then does the new state become visible to
    /// readers. A snapshot failure fails the call with memory unchanged.
    ///
    /// Every document in the batch is re-embedded, including metadata-only
    /// changes to an existing id.
    ///
    /// # Errors
    /// `Validation` on shape mismatches or empty ids, `Embedding` when the
    /// backend fails, `VectorSizeMismatch`, snapshot I/O errors.
    #[instrument(skip_all, fields(collection = name, batch = ids.len()))]
    pub async fn upsert(
        &self,
        name: &str,
        documents: Vec<String>,
        metadatas: Vec<BTreeMap<String, String>>,
        ids: Vec<String>,
    ) -> Result<UpsertReceipt> {
        if documents.len() != ids.len() || metadatas.len() != ids.len() {
            return Err(StoreError::Validation(format!(
                "upsert batch shape mismatch: {} documents, {} metadatas, {} ids",
                documents.len(),
                metadatas.len(),
                ids.len()
            )));
        }
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(StoreError::Validation("empty document id".into()));
        }
        if ids.is_empty() {
            return Ok(UpsertReceipt { count: 0, ids });
        }

        let handle = self.registry.handle(name)?;
        let _writer = handle.lock_writer().await;

        // Embedding happens while the writer lock is held but before any
        // state is touched. Readers keep serving the previous snapshot.
        let embeddings = self.embedder.embed_batch(&documents).await?;

        let mut next = (*handle.snapshot()).clone();
        let entries = ids
            .iter()
            .zip(documents)
            .zip(metadatas)
            .zip(embeddings)
            .map(|(((id, document), metadata), embedding)| UpsertEntry {
                id: id.clone(),
                document,
                metadata,
                embedding,
            })
            .collect();
        next.apply_upsert(entries)?;

        self.registry.snapshots().save(&next)?;
        handle.swap(next);

        debug!(count = ids.len(), "upsert applied");
        Ok(UpsertReceipt {
            count: ids.len(),
            ids,
        })
    }

    /// Fetches one document by id.
    ///
    /// # Errors
    /// `NotFound` for a missing collection or document.
    pub async fn get(&self, name: &str, id: &str) -> Result<DocumentRecord> {
        let handle = self.registry.handle(name)?;
        handle.snapshot().get(id).ok_or_else(|| StoreError::NotFound {
            what: "document",
            name: id.to_string(),
        })
    }

    /// Merges `patch` into one document's metadata without re-embedding.
    /// Patch keys overwrite, other keys are kept, and the document text
    /// and vector are untouched. The snapshot is persisted before the new
    /// state becomes visible.
    ///
    /// # Errors
    /// `NotFound` for a missing collection or document; snapshot I/O errors.
    pub async fn update_metadata(
        &self,
        name: &str,
        id: &str,
        patch: BTreeMap<String, String>,
    ) -> Result<()> {
        let handle = self.registry.handle(name)?;
        let _writer = handle.lock_writer().await;

        let mut next = (*handle.snapshot()).clone();
        if !next.patch_metadata(id, patch) {
            return Err(StoreError::NotFound {
                what: "document",
                name: id.to_string(),
            });
        }
        self.registry.snapshots().save(&next)?;
        handle.swap(next);
        trace!(collection = name, id, "metadata updated");
        Ok(())
    }

    /// Deletes one document, compacting the collection and persisting the
    /// new snapshot.
    ///
    /// # Errors
    /// `NotFound` for a missing collection or document; snapshot I/O errors.
    pub async fn delete(&self, name: &str, id: &str) -> Result<()> {
        let handle = self.registry.handle(name)?;
        let _writer = handle.lock_writer().await;

        let mut next = (*handle.snapshot()).clone();
        if !next.remove(id) {
            return Err(StoreError::NotFound {
                what: "document",
                name: id.to_string(),
            });
        }
        self.registry.snapshots().save(&next)?;
        handle.swap(next);
        trace!(collection = name, id, "document deleted");
        Ok(())
    }

    /// Drops a collection from memory and disk.
    ///
    /// # Errors
    /// `NotFound` when nothing existed under the name.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.registry.remove(name)
    }

    /// Number of documents in a collection.
    ///
    /// # Errors
    /// `NotFound` for a missing collection.
    pub async fn count(&self, name: &str) -> Result<usize> {
        Ok(self.registry.handle(name)?.snapshot().len())
    }

    /// All known collection names, sorted.
    pub fn list_collections(&self) -> Result<Vec<String>> {
        self.registry.names()
    }

    /// Top-k similarity search for a batch of query texts.
    ///
    /// All queries are embedded in one call; each returns its own
    /// [`QueryHits`] with `distance = 1 - similarity`. Only strictly
    /// positive similarities qualify, so an empty or unrelated collection
    /// yields empty hits rather than noise.
    ///
    /// # Errors
    /// `NotFound` for a missing collection, `Embedding` on backend failure.
    #[instrument(skip_all, fields(collection = name, queries = query_texts.len(), k))]
    pub async fn query(
        &self,
        name: &str,
        query_texts: &[String],
        k: usize,
    ) -> Result<Vec<QueryHits>> {
        let snapshot = self.registry.handle(name)?.snapshot();
        if query_texts.is_empty() {
            return Ok(Vec::new());
        }

        let query_vecs = self.embedder.embed_batch(query_texts).await?;

        let mut out = Vec::with_capacity(query_vecs.len());
        for qvec in &query_vecs {
            let mut hits = QueryHits::default();
            for (pos, similarity) in snapshot.top_k(qvec, k) {
                let record = snapshot.record_at(pos);
                hits.ids.push(record.id);
                hits.documents.push(record.document);
                hits.metadatas.push(record.metadata);
                hits.distances.push(1.0 - similarity);
            }
            out.push(hits);
        }

        debug!(
            returned = out.iter().map(QueryHits::len).sum::<usize>(),
            "query complete"
        );
        Ok(out)
    }
}
