//! Core data models used by the library.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Canonical document held in a collection.
///
/// Metadata is a flat string map: scope tags (e.g. `organization_id`) and
/// structured attribute fields live side by side.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub document: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Outcome of `create_collection`: whether a new collection was created or
/// an existing one was left untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    Existing,
}

/// Receipt returned by a successful upsert batch.
#[derive(Clone, Debug)]
pub struct UpsertReceipt {
    /// Number of documents written (replaced + appended).
    pub count: usize,
    /// The ids in request order.
    pub ids: Vec<String>,
}

/// Top-k results for one query, as parallel arrays.
///
/// `distances[i] = 1.0 - similarity[i]`; lower is closer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryHits {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<BTreeMap<String, String>>,
    pub distances: Vec<f32>,
}

impl QueryHits {
    /// Number of hits in this result set.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when the query matched nothing.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Deterministic document id: UUIDv5 over `"{scope_key}/{source_key}"`.
///
/// The same scope and source always map to the same id, so re-ingesting a
/// document replaces its previous version instead of duplicating it.
pub fn stable_document_id(scope_key: &str, source_key: &str) -> String {
    let seed = format!("{scope_key}/{source_key}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes()).to_string()
}
