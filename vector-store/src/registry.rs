//! Collection registry: lazy loading, per-collection handles, write locking.
//!
//! Each handle pairs a writer mutex with an `Arc`-swapped immutable state:
//! - Writers serialize on `tokio::Mutex` per collection, build the next
//!   `Collection` off-lock-path, persist it, then swap the `Arc`.
//! - Readers clone the current `Arc` and work on a consistent snapshot.
//!   They never observe a partially applied batch.
//! - Independent collections contend only on the registry map read.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::collection::Collection;
use crate::errors::{Result, StoreError};
use crate::record::CreateOutcome;
use crate::snapshot::{SnapshotStore, validate_collection_name};

/// Shared per-collection handle.
pub struct CollectionHandle {
    writer: tokio::sync::Mutex<()>,
    state: RwLock<Arc<Collection>>,
}

impl CollectionHandle {
    fn new(collection: Collection) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(()),
            state: RwLock::new(Arc::new(collection)),
        }
    }

    /// Current immutable snapshot of the collection.
    pub fn snapshot(&self) -> Arc<Collection> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publishes a fully built collection state.
    pub fn swap(&self, next: Collection) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    /// Acquires the single-writer lock for this collection.
    pub async fn lock_writer(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.writer.lock().await
    }
}

/// Registry over all live collections plus the snapshot backend.
pub struct CollectionRegistry {
    snapshots: Box<dyn SnapshotStore>,
    handles: RwLock<HashMap<String, Arc<CollectionHandle>>>,
}

impl CollectionRegistry {
    /// Creates a registry over the given snapshot backend.
    pub fn new(snapshots: Box<dyn SnapshotStore>) -> Self {
        Self {
            snapshots,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot backend, for save/remove from store write paths.
    pub fn snapshots(&self) -> &dyn SnapshotStore {
        self.snapshots.as_ref()
    }

    /// Idempotent create: an existing collection (live or snapshotted) is
    /// left untouched.
    ///
    /// # Errors
    /// `Validation` for malformed names; snapshot I/O errors.
    pub fn create(&self, name: &str) -> Result<CreateOutcome> {
        check_name(name)?;

        if self.lookup(name).is_some() || self.load_into_map(name)?.is_some() {
            return Ok(CreateOutcome::Existing);
        }

        let collection = Collection::new(name);
        self.snapshots.save(&collection)?;
        self.insert(name, collection);
        info!(collection = name, "collection created");
        Ok(CreateOutcome::Created)
    }

    /// Resolves a handle, lazily loading from snapshot on first access.
    ///
    /// # Errors
    /// `NotFound` when the collection neither lives in memory nor on disk.
    pub fn handle(&self, name: &str) -> Result<Arc<CollectionHandle>> {
        check_name(name)?;
        if let Some(handle) = self.lookup(name) {
            return Ok(handle);
        }
        self.load_into_map(name)?.ok_or_else(|| StoreError::NotFound {
            what: "collection",
            name: name.to_string(),
        })
    }

    /// Drops the collection from memory and disk.
    ///
    /// # Errors
    /// `NotFound` when nothing existed under the name.
    pub fn remove(&self, name: &str) -> Result<()> {
        check_name(name)?;
        let had_handle = self
            .handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        let had_snapshot = self.snapshots.remove(name)?;
        if !had_handle && !had_snapshot {
            return Err(StoreError::NotFound {
                what: "collection",
                name: name.to_string(),
            });
        }
        info!(collection = name, "collection deleted");
        Ok(())
    }

    /// All known collection names: live handles plus persisted snapshots.
    pub fn names(&self) -> Result<Vec<String>> {
        let mut names = self.snapshots.list()?;
        let map = self.handles.read().unwrap_or_else(PoisonError::into_inner);
        for name in map.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        Ok(names)
    }

    fn lookup(&self, name: &str) -> Option<Arc<CollectionHandle>> {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn load_into_map(&self, name: &str) -> Result<Option<Arc<CollectionHandle>>> {
        match self.snapshots.load(name)? {
            Some(collection) => Ok(Some(self.insert(name, collection))),
            None => Ok(None),
        }
    }

    fn insert(&self, name: &str, collection: Collection) -> Arc<CollectionHandle> {
        let mut map = self.handles.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(name.to_string())
            .or_insert_with(|| Arc::new(CollectionHandle::new(collection)))
            .clone()
    }
}

fn check_name(name: &str) -> Result<()> {
    if validate_collection_name(name) {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "invalid collection name: {name:?}"
        )))
    }
}
