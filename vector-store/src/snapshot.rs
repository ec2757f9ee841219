//! Snapshot persistence: one JSON file per collection.
//!
//! Snapshots are full copies written after every mutation. The write goes
//! to a temp file in the same directory followed by an atomic rename, so a
//! crash mid-write leaves the previous snapshot intact.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::collection::Collection;
use crate::errors::Result;

/// Persistence seam for collection snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Loads the snapshot for `name`, or `None` if it was never saved.
    fn load(&self, name: &str) -> Result<Option<Collection>>;

    /// Persists a full snapshot of the collection.
    fn save(&self, collection: &Collection) -> Result<()>;

    /// Removes the snapshot for `name`. Returns `false` if absent.
    fn remove(&self, name: &str) -> Result<bool>;

    /// Names of all persisted collections.
    fn list(&self) -> Result<Vec<String>>;
}

/// Filesystem-backed snapshots under a root directory.
pub struct JsonSnapshots {
    root: PathBuf,
}

impl JsonSnapshots {
    /// Opens (and creates if needed) the snapshot root directory.
    ///
    /// # Errors
    /// Propagates directory creation failures.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }
}

impl SnapshotStore for JsonSnapshots {
    fn load(&self, name: &str) -> Result<Option<Collection>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        trace!(collection = name, path = %path.display(), "loading snapshot");
        let bytes = fs::read(&path)?;
        let mut collection: Collection = serde_json::from_slice(&bytes)?;
        collection.rebuild_index();
        Ok(Some(collection))
    }

    fn save(&self, collection: &Collection) -> Result<()> {
        let path = self.path_for(&collection.name);
        let tmp = self.root.join(format!(".{}.json.tmp", collection.name));

        let bytes = serde_json::to_vec(collection)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!(
            collection = %collection.name,
            documents = collection.len(),
            "snapshot saved"
        );
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        debug!(collection = name, "snapshot removed");
        Ok(true)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = file_name.strip_suffix(".json") {
                if !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Keeps snapshot file names predictable and path-safe.
pub fn validate_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::UpsertEntry;
    use std::collections::BTreeMap;

    #[test]
    fn save_load_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let snaps = JsonSnapshots::open(dir.path()).unwrap();

        let mut c = Collection::new("rates");
        c.apply_upsert(vec![UpsertEntry {
            id: "doc-1".into(),
            document: "20ft Shanghai to Rotterdam USD 1500".into(),
            metadata: BTreeMap::from([("organization_id".into(), "org-1".into())]),
            embedding: vec![0.6, 0.8],
        }])
        .unwrap();

        snaps.save(&c).unwrap();
        assert_eq!(snaps.list().unwrap(), vec!["rates".to_string()]);

        let loaded = snaps.load("rates").unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.position("doc-1"), Some(0));

        assert!(snaps.remove("rates").unwrap());
        assert!(snaps.load("rates").unwrap().is_none());
        assert!(!snaps.remove("rates").unwrap());
    }

    #[test]
    fn name_validation() {
        assert!(validate_collection_name("rate_sheets-1"));
        assert!(!validate_collection_name(""));
        assert!(!validate_collection_name("../escape"));
        assert!(!validate_collection_name("has space"));
    }
}
