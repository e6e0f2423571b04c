//! JSON document store. One collection per file, whole-file overwrite on
//! every save.

pub mod atomic;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

pub use atomic::atomic_write;

/// A value persisted as a single JSON document named `FILE_NAME` inside the
/// store root.
pub trait Collection: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write `{}`: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode `{name}`: {source}")]
    Encode {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{name}` changed on disk: expected revision {expected}, found {found}")]
    StaleRevision {
        name: &'static str,
        expected: String,
        found: String,
    },
}

#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for<C: Collection>(&self) -> PathBuf {
        self.root.join(C::FILE_NAME)
    }

    /// Loads a collection, substituting an empty one when the document is
    /// missing or unreadable. A missing document is created empty.
    pub fn load<C: Collection>(&self) -> C {
        let path = self.path_for::<C>();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let empty = C::default();
                if let Err(err) = self.save(&empty) {
                    warn!(path = %path.display(), error = %err, "could not create empty document");
                }
                return empty;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable document, using empty collection");
                return C::default();
            }
        };

        match serde_json::from_slice::<C>(&bytes) {
            Ok(collection) => collection,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt document, using empty collection");
                C::default()
            }
        }
    }

    pub fn save<C: Collection>(&self, collection: &C) -> Result<(), StoreError> {
        let path = self.path_for::<C>();
        let bytes = encode(collection)?;
        atomic_write(&path, &bytes).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "saved collection");
        Ok(())
    }

    /// Content hash of the document as it is on disk right now.
    pub fn revision<C: Collection>(&self) -> Option<String> {
        fs::read(self.path_for::<C>())
            .ok()
            .map(|bytes| sha256_hex(&bytes))
    }

    /// Saves only if the document still has revision `expected`, returning
    /// the new revision.
    pub fn save_if_revision<C: Collection>(
        &self,
        collection: &C,
        expected: &str,
    ) -> Result<String, StoreError> {
        let found = self
            .revision::<C>()
            .unwrap_or_else(|| "absent".to_string());
        if found != expected {
            return Err(StoreError::StaleRevision {
                name: C::FILE_NAME,
                expected: expected.to_string(),
                found,
            });
        }
        self.save(collection)?;
        Ok(self.revision::<C>().unwrap_or_default())
    }
}

fn encode<C: Collection>(collection: &C) -> Result<Vec<u8>, StoreError> {
    let mut bytes = serde_json::to_vec_pretty(collection).map_err(|source| StoreError::Encode {
        name: C::FILE_NAME,
        source,
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{Collection, JsonStore, StoreError};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::fs;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(transparent)]
    struct Tally(BTreeMap<String, u64>);

    impl Collection for Tally {
        const FILE_NAME: &'static str = "tally.json";
    }

    #[test]
    fn load_creates_missing_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path().join("data"));

        let tally: Tally = store.load();
        assert_eq!(tally, Tally::default());
        let written = fs::read_to_string(store.path_for::<Tally>()).expect("created");
        assert_eq!(written.trim(), "{}");
    }

    #[test]
    fn corrupt_document_loads_empty_and_is_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path());
        fs::write(store.path_for::<Tally>(), "{ not json").expect("seed");

        let tally: Tally = store.load();
        assert_eq!(tally, Tally::default());
        let on_disk = fs::read_to_string(store.path_for::<Tally>()).expect("read");
        assert_eq!(on_disk, "{ not json");
    }

    #[test]
    fn wrong_shape_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path());
        fs::write(store.path_for::<Tally>(), "[1, 2, 3]").expect("seed");

        let tally: Tally = store.load();
        assert!(tally.0.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path());
        let mut tally = Tally::default();
        tally.0.insert("zoë".to_string(), 15);
        tally.0.insert(String::new(), 0);

        store.save(&tally).expect("save");
        let loaded: Tally = store.load();
        assert_eq!(loaded, tally);
    }

    #[test]
    fn revision_guard_rejects_stale_writers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path());
        let _: Tally = store.load();
        let seen = store.revision::<Tally>().expect("revision");

        let mut first = Tally::default();
        first.0.insert("alice".to_string(), 5);
        let next = store.save_if_revision(&first, &seen).expect("fresh write");
        assert_ne!(next, seen);

        let mut second = Tally::default();
        second.0.insert("bob".to_string(), 5);
        let err = store
            .save_if_revision(&second, &seen)
            .expect_err("stale write must fail");
        assert!(matches!(err, StoreError::StaleRevision { .. }));

        let loaded: Tally = store.load();
        assert_eq!(loaded, first);
    }
}
