use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sandbox_core::{
    clock::{SharedClock, SystemClock},
    storage::{expiry_after, ObjectMetadata, ObjectStore, PutOptions, StoreError, StoredObject},
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

/// File-backed object store with per-entry expiry.
///
/// One JSON record per key under `root`; writes go through a temp file and an
/// atomic rename so readers never observe a half-written record.
pub struct FileObjectStore {
    root: PathBuf,
    clock: SharedClock,
}

impl FileObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    pub fn with_clock(root: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            root: root.into(),
            clock,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(sanitize_key(key))
    }

    /// Remove every expired record. Returns how many were dropped.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(storage_err(err)),
        };

        let now = self.clock.now_millis();
        let mut purged = 0;
        for entry in entries {
            let entry = entry.map_err(storage_err)?;
            let path = entry.path();
            if is_temp_file(&path) || !path.is_file() {
                continue;
            }
            match read_record(&path) {
                Ok(record) if record.expires_at > now => {}
                Ok(_) => {
                    remove_if_present(&path)?;
                    purged += 1;
                }
                Err(StoreError::NotFound { .. }) => {}
                Err(err) => warn!(path = %path.display(), "skipping unreadable record: {err}"),
            }
        }
        debug!(purged, "expired records purged");
        Ok(purged)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    expires_at: i64,
    #[serde(default)]
    metadata: Option<ObjectMetadata>,
    value: String,
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    #[instrument(skip_all)]
    async fn put(&self, key: &str, value: &[u8], options: PutOptions) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(storage_err)?;

        let record = StoredRecord {
            expires_at: expiry_after(self.clock.now_millis(), options.expiration_ttl),
            metadata: options.metadata,
            value: URL_SAFE_NO_PAD.encode(value),
        };

        let path = self.path_for(key);
        write_record(&path, &record)
    }

    #[instrument(skip_all)]
    async fn get_with_metadata(&self, key: &str) -> Result<StoredObject, StoreError> {
        let path = self.path_for(key);
        let record = read_record(&path).map_err(|err| match err {
            StoreError::NotFound { .. } => StoreError::NotFound {
                key: key.to_string(),
            },
            other => other,
        })?;

        if record.expires_at <= self.clock.now_millis() {
            debug!("dropping expired record");
            remove_if_present(&path)?;
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }

        let value = URL_SAFE_NO_PAD
            .decode(record.value)
            .map_err(|e| StoreError::Storage {
                reason: format!("value decode failed: {e}"),
            })?;

        Ok(StoredObject {
            value,
            metadata: record.metadata,
        })
    }

    #[instrument(skip_all)]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        remove_if_present(&self.path_for(key))
    }
}

fn write_record(path: &Path, record: &StoredRecord) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| StoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    let json = serde_json::to_vec(record).map_err(storage_err)?;
    tmp.write_all(&json).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn read_record(path: &Path) -> Result<StoredRecord, StoreError> {
    let mut file = File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound {
                key: path.to_string_lossy().to_string(),
            }
        } else {
            storage_err(err)
        }
    })?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(storage_err)?;
    serde_json::from_slice(&buf).map_err(storage_err)
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(storage_err(err)),
    }
}

// NamedTempFile names start with a dot; sanitized keys never do.
fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn sanitize_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sandbox_core::{clock::ManualClock, storage::ObjectStore};

    use super::*;

    fn options(ttl: u64) -> PutOptions {
        PutOptions {
            expiration_ttl: ttl,
            metadata: Some(ObjectMetadata { ttl: 1234 }),
        }
    }

    #[tokio::test]
    async fn round_trip_keeps_value_and_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileObjectStore::new(dir.path());

        store
            .put("abc/def", b"hello-sandbox", options(60))
            .await
            .expect("put");
        let object = store.get_with_metadata("abc/def").await.expect("get");
        assert_eq!(object.value, b"hello-sandbox");
        assert_eq!(object.metadata, Some(ObjectMetadata { ttl: 1234 }));

        // keys never become raw paths
        assert!(store.path_for("abc/def").starts_with(dir.path()));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 1);
    }

    #[tokio::test]
    async fn expired_records_read_as_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = ManualClock::new(0);
        let store = FileObjectStore::with_clock(dir.path(), Arc::new(clock.clone()));

        store.put("k", b"v", options(10)).await.expect("put");
        clock.advance(Duration::from_secs(10));

        let err = store.get("k").await.expect_err("should be expired");
        assert!(matches!(err, StoreError::NotFound { ref key } if key == "k"));
        assert!(!store.path_for("k").exists());
    }

    #[tokio::test]
    async fn purge_drops_only_expired_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = ManualClock::new(0);
        let store = FileObjectStore::with_clock(dir.path(), Arc::new(clock.clone()));

        store.put("short", b"v", options(5)).await.expect("put");
        store.put("long", b"v", options(500)).await.expect("put");
        clock.advance(Duration::from_secs(60));

        assert_eq!(store.purge_expired().expect("purge"), 1);
        assert!(store.get("long").await.is_ok());
        assert_eq!(store.purge_expired().expect("purge again"), 0);
    }

    #[test]
    fn purge_on_missing_root_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileObjectStore::new(dir.path().join("missing"));
        assert_eq!(store.purge_expired().expect("purge"), 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileObjectStore::new(dir.path());
        let key = "k";
        store.put(key, b"v", options(60)).await.expect("put");
        store.delete(key).await.expect("delete");
        store.delete(key).await.expect("delete again");

        let err = store.get(key).await.expect_err("should be missing");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
