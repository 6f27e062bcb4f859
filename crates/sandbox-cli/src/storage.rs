use std::{path::PathBuf, sync::Arc};

use crate::config::{Config, StoreKind};
use color_eyre::{eyre::eyre, Result};
use dirs::data_dir;
use sandbox_core::storage::{InMemoryObjectStore, ObjectStore, StoreError};
use sandbox_storage::file_store::FileObjectStore;
use tracing::debug;

/// Resolve the default data directory for the sandbox.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| eyre!("no data dir available"))?;
    Ok(base.join("iiif-sandbox"))
}

/// Concrete engine behind the router, kept so the sweeper can reach it.
#[derive(Clone)]
pub enum Backend {
    File(Arc<FileObjectStore>),
    Memory(InMemoryObjectStore),
}

impl Backend {
    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        match self {
            Self::File(store) => store.clone(),
            Self::Memory(store) => Arc::new(store.clone()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::File(store) => format!("file ({})", store.root().display()),
            Self::Memory(_) => "memory".to_string(),
        }
    }

    /// Remove expired objects. File scans run on the blocking pool.
    pub async fn purge_expired(&self) -> Result<usize> {
        match self {
            Self::File(store) => {
                let store = store.clone();
                let purged = tokio::task::spawn_blocking(move || store.purge_expired()).await??;
                Ok(purged)
            }
            Self::Memory(store) => Ok(store.purge_expired()?),
        }
    }
}

/// Build the store selected by config.
pub fn store_from_config(config: &Config) -> Result<Backend> {
    match config.store {
        StoreKind::Memory => {
            debug!("initializing in-memory store");
            Ok(Backend::Memory(InMemoryObjectStore::new()))
        }
        StoreKind::File => {
            let root = match &config.data_dir {
                Some(root) => root.clone(),
                None => default_data_dir()?,
            };
            debug!(?root, "initializing file store");
            Ok(Backend::File(Arc::new(FileObjectStore::new(root))))
        }
    }
}

/// Write, read back and delete a probe object.
pub async fn round_trip_probe(store: &dyn ObjectStore) -> Result<()> {
    use sandbox_core::storage::PutOptions;

    let probe_key = "health-probe";
    let payload = b"ok";
    store
        .put(
            probe_key,
            payload,
            PutOptions {
                expiration_ttl: 60,
                metadata: None,
            },
        )
        .await?;
    let round_trip = store.get(probe_key).await?;
    store.delete(probe_key).await?;

    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    match store.get(probe_key).await {
        Err(StoreError::NotFound { .. }) => Ok(()),
        Ok(_) => Err(eyre!("probe survived delete")),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_backend_honours_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config {
            data_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let backend = store_from_config(&cfg).expect("backend");
        assert!(backend.describe().contains(&dir.path().display().to_string()));

        round_trip_probe(backend.object_store().as_ref())
            .await
            .expect("probe should pass");
        assert_eq!(backend.purge_expired().await.expect("purge"), 0);
    }

    #[tokio::test]
    async fn memory_backend_passes_probe() {
        let cfg = Config {
            store: StoreKind::Memory,
            ..Config::default()
        };
        let backend = store_from_config(&cfg).expect("backend");
        assert_eq!(backend.describe(), "memory");
        round_trip_probe(backend.object_store().as_ref())
            .await
            .expect("probe should pass");
    }
}
