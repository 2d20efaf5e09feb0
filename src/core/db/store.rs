//! JSON file store
//!
//! The whole dataset lives in one JSON document. The store keeps the parsed
//! document in memory behind a `RwLock` and rewrites the file on every
//! mutation. Readers share the lock; a mutation holds it exclusively for
//! "mutate + write file" as one unit, so no caller ever sees a change that is
//! not on disk.
//!
//! The file is rewritten in place. A crash mid-write can leave it truncated;
//! there is no cross-process coordination either, so only one process may
//! point at a given file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::db::models::StoreData;

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to access store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store file {path} is malformed: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// In-memory cached JSON document with its backing file
pub struct JsonStore {
    path: PathBuf,
    cache: RwLock<Option<Arc<StoreData>>>,
}

impl JsonStore {
    /// Create a store for the given file. Nothing is read until first access.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    /// Create a store and load the file immediately.
    ///
    /// Fails if the file exists but cannot be parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(path);
        let data = store.load().await?;
        tracing::info!(
            "Store loaded from {}: {} users, {} sessions",
            store.path.display(),
            data.users.len(),
            data.sessions.len()
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the current snapshot, reading the file on first access.
    pub async fn load(&self) -> Result<Arc<StoreData>, StoreError> {
        {
            let cache = self.cache.read().await;
            if let Some(data) = cache.as_ref() {
                return Ok(Arc::clone(data));
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have populated the cache while we waited
        if let Some(data) = cache.as_ref() {
            return Ok(Arc::clone(data));
        }

        let data = Arc::new(Self::read_file(&self.path).await?);
        *cache = Some(Arc::clone(&data));
        Ok(data)
    }

    /// Write the current snapshot to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        self.load().await?;
        let cache = self.cache.write().await;
        match cache.as_ref() {
            Some(data) => Self::write_file(&self.path, data).await,
            None => Ok(()),
        }
    }

    /// Run a read-only closure against the current snapshot.
    pub async fn read<T>(&self, f: impl FnOnce(&StoreData) -> T) -> Result<T, StoreError> {
        let data = self.load().await?;
        Ok(f(&data))
    }

    /// Apply a change under the exclusive lock and persist it.
    ///
    /// The closure works on a copy of the document. Returning `Ok(None)`
    /// means nothing changed and the file is left alone. The copy only
    /// replaces the cached snapshot once the file write succeeded; any error
    /// leaves the previous snapshot in place.
    pub async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreData) -> Option<T>,
    ) -> Result<Option<T>, StoreError> {
        let mut cache = self.cache.write().await;

        let current = match cache.as_ref() {
            Some(data) => Arc::clone(data),
            None => Arc::new(Self::read_file(&self.path).await?),
        };

        let mut working = StoreData::clone(&current);
        let Some(result) = f(&mut working) else {
            if cache.is_none() {
                *cache = Some(current);
            }
            return Ok(None);
        };

        Self::write_file(&self.path, &working).await?;
        *cache = Some(Arc::new(working));

        Ok(Some(result))
    }

    async fn read_file(path: &Path) -> Result<StoreData, StoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Store file {} not found, starting empty", path.display());
                return Ok(StoreData::default());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(StoreData::default());
        }

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    async fn write_file(path: &Path, data: &StoreData) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::debug!(
            "Store written to {}: {} users, {} sessions",
            path.display(),
            data.users.len(),
            data.sessions.len()
        );
        Ok(())
    }
}
