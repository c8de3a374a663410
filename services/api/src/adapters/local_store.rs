//! services/api/src/adapters/local_store.rs
//!
//! The file-backed local store, the concrete implementation of the `LocalStore`
//! port. Each key is one file in the data directory, mirroring the browser's
//! flat local-storage namespace.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use neurostudy_core::ports::{LocalStore, PortError, PortResult};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A local store that keeps one file per key under a directory.
#[derive(Clone, Debug)]
pub struct FileLocalStore {
    dir: PathBuf,
}

impl FileLocalStore {
    /// Creates the store, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> PortResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PortError::Storage(format!("Cannot create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PortResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PortError::InvalidInput(format!("Invalid storage key '{}'", key)));
        }
        Ok(self.dir.join(key))
    }
}

//=========================================================================================
// `LocalStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl LocalStore for FileLocalStore {
    async fn get_item(&self, key: &str) -> PortResult<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PortError::Storage(e.to_string())),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> PortResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::write(&path, value)
            .await
            .map_err(|e| PortError::Storage(e.to_string()))?;
        debug!("Wrote {} bytes to local key '{}'", value.len(), key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLocalStore::open(dir.path()).await.unwrap();
        store.set_item("neuro_studies_data", "[]").await.unwrap();

        let reopened = FileLocalStore::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get_item("neuro_studies_data").await.unwrap().as_deref(),
            Some("[]")
        );
        assert_eq!(reopened.get_item("neuro_folders_data").await.unwrap(), None);
    }

    #[tokio::test]
    async fn path_like_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLocalStore::open(dir.path()).await.unwrap();
        let err = store.set_item("../escape", "x").await.unwrap_err();
        assert!(matches!(err, PortError::InvalidInput(_)));
    }
}
