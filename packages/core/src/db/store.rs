//! Guide persistence
//!
//! A [`GuideStore`] loads and saves whole [`GuideState`] snapshots. The service
//! saves the working copy before swapping it in, so a failed save leaves the
//! committed state untouched.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::error::StoreError;
use super::state::GuideState;

/// Snapshot persistence for one guide
#[async_trait]
pub trait GuideStore: Send + Sync {
    /// Load the stored snapshot, `None` if nothing was saved yet
    async fn load(&self) -> Result<Option<GuideState>, StoreError>;

    /// Replace the stored snapshot
    async fn save(&self, state: &GuideState) -> Result<(), StoreError>;
}

/// In-process store, used by tests and previews
#[derive(Default)]
pub struct MemoryStore {
    snapshot: RwLock<Option<GuideState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: GuideState) -> Self {
        Self {
            snapshot: RwLock::new(Some(state)),
        }
    }
}

#[async_trait]
impl GuideStore for MemoryStore {
    async fn load(&self) -> Result<Option<GuideState>, StoreError> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save(&self, state: &GuideState) -> Result<(), StoreError> {
        *self.snapshot.write().await = Some(state.clone());
        Ok(())
    }
}

/// Pretty-printed JSON file, written through a temporary file and rename
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl GuideStore for JsonFileStore {
    async fn load(&self) -> Result<Option<GuideState>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::read_failed(&self.path, e)),
        };
        let state = serde_json::from_str(&raw)?;
        Ok(Some(state))
    }

    async fn save(&self, state: &GuideState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::write_failed(dir, e))?;
        }

        let raw = serde_json::to_string_pretty(state)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, raw)
            .await
            .map_err(|e| StoreError::write_failed(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StoreError::write_failed(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), "Saved guide snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_none());

        let state = GuideState::new(3, "Ferns");
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_json_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("guide.json"));
        assert!(store.load().await.unwrap().is_none());

        let state = GuideState::new(5, "Mosses");
        store.save(&state).await.unwrap();

        assert!(store.path().exists());
        assert!(!store.temp_path().exists());
        assert_eq!(store.load().await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guide.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let store = JsonFileStore::new(path);
        assert!(matches!(
            store.load().await,
            Err(StoreError::Serialization(_))
        ));
    }
}
