//! Keyed JSON application-state store.
//!
//! This is domain state, not workflow checkpoint state: activities use it for
//! cross-run bookkeeping such as the set of already-published keys, so a
//! retried or re-triggered pipeline can de-duplicate its own side effects.
//! Orchestration bodies never touch it directly; only activities do.
//!
//! One file per key under the root, written atomically (write-then-rename) so
//! a crash mid-save never leaves a torn file.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state codec for key '{key}': {detail}")]
    Codec { key: String, detail: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let path = root.as_ref().to_path_buf();
        let _ = std::fs::create_dir_all(&path);
        Self { root: path }
    }

    // Keys may contain '/' to group related state (e.g. "daily-results/2025-01-15").
    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// Load the value for a key, or `None` if it was never saved.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        let path = self.path_for(key);
        if !fs::try_exists(&path).await? {
            debug!(key, "state not found");
            return Ok(None);
        }
        let data = fs::read_to_string(&path).await?;
        let value = serde_json::from_str(&data).map_err(|e| StateError::Codec {
            key: key.to_string(),
            detail: e.to_string(),
        })?;
        Ok(Some(value))
    }

    /// Save a value atomically.
    pub async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StateError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(value).map_err(|e| StateError::Codec {
            key: key.to_string(),
            detail: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        debug!(key, "state saved");
        Ok(())
    }

    /// Load the value for a key, creating and saving one from the factory if
    /// it does not exist yet.
    pub async fn load_or_create<T, F>(&self, key: &str, factory: F) -> Result<T, StateError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.load(key).await? {
            return Ok(existing);
        }
        let value = factory();
        self.save(key, &value).await?;
        Ok(value)
    }

    /// Atomic read-transform-write: load the current value (or the default),
    /// apply the transform, save, and return the updated value.
    pub async fn update<T, F>(&self, key: &str, default: T, transform: F) -> Result<T, StateError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let current = self.load(key).await?.unwrap_or(default);
        let updated = transform(current);
        self.save(key, &updated).await?;
        Ok(updated)
    }
}
