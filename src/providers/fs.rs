use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};

use super::{validate_append, CheckpointStore};
use crate::{CheckpointRecord, InstanceDescriptor, InstanceStatus, StoreError};

/// Filesystem-backed checkpoint store.
///
/// Layout under the root directory, one subdirectory per instance:
///
/// ```text
/// <root>/<instance>/descriptor.json   immutable InstanceDescriptor
/// <root>/<instance>/status.json       current InstanceStatus (atomic rewrite)
/// <root>/<instance>/log.jsonl         checkpoint records, one JSON per line
/// ```
///
/// Descriptor and status writes go through write-then-rename so a crash never
/// leaves a half-written file; the log is append-only JSONL. Reopening a
/// store over the same root reconstructs every instance, which is what makes
/// resume-after-restart possible.
#[derive(Clone)]
pub struct FsCheckpointStore {
    root: PathBuf,
}

impl FsCheckpointStore {
    /// Create a store rooted at the given directory. If `reset_on_create` is
    /// true, delete any existing data under the root first.
    pub fn new(root: impl AsRef<Path>, reset_on_create: bool) -> Self {
        let path = root.as_ref().to_path_buf();
        if reset_on_create {
            let _ = std::fs::remove_dir_all(&path);
        }
        let _ = std::fs::create_dir_all(&path);
        Self { root: path }
    }

    fn inst_root(&self, instance: &str) -> PathBuf {
        self.root.join(instance)
    }

    fn descriptor_path(&self, instance: &str) -> PathBuf {
        self.inst_root(instance).join("descriptor.json")
    }

    fn status_path(&self, instance: &str) -> PathBuf {
        self.inst_root(instance).join("status.json")
    }

    fn log_path(&self, instance: &str) -> PathBuf {
        self.inst_root(instance).join("log.jsonl")
    }

    async fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FsCheckpointStore {
    async fn create_instance(&self, descriptor: &InstanceDescriptor) -> Result<(), StoreError> {
        let dir = self.inst_root(&descriptor.instance);
        fs::create_dir_all(&dir).await?;
        let desc_json = serde_json::to_string_pretty(descriptor).map_err(|e| StoreError::Corrupt {
            instance: descriptor.instance.clone(),
            detail: format!("encode descriptor: {e}"),
        })?;
        // Exclusive create: two creators racing on the same id cannot both win.
        let mut desc_file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.descriptor_path(&descriptor.instance))
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::InstanceExists(descriptor.instance.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        desc_file.write_all(desc_json.as_bytes()).await?;
        desc_file.flush().await?;
        let status_json =
            serde_json::to_string_pretty(&InstanceStatus::Running).map_err(|e| StoreError::Corrupt {
                instance: descriptor.instance.clone(),
                detail: format!("encode status: {e}"),
            })?;
        Self::write_atomic(&self.status_path(&descriptor.instance), &status_json).await?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(&descriptor.instance))
            .await?;
        Ok(())
    }

    async fn read_instance(&self, instance: &str) -> Result<Option<InstanceDescriptor>, StoreError> {
        let path = self.descriptor_path(instance);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let data = fs::read_to_string(&path).await?;
        let descriptor = serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
            instance: instance.to_string(),
            detail: format!("decode descriptor: {e}"),
        })?;
        Ok(Some(descriptor))
    }

    async fn read_status(&self, instance: &str) -> Result<Option<InstanceStatus>, StoreError> {
        let path = self.status_path(instance);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let data = fs::read_to_string(&path).await?;
        let status = serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
            instance: instance.to_string(),
            detail: format!("decode status: {e}"),
        })?;
        Ok(Some(status))
    }

    async fn set_status(&self, instance: &str, status: InstanceStatus) -> Result<(), StoreError> {
        if !fs::try_exists(self.descriptor_path(instance)).await? {
            return Err(StoreError::InstanceNotFound(instance.to_string()));
        }
        let json = serde_json::to_string_pretty(&status).map_err(|e| StoreError::Corrupt {
            instance: instance.to_string(),
            detail: format!("encode status: {e}"),
        })?;
        Self::write_atomic(&self.status_path(instance), &json).await
    }

    async fn append(&self, instance: &str, record: CheckpointRecord) -> Result<(), StoreError> {
        let path = self.log_path(instance);
        if !fs::try_exists(&path).await? {
            return Err(StoreError::InstanceNotFound(instance.to_string()));
        }
        let existing = self.read_all(instance).await?;
        if !validate_append(instance, &existing, &record)? {
            return Ok(());
        }
        let line = serde_json::to_string(&record).map_err(|e| StoreError::Corrupt {
            instance: instance.to_string(),
            detail: format!("encode record: {e}"),
        })?;
        let mut file = fs::OpenOptions::new().append(true).open(&path).await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_all(&self, instance: &str) -> Result<Vec<CheckpointRecord>, StoreError> {
        let path = self.log_path(instance);
        if !fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&path).await?;
        let mut out = Vec::new();
        for (lineno, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: CheckpointRecord =
                serde_json::from_str(line).map_err(|e| StoreError::Corrupt {
                    instance: instance.to_string(),
                    detail: format!("log line {}: {e}", lineno + 1),
                })?;
            out.push(record);
        }
        Ok(out)
    }

    async fn list_instances(&self) -> Vec<String> {
        let mut out = Vec::new();
        let Ok(mut entries) = fs::read_dir(&self.root).await else {
            return out;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().join("descriptor.json").exists() {
                out.push(name);
            }
        }
        out
    }

    async fn remove_instance(&self, instance: &str) -> Result<(), StoreError> {
        let dir = self.inst_root(instance);
        if !fs::try_exists(&dir).await? {
            return Err(StoreError::InstanceNotFound(instance.to_string()));
        }
        fs::remove_dir_all(&dir).await?;
        Ok(())
    }

    async fn reset(&self) {
        let _ = fs::remove_dir_all(&self.root).await;
        let _ = fs::create_dir_all(&self.root).await;
    }
}
