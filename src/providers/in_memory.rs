use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{validate_append, CheckpointStore};
use crate::{CheckpointRecord, InstanceDescriptor, InstanceStatus, StoreError};

struct InstanceEntry {
    descriptor: InstanceDescriptor,
    status: InstanceStatus,
    records: Vec<CheckpointRecord>,
}

/// In-memory checkpoint store. Not durable across process restart; intended
/// for tests and for simulating crash/resume against a shared `Arc`.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    inner: Mutex<HashMap<String, InstanceEntry>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn create_instance(&self, descriptor: &InstanceDescriptor) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        if g.contains_key(&descriptor.instance) {
            return Err(StoreError::InstanceExists(descriptor.instance.clone()));
        }
        g.insert(
            descriptor.instance.clone(),
            InstanceEntry {
                descriptor: descriptor.clone(),
                status: InstanceStatus::Running,
                records: Vec::new(),
            },
        );
        Ok(())
    }

    async fn read_instance(&self, instance: &str) -> Result<Option<InstanceDescriptor>, StoreError> {
        let g = self.inner.lock().await;
        Ok(g.get(instance).map(|e| e.descriptor.clone()))
    }

    async fn read_status(&self, instance: &str) -> Result<Option<InstanceStatus>, StoreError> {
        let g = self.inner.lock().await;
        Ok(g.get(instance).map(|e| e.status.clone()))
    }

    async fn set_status(&self, instance: &str, status: InstanceStatus) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        let entry = g
            .get_mut(instance)
            .ok_or_else(|| StoreError::InstanceNotFound(instance.to_string()))?;
        entry.status = status;
        Ok(())
    }

    async fn append(&self, instance: &str, record: CheckpointRecord) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        let entry = g
            .get_mut(instance)
            .ok_or_else(|| StoreError::InstanceNotFound(instance.to_string()))?;
        if validate_append(instance, &entry.records, &record)? {
            entry.records.push(record);
        }
        Ok(())
    }

    async fn read_all(&self, instance: &str) -> Result<Vec<CheckpointRecord>, StoreError> {
        let g = self.inner.lock().await;
        Ok(g.get(instance).map(|e| e.records.clone()).unwrap_or_default())
    }

    async fn list_instances(&self) -> Vec<String> {
        self.inner.lock().await.keys().cloned().collect()
    }

    async fn remove_instance(&self, instance: &str) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        if g.remove(instance).is_none() {
            return Err(StoreError::InstanceNotFound(instance.to_string()));
        }
        Ok(())
    }

    async fn reset(&self) {
        self.inner.lock().await.clear();
    }
}
