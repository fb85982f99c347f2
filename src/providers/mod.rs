use crate::{CheckpointRecord, InstanceDescriptor, InstanceStatus, StoreError};

/// Storage abstraction for the append-only per-instance checkpoint log plus
/// instance descriptors and lifecycle status.
///
/// The log is the single source of truth for "has this step already
/// happened": the engine reconstructs every resume decision from
/// `read_all` plus the deterministic workflow body, never from in-memory
/// state. Stores must therefore be durable across process restart (the
/// in-memory store is a test utility).
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Create a new instance with status `Running`. Fails with
    /// `StoreError::InstanceExists` if the id is already known.
    async fn create_instance(&self, descriptor: &InstanceDescriptor) -> Result<(), StoreError>;

    /// Read an instance's descriptor, if it exists.
    async fn read_instance(&self, instance: &str) -> Result<Option<InstanceDescriptor>, StoreError>;

    /// Read an instance's lifecycle status, if it exists.
    async fn read_status(&self, instance: &str) -> Result<Option<InstanceStatus>, StoreError>;

    /// Persist a new lifecycle status for an existing instance.
    async fn set_status(&self, instance: &str, status: InstanceStatus) -> Result<(), StoreError>;

    /// Append one checkpoint record. Sequences are gapless: `record.sequence`
    /// must equal the current log length. Re-appending a record identical to
    /// the one already at its sequence is a no-op success; a differing record
    /// at an occupied sequence fails with `StoreError::Conflict`.
    async fn append(&self, instance: &str, record: CheckpointRecord) -> Result<(), StoreError>;

    /// Read the full checkpoint log for an instance, in sequence order.
    async fn read_all(&self, instance: &str) -> Result<Vec<CheckpointRecord>, StoreError>;

    /// Enumerate known instance ids.
    async fn list_instances(&self) -> Vec<String>;

    /// Remove an instance and its log. External retention/cleanup only; the
    /// engine itself never destroys instances.
    async fn remove_instance(&self, instance: &str) -> Result<(), StoreError>;

    /// Clear all store data (test utility).
    async fn reset(&self);
}

/// Shared append validation: enforces gapless sequencing, idempotent
/// re-append, and conflict detection. Returns `Ok(true)` when the record
/// should be written, `Ok(false)` for a duplicate no-op.
pub(crate) fn validate_append(
    instance: &str,
    existing: &[CheckpointRecord],
    record: &CheckpointRecord,
) -> Result<bool, StoreError> {
    let len = existing.len() as u64;
    if record.sequence < len {
        let prior = &existing[record.sequence as usize];
        if prior.same_effect(record) {
            return Ok(false);
        }
        return Err(StoreError::Conflict {
            instance: instance.to_string(),
            sequence: record.sequence,
            detail: format!(
                "recorded step '{}' ({:?}) contradicts appended step '{}' ({:?})",
                prior.step_name, prior.outcome, record.step_name, record.outcome
            ),
        });
    }
    if record.sequence > len {
        return Err(StoreError::OutOfOrder {
            instance: instance.to_string(),
            expected: len,
            got: record.sequence,
        });
    }
    Ok(true)
}

/// In-memory store for tests.
pub mod in_memory;
/// Filesystem-backed store for local durability.
pub mod fs;
