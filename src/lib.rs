//! duraflow: durable workflow orchestration with checkpoint-log replay.
//!
//! An orchestration is a named, deterministic async program of steps
//! (activity calls and sub-orchestration calls). After every step the engine
//! appends a checkpoint record to an append-only per-instance log; when an
//! interrupted instance is resumed the body re-runs from the start and every
//! step with an existing record binds to the recorded outcome instead of
//! being re-invoked. Expensive or side-effecting work that already completed
//! is therefore never repeated.
//!
//! The crate splits into:
//! - [`providers`]: checkpoint log stores (in-memory and filesystem),
//! - [`runtime`]: the replay executor, registries, and instance scheduler,
//! - [`client`]: the trigger surface producing deterministic instance ids,
//! - [`retry`]: bounded backoff policies applied inside a single step,
//! - [`state`]: the keyed JSON application-state store used by activities.

use serde::{Deserialize, Serialize};

pub mod codec;
mod error;
pub mod logging;
pub mod providers;
pub mod retry;
pub mod runtime;
pub mod state;

pub mod client;

pub use client::Client;
pub use error::{ActivityError, EngineError, StoreError};
pub use retry::RetryPolicy;
pub use runtime::execution::OrchestrationContext;
pub use runtime::registry::{
    ActivityRegistry, ActivityRegistryBuilder, OrchestrationRegistry, OrchestrationRegistryBuilder,
};
pub use runtime::{Runtime, StartOutcome, WaitError};

/// What kind of step produced a checkpoint record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Activity,
    SubOrchestration,
}

/// Final outcome of one step's whole invocation (including internal retries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Completed { result: String },
    Failed { error: String },
}

/// One durable entry in an instance's checkpoint log.
///
/// Records for an instance are ordered by `sequence`, gapless, and immutable
/// once written: at most one record exists per (instance, sequence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub sequence: u64,
    pub step_name: String,
    pub kind: StepKind,
    pub input_fingerprint: String,
    pub outcome: StepOutcome,
    pub timestamp_ms: u64,
}

impl CheckpointRecord {
    /// Whether two records describe the same step with the same outcome.
    /// Timestamps are ignored so a retried append of an identical record is
    /// recognized as a no-op rather than a conflict.
    pub fn same_effect(&self, other: &CheckpointRecord) -> bool {
        self.sequence == other.sequence
            && self.step_name == other.step_name
            && self.kind == other.kind
            && self.input_fingerprint == other.input_fingerprint
            && self.outcome == other.outcome
    }
}

/// Immutable identity of a workflow instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub instance: String,
    pub orchestration: String,
    pub input: String,
    /// Pinned at creation; the base of the instance's deterministic logical clock.
    pub created_at_ms: u64,
}

/// Lifecycle status of an instance as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    Running,
    Completed { output: String },
    Failed { error: String },
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InstanceStatus::Running)
    }
}

/// Wall-clock milliseconds since the Unix epoch. Used only outside
/// orchestration bodies; bodies observe time through recorded checkpoints.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Short stable fingerprint of a step input, stored on its checkpoint record
/// and verified on replay to catch nondeterministic bodies.
pub(crate) fn fingerprint(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}
