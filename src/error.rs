use thiserror::Error;

/// Failure reported by an activity handler, classified for the retry loop.
///
/// `Transient` failures are retried per the step's `RetryPolicy` until the
/// policy gives up; `Permanent` failures stop the attempt sequence
/// immediately. Either way only the final outcome of the whole sequence is
/// checkpointed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ActivityError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }
}

/// Errors surfaced by a `CheckpointStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An append contradicts the record already present at the same
    /// (instance, sequence). Indicates a determinism violation in the
    /// workflow body; fatal to the instance, never a business error.
    #[error("checkpoint conflict for {instance} at sequence {sequence}: {detail}")]
    Conflict {
        instance: String,
        sequence: u64,
        detail: String,
    },
    #[error("instance already exists: {0}")]
    InstanceExists(String),
    #[error("instance not found: {0}")]
    InstanceNotFound(String),
    /// Sequence numbers per instance must be gapless.
    #[error("out-of-order append for {instance}: expected sequence {expected}, got {got}")]
    OutOfOrder {
        instance: String,
        expected: u64,
        got: u64,
    },
    #[error("corrupt checkpoint data for {instance}: {detail}")]
    Corrupt { instance: String, detail: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the runtime control surface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("instance already running: {0}")]
    DuplicateInstance(String),
    #[error("instance not found: {0}")]
    InstanceNotFound(String),
    #[error("payload codec: {0}")]
    Codec(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
