//! Runtime: instance scheduling, resume, and status helpers.
//!
//! A runtime binds a checkpoint store to the activity and orchestration
//! registries. Each instance executes as a single logical sequence; distinct
//! instances run concurrently and independently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::error::{EngineError, StoreError};
use crate::providers::CheckpointStore;
use crate::{now_ms, InstanceDescriptor, InstanceStatus};

pub mod execution;
pub mod registry;

use execution::{execute_instance, RuntimeInner};
use registry::{ActivityRegistry, OrchestrationRegistry};

/// Result of asking the scheduler to start an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOutcome {
    pub started: bool,
}

/// Error type returned by the wait helper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("timed out waiting for instance to complete")]
    Timeout,
    #[error("instance not found: {0}")]
    NotFound(String),
}

#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
    /// Instances executing in this process. Guards against two concurrent
    /// executions of the same id inside one runtime; cross-restart dedupe
    /// comes from the persisted status.
    active: Arc<Mutex<HashSet<String>>>,
}

impl Runtime {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        activities: ActivityRegistry,
        orchestrations: OrchestrationRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                store,
                activities,
                orchestrations,
            }),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn store(&self) -> Arc<dyn CheckpointStore> {
        Arc::clone(&self.inner.store)
    }

    /// The instance scheduler: start the named orchestration under a
    /// deterministic instance id. A Running id is refused with a warning
    /// (never a second concurrent execution); a terminal id is replaced, so
    /// re-triggering a finished logical key starts a fresh execution.
    pub async fn start_if_not_running(
        &self,
        instance: &str,
        orchestration: &str,
        input: impl Into<String>,
    ) -> Result<StartOutcome, EngineError> {
        match self.inner.store.read_status(instance).await? {
            Some(InstanceStatus::Running) => {
                warn!(instance, "instance already running; start refused");
                return Ok(StartOutcome { started: false });
            }
            Some(status) => {
                info!(instance, ?status, "instance finished previously; replacing");
                self.inner.store.remove_instance(instance).await?;
            }
            None => {}
        }
        let descriptor = InstanceDescriptor {
            instance: instance.to_string(),
            orchestration: orchestration.to_string(),
            input: input.into(),
            created_at_ms: now_ms(),
        };
        match self.inner.store.create_instance(&descriptor).await {
            Ok(()) => {}
            // Lost a race with a duplicate trigger; the other start wins.
            Err(StoreError::InstanceExists(_)) => {
                warn!(instance, "instance created concurrently; start refused");
                return Ok(StartOutcome { started: false });
            }
            Err(e) => return Err(e.into()),
        }
        self.claim(instance)?;
        info!(instance, orchestration, "starting instance");
        let runtime = self.clone();
        let id = instance.to_string();
        tokio::spawn(async move {
            let _ = execute_instance(Arc::clone(&runtime.inner), descriptor).await;
            runtime.release(&id);
        });
        Ok(StartOutcome { started: true })
    }

    /// Re-run an existing, non-terminal instance to completion, replaying its
    /// checkpoint log so already-recorded steps are not re-invoked. This is
    /// the recovery path after a process interruption. Resuming an instance
    /// that already reached a terminal status returns that status unchanged.
    pub async fn resume(&self, instance: &str) -> Result<InstanceStatus, EngineError> {
        let descriptor = self
            .inner
            .store
            .read_instance(instance)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(instance.to_string()))?;
        if let Some(status) = self.inner.store.read_status(instance).await? {
            if status.is_terminal() {
                return Ok(status);
            }
        }
        self.claim(instance)?;
        info!(instance, orchestration = %descriptor.orchestration, "resuming instance");
        let status = execute_instance(Arc::clone(&self.inner), descriptor).await;
        self.release(instance);
        Ok(status)
    }

    pub async fn status(&self, instance: &str) -> Result<InstanceStatus, EngineError> {
        self.inner
            .store
            .read_status(instance)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(instance.to_string()))
    }

    /// Poll the store until the instance reaches a terminal status or the
    /// timeout elapses.
    pub async fn wait_for_completion(
        &self,
        instance: &str,
        timeout: Duration,
    ) -> Result<InstanceStatus, WaitError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(Some(status)) = self.inner.store.read_status(instance).await {
                if status.is_terminal() {
                    return Ok(status);
                }
            }
            if Instant::now() > deadline {
                return Err(WaitError::Timeout);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn claim(&self, instance: &str) -> Result<(), EngineError> {
        let mut active = self.active.lock().expect("active set lock poisoned");
        if !active.insert(instance.to_string()) {
            return Err(EngineError::DuplicateInstance(instance.to_string()));
        }
        Ok(())
    }

    fn release(&self, instance: &str) {
        let mut active = self.active.lock().expect("active set lock poisoned");
        active.remove(instance);
    }
}
