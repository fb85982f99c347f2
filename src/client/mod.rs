use std::time::Duration;

use serde::Serialize;

use crate::codec::{Codec, Json};
use crate::error::EngineError;
use crate::runtime::{Runtime, StartOutcome, WaitError};
use crate::{now_ms, InstanceStatus};

/// Thin trigger surface over a runtime.
///
/// Two entry points funnel into the scheduler: a scheduled trigger producing
/// a deterministic instance id per period key (duplicate timer fires for the
/// same period collapse into one instance), and a manual trigger producing a
/// timestamped id for ad-hoc runs.
pub struct Client {
    runtime: Runtime,
}

impl Client {
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }

    /// Deterministic id for a scheduled run, e.g. `("daily", "2025-01-15")`
    /// -> `"daily-2025-01-15"`.
    pub fn scheduled_instance_id(trigger: &str, period_key: &str) -> String {
        format!("{trigger}-{period_key}")
    }

    /// Timestamped id for a manual run.
    pub fn manual_instance_id(trigger: &str, timestamp_ms: u64) -> String {
        format!("{trigger}-manual-{timestamp_ms}")
    }

    /// Start an orchestration under the deterministic id for this trigger and
    /// period key. A second fire while the period's instance is running is
    /// refused by the scheduler; a fire after it finished starts a fresh run.
    pub async fn start_scheduled(
        &self,
        trigger: &str,
        period_key: &str,
        orchestration: &str,
        input: impl Into<String>,
    ) -> Result<(String, StartOutcome), EngineError> {
        let instance = Self::scheduled_instance_id(trigger, period_key);
        let outcome = self
            .runtime
            .start_if_not_running(&instance, orchestration, input)
            .await?;
        Ok((instance, outcome))
    }

    pub async fn start_scheduled_typed<In: Serialize>(
        &self,
        trigger: &str,
        period_key: &str,
        orchestration: &str,
        input: &In,
    ) -> Result<(String, StartOutcome), EngineError> {
        let payload = Json::encode(input).map_err(EngineError::Codec)?;
        self.start_scheduled(trigger, period_key, orchestration, payload).await
    }

    /// Start an orchestration under a fresh timestamped id.
    pub async fn start_manual(
        &self,
        trigger: &str,
        orchestration: &str,
        input: impl Into<String>,
    ) -> Result<(String, StartOutcome), EngineError> {
        let instance = Self::manual_instance_id(trigger, now_ms());
        let outcome = self
            .runtime
            .start_if_not_running(&instance, orchestration, input)
            .await?;
        Ok((instance, outcome))
    }

    pub async fn start_manual_typed<In: Serialize>(
        &self,
        trigger: &str,
        orchestration: &str,
        input: &In,
    ) -> Result<(String, StartOutcome), EngineError> {
        let payload = Json::encode(input).map_err(EngineError::Codec)?;
        self.start_manual(trigger, orchestration, payload).await
    }

    pub async fn status(&self, instance: &str) -> Result<InstanceStatus, EngineError> {
        self.runtime.status(instance).await
    }

    pub async fn wait_for_completion(
        &self,
        instance: &str,
        timeout: Duration,
    ) -> Result<InstanceStatus, WaitError> {
        self.runtime.wait_for_completion(instance, timeout).await
    }
}
