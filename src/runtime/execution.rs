//! Replay executor: the orchestration context, step dispatch, the activity
//! retry loop, and recursive sub-orchestration execution.
//!
//! The body of an orchestration is re-evaluated from its start on every
//! resume. For each step the context claims the next sequence number and
//! consults the checkpoint log: an existing record binds without invoking
//! anything; a missing record means the step runs now and its outcome is
//! appended before the body proceeds. The body itself must be a pure
//! function of its input and prior step outputs.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::codec::{Codec, Json};
use crate::error::ActivityError;
use crate::providers::CheckpointStore;
use crate::retry::RetryPolicy;
use crate::runtime::registry::{ActivityRegistry, OrchestrationRegistry};
use crate::{
    fingerprint, now_ms, CheckpointRecord, InstanceDescriptor, InstanceStatus, StepKind, StepOutcome,
};

/// Store and registries shared by every execution under one runtime.
pub(crate) struct RuntimeInner {
    pub(crate) store: Arc<dyn CheckpointStore>,
    pub(crate) activities: ActivityRegistry,
    pub(crate) orchestrations: OrchestrationRegistry,
}

struct CtxInner {
    /// Next sequence number to claim.
    cursor: u64,
    /// Snapshot of the checkpoint log taken when execution (re)started.
    recorded: Vec<CheckpointRecord>,
    /// Deterministic logical clock: created_at advanced to each bound record.
    logical_time_ms: u64,
    /// Engine-invariant violation latched for the runtime. The body may
    /// swallow the step error, but a latched fatal still fails the instance.
    fatal: Option<String>,
}

/// Handle given to an orchestration body. Exposes exactly the deterministic
/// surface a workflow definition is allowed to use: activity calls,
/// sub-orchestration calls, and the logical clock.
#[derive(Clone)]
pub struct OrchestrationContext {
    instance: Arc<String>,
    runtime: Arc<RuntimeInner>,
    inner: Arc<Mutex<CtxInner>>,
}

impl OrchestrationContext {
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// True while the next step would bind from the checkpoint log. Used by
    /// the `durable_*!` macros to keep resumes from duplicating log lines.
    pub fn is_replaying(&self) -> bool {
        let g = self.lock();
        g.cursor < g.recorded.len() as u64
    }

    /// Deterministic logical clock in epoch milliseconds: the instance
    /// creation time, advanced to the timestamp of each bound checkpoint.
    /// Replays observe exactly the values the original run observed.
    pub fn current_logical_time_ms(&self) -> u64 {
        self.lock().logical_time_ms
    }

    /// Invoke an activity as a single checkpointed step with no retries.
    pub async fn call_activity(
        &self,
        name: impl Into<String>,
        input: impl Into<String>,
    ) -> Result<String, String> {
        self.call_activity_with_retry(name, input, RetryPolicy::none()).await
    }

    /// Invoke an activity as a single checkpointed step, retrying transient
    /// failures per the policy. Individual attempts are not durable; only
    /// the final outcome of the attempt sequence is checkpointed.
    pub async fn call_activity_with_retry(
        &self,
        name: impl Into<String>,
        input: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<String, String> {
        let name = name.into();
        let input = input.into();
        let runtime = Arc::clone(&self.runtime);
        let invoke = invoke_activity(runtime, name.clone(), input.clone(), policy);
        self.run_step(StepKind::Activity, &name, &input, invoke).await
    }

    pub async fn call_activity_typed<In, Out>(
        &self,
        name: impl Into<String>,
        input: &In,
    ) -> Result<Out, String>
    where
        In: serde::Serialize,
        Out: serde::de::DeserializeOwned,
    {
        let payload = Json::encode(input)?;
        let out = self.call_activity(name, payload).await?;
        Json::decode(&out)
    }

    pub async fn call_activity_with_retry_typed<In, Out>(
        &self,
        name: impl Into<String>,
        input: &In,
        policy: RetryPolicy,
    ) -> Result<Out, String>
    where
        In: serde::Serialize,
        Out: serde::de::DeserializeOwned,
    {
        let payload = Json::encode(input)?;
        let out = self.call_activity_with_retry(name, payload, policy).await?;
        Json::decode(&out)
    }

    /// Invoke a named orchestration as a nested instance folded into a single
    /// step of this one. The child runs under its own deterministic id
    /// (`"{parent}::{sequence}"`) with its own independently numbered
    /// checkpoint log; only its terminal result is recorded against this
    /// instance's sequence. A child failure surfaces as `Err` here; whether
    /// that aborts this instance or becomes partial-failure data is the
    /// body's explicit decision.
    pub async fn call_sub_orchestration(
        &self,
        name: impl Into<String>,
        input: impl Into<String>,
    ) -> Result<String, String> {
        let name = name.into();
        let input = input.into();
        // Steps within an instance never run concurrently, so the cursor we
        // observe here is the sequence run_step will claim next.
        let sequence = self.lock().cursor;
        let child = format!("{}::{:04}", self.instance, sequence);
        let runtime = Arc::clone(&self.runtime);
        let invoke = execute_sub_orchestration(runtime, child, name.clone(), input.clone());
        self.run_step(StepKind::SubOrchestration, &name, &input, invoke).await
    }

    pub async fn call_sub_orchestration_typed<In, Out>(
        &self,
        name: impl Into<String>,
        input: &In,
    ) -> Result<Out, String>
    where
        In: serde::Serialize,
        Out: serde::de::DeserializeOwned,
    {
        let payload = Json::encode(input)?;
        let out = self.call_sub_orchestration(name, payload).await?;
        Json::decode(&out)
    }

    fn lock(&self) -> MutexGuard<'_, CtxInner> {
        self.inner.lock().expect("context lock poisoned")
    }

    fn latch_fatal(&self, message: String) {
        let mut g = self.lock();
        if g.fatal.is_none() {
            g.fatal = Some(message);
        }
    }

    fn take_fatal(&self) -> Option<String> {
        self.lock().fatal.take()
    }

    /// One checkpointed step: bind from the log if a record exists at the
    /// claimed sequence, otherwise invoke now and append the outcome before
    /// returning it.
    async fn run_step<F>(
        &self,
        kind: StepKind,
        name: &str,
        input: &str,
        invoke: F,
    ) -> Result<String, String>
    where
        F: Future<Output = Result<String, String>>,
    {
        let fp = fingerprint(input);
        let (sequence, recorded) = {
            let mut g = self.lock();
            let sequence = g.cursor;
            g.cursor += 1;
            (sequence, g.recorded.get(sequence as usize).cloned())
        };

        if let Some(rec) = recorded {
            if rec.step_name != name || rec.kind != kind || rec.input_fingerprint != fp {
                let msg = format!(
                    "sequence {sequence}: recorded step '{}' ({:?}, fp {}) does not match requested step '{}' ({:?}, fp {})",
                    rec.step_name, rec.kind, rec.input_fingerprint, name, kind, fp
                );
                error!(instance = %self.instance, %msg, "nondeterministic workflow body");
                self.latch_fatal(format!("nondeterministic workflow body: {msg}"));
                return Err(format!("nondeterministic workflow body: {msg}"));
            }
            self.lock().logical_time_ms = rec.timestamp_ms;
            debug!(instance = %self.instance, step = name, sequence, "step bound from checkpoint");
            return match rec.outcome {
                StepOutcome::Completed { result } => Ok(result),
                StepOutcome::Failed { error } => Err(error),
            };
        }

        let outcome = match invoke.await {
            Ok(result) => StepOutcome::Completed { result },
            Err(error) => StepOutcome::Failed { error },
        };
        let record = CheckpointRecord {
            sequence,
            step_name: name.to_string(),
            kind,
            input_fingerprint: fp,
            outcome: outcome.clone(),
            timestamp_ms: now_ms(),
        };
        if let Err(e) = self.runtime.store.append(&self.instance, record.clone()).await {
            let msg = format!("checkpoint append failed at sequence {sequence}: {e}");
            error!(instance = %self.instance, step = name, %msg, "aborting instance");
            self.latch_fatal(msg.clone());
            return Err(msg);
        }
        self.lock().logical_time_ms = record.timestamp_ms;
        debug!(instance = %self.instance, step = name, sequence, "step checkpointed");
        match outcome {
            StepOutcome::Completed { result } => Ok(result),
            StepOutcome::Failed { error } => Err(error),
        }
    }
}

/// The activity invoker: resolve the handler and drive its attempt sequence
/// under the step's retry policy.
async fn invoke_activity(
    runtime: Arc<RuntimeInner>,
    name: String,
    input: String,
    policy: RetryPolicy,
) -> Result<String, String> {
    let Some(handler) = runtime.activities.get(&name) else {
        return Err(format!("unregistered activity: {name}"));
    };
    let mut attempt: u32 = 1;
    loop {
        match handler.invoke(input.clone()).await {
            Ok(result) => return Ok(result),
            Err(ActivityError::Permanent(e)) => {
                warn!(activity = %name, attempt, error = %e, "activity failed permanently");
                return Err(e);
            }
            Err(ActivityError::Transient(e)) => match policy.delay_for_attempt(attempt) {
                Some(delay) => {
                    warn!(
                        activity = %name,
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "activity failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    warn!(activity = %name, attempt, error = %e, "activity retries exhausted");
                    return Err(format!("activity '{name}' failed after {attempt} attempt(s): {e}"));
                }
            },
        }
    }
}

/// Run a sub-orchestration to its terminal status under a deterministic child
/// id. A child left over from an interrupted parent execution is picked up
/// and resumed rather than recreated.
async fn execute_sub_orchestration(
    runtime: Arc<RuntimeInner>,
    child: String,
    orchestration: String,
    input: String,
) -> Result<String, String> {
    let descriptor = match runtime.store.read_instance(&child).await {
        Ok(Some(existing)) => existing,
        Ok(None) => {
            let descriptor = InstanceDescriptor {
                instance: child.clone(),
                orchestration: orchestration.clone(),
                input: input.clone(),
                created_at_ms: now_ms(),
            };
            if let Err(e) = runtime.store.create_instance(&descriptor).await {
                return Err(format!("create sub-orchestration '{child}': {e}"));
            }
            descriptor
        }
        Err(e) => return Err(format!("read sub-orchestration '{child}': {e}")),
    };
    if let Ok(Some(status)) = runtime.store.read_status(&child).await {
        if status.is_terminal() {
            return terminal_to_result(&child, status);
        }
    }
    let status = execute_instance(runtime, descriptor).await;
    terminal_to_result(&child, status)
}

fn terminal_to_result(child: &str, status: InstanceStatus) -> Result<String, String> {
    match status {
        InstanceStatus::Completed { output } => Ok(output),
        InstanceStatus::Failed { error } => Err(error),
        InstanceStatus::Running => {
            Err(format!("sub-orchestration '{child}' did not reach a terminal status"))
        }
    }
}

/// Execute one instance to a terminal status: snapshot its log, re-run the
/// body (binding recorded steps), then persist the terminal status. Boxed
/// because sub-orchestrations recurse into it.
pub(crate) fn execute_instance(
    runtime: Arc<RuntimeInner>,
    descriptor: InstanceDescriptor,
) -> BoxFuture<'static, InstanceStatus> {
    Box::pin(async move {
        let instance = descriptor.instance.clone();
        let Some(handler) = runtime.orchestrations.get(&descriptor.orchestration) else {
            let error = format!("unregistered orchestration: {}", descriptor.orchestration);
            error!(instance = %instance, %error, "instance cannot run");
            return finish(&runtime, &instance, InstanceStatus::Failed { error }).await;
        };
        let recorded = match runtime.store.read_all(&instance).await {
            Ok(records) => records,
            Err(e) => {
                let error = format!("checkpoint log unreadable: {e}");
                error!(instance = %instance, %error, "instance cannot run");
                return finish(&runtime, &instance, InstanceStatus::Failed { error }).await;
            }
        };
        debug!(
            instance = %instance,
            orchestration = %descriptor.orchestration,
            recorded_steps = recorded.len(),
            "executing instance"
        );
        let ctx = OrchestrationContext {
            instance: Arc::new(instance.clone()),
            runtime: Arc::clone(&runtime),
            inner: Arc::new(Mutex::new(CtxInner {
                cursor: 0,
                recorded,
                logical_time_ms: descriptor.created_at_ms,
                fatal: None,
            })),
        };
        let body = handler.invoke(ctx.clone(), descriptor.input.clone()).await;
        let status = match (ctx.take_fatal(), body) {
            (Some(fatal), _) => InstanceStatus::Failed { error: fatal },
            (None, Ok(output)) => InstanceStatus::Completed { output },
            (None, Err(error)) => InstanceStatus::Failed { error },
        };
        finish(&runtime, &instance, status).await
    })
}

async fn finish(
    runtime: &Arc<RuntimeInner>,
    instance: &str,
    status: InstanceStatus,
) -> InstanceStatus {
    if let Err(e) = runtime.store.set_status(instance, status.clone()).await {
        error!(instance, error = %e, "failed to persist terminal status");
    }
    match &status {
        InstanceStatus::Completed { .. } => info!(instance, "instance completed"),
        InstanceStatus::Failed { error } => error!(instance, %error, "instance failed"),
        InstanceStatus::Running => {}
    }
    status
}
