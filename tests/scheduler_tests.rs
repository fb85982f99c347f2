//! Instance scheduling: deterministic ids, at-most-one-running per id, and
//! the trigger surface on the client.

use std::sync::Arc;
use std::time::Duration;

use duraflow::{ActivityRegistry, Client, InstanceStatus, OrchestrationRegistry};
use tokio::sync::Semaphore;

mod common;

#[test]
fn instance_ids_are_deterministic() {
    assert_eq!(Client::scheduled_instance_id("daily", "2025-01-15"), "daily-2025-01-15");
    assert_eq!(Client::manual_instance_id("daily", 1_700_000_000_000), "daily-manual-1700000000000");
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_trigger_for_same_period_is_refused() {
    common::init_tracing();

    let gate = Arc::new(Semaphore::new(0));
    let activities = {
        let gate = Arc::clone(&gate);
        ActivityRegistry::builder()
            .register("hold", move |_input: String| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.acquire().await.expect("gate closed").forget();
                    Ok("released".to_string())
                }
            })
            .build()
    };
    let orchestrations = OrchestrationRegistry::builder()
        .register("Held", |ctx, _input: String| async move {
            ctx.call_activity("hold", "").await
        })
        .build();

    let (runtime, _store) = common::mem_runtime(activities, orchestrations);
    let client = Client::new(runtime);

    let (instance, first) = client
        .start_scheduled("daily", "2025-01-15", "Held", "{}")
        .await
        .unwrap();
    assert!(first.started);
    assert_eq!(instance, "daily-2025-01-15");

    // The timer fires again for the same period while the first run is live.
    let (same, second) = client
        .start_scheduled("daily", "2025-01-15", "Held", "{}")
        .await
        .unwrap();
    assert_eq!(same, instance);
    assert!(!second.started, "duplicate trigger must not start a second execution");

    // A different period is an independent instance and may start.
    let (_, next_day) = client
        .start_scheduled("daily", "2025-01-16", "Held", "{}")
        .await
        .unwrap();
    assert!(next_day.started);

    gate.add_permits(1);
    gate.add_permits(1);
    let status = client
        .wait_for_completion(&instance, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(status, InstanceStatus::Completed { output: "released".to_string() });

    // Once the period's instance is terminal, the dedupe no longer applies:
    // a new trigger replaces the finished execution and runs again.
    let (_, after) = client
        .start_scheduled("daily", "2025-01-15", "Held", "{}")
        .await
        .unwrap();
    assert!(after.started, "a finished period must restart when triggered again");
    gate.add_permits(1);
    let rerun = client
        .wait_for_completion(&instance, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(rerun, InstanceStatus::Completed { output: "released".to_string() });
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_triggers_get_fresh_timestamped_ids() {
    common::init_tracing();
    let activities = ActivityRegistry::builder()
        .register("noop", |_input: String| async move { Ok("ok".to_string()) })
        .build();
    let orchestrations = OrchestrationRegistry::builder()
        .register("Quick", |ctx, _input: String| async move {
            ctx.call_activity("noop", "").await
        })
        .build();
    let (runtime, _store) = common::mem_runtime(activities, orchestrations);
    let client = Client::new(runtime);

    let (first_id, first) = client.start_manual("daily", "Quick", "{}").await.unwrap();
    assert!(first.started);
    tokio::time::sleep(Duration::from_millis(5)).await;
    let (second_id, second) = client.start_manual("daily", "Quick", "{}").await.unwrap();
    assert!(second.started);
    assert_ne!(first_id, second_id);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_orchestration_fails_the_instance() {
    common::init_tracing();
    let (runtime, _store) = common::mem_runtime(
        ActivityRegistry::builder().build(),
        OrchestrationRegistry::builder().build(),
    );
    let outcome = runtime
        .start_if_not_running("ghost-flow-1", "NoSuchFlow", "{}")
        .await
        .unwrap();
    assert!(outcome.started);
    let status = runtime
        .wait_for_completion("ghost-flow-1", Duration::from_secs(5))
        .await
        .unwrap();
    match status {
        InstanceStatus::Failed { error } => {
            assert!(error.contains("unregistered orchestration"), "unexpected error: {error}")
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn status_reports_not_found_for_unknown_instance() {
    common::init_tracing();
    let (runtime, _store) =
        common::mem_runtime(ActivityRegistry::builder().build(), OrchestrationRegistry::builder().build());
    let client = Client::new(runtime);
    assert!(client.status("nope").await.is_err());
}
