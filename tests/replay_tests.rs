//! Replay semantics: an interrupted instance resumes exactly after its last
//! durable checkpoint, already-completed steps are never re-invoked, and a
//! body that diverges from its recorded history is rejected.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use duraflow::{ActivityRegistry, InstanceStatus, OrchestrationRegistry, Runtime};

mod common;

#[tokio::test(flavor = "multi_thread")]
async fn resume_skips_completed_steps() {
    common::init_tracing();

    let step_one_count = Arc::new(AtomicU32::new(0));
    let gate_count = Arc::new(AtomicU32::new(0));
    let step_two_count = Arc::new(AtomicU32::new(0));
    let resumed = Arc::new(AtomicBool::new(false));
    // Logical clock observed at the top of each body execution.
    let observed_times = Arc::new(Mutex::new(Vec::<u64>::new()));

    let activities = {
        let c1 = Arc::clone(&step_one_count);
        let cg = Arc::clone(&gate_count);
        let c2 = Arc::clone(&step_two_count);
        let resumed = Arc::clone(&resumed);
        ActivityRegistry::builder()
            .register("step_one", move |input: String| {
                let c = Arc::clone(&c1);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(format!("{input}+one"))
                }
            })
            .register("gate", move |_input: String| {
                let c = Arc::clone(&cg);
                let resumed = Arc::clone(&resumed);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    if !resumed.load(Ordering::SeqCst) {
                        // Simulated crash: the first execution parks here
                        // forever, leaving no checkpoint for this step.
                        futures::future::pending::<()>().await;
                    }
                    Ok("open".to_string())
                }
            })
            .register("step_two", move |input: String| {
                let c = Arc::clone(&c2);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(format!("{input}+two"))
                }
            })
            .build()
    };

    let orchestrations = {
        let times = Arc::clone(&observed_times);
        OrchestrationRegistry::builder()
            .register("ThreeSteps", move |ctx, input: String| {
                let times = Arc::clone(&times);
                async move {
                    times.lock().unwrap().push(ctx.current_logical_time_ms());
                    let a = ctx.call_activity("step_one", input).await?;
                    let _ = ctx.call_activity("gate", "").await?;
                    ctx.call_activity("step_two", a).await
                }
            })
            .build()
    };

    let (runtime, store) = common::mem_runtime(activities.clone(), orchestrations.clone());
    runtime
        .start_if_not_running("replay-1", "ThreeSteps", "in")
        .await
        .unwrap();
    assert!(
        common::wait_for_records(&store, "replay-1", 1, 5_000).await,
        "step_one was never checkpointed"
    );
    assert_eq!(step_one_count.load(Ordering::SeqCst), 1);
    // Wait until the first execution is actually parked inside the gate.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while gate_count.load(Ordering::SeqCst) == 0 {
        assert!(std::time::Instant::now() < deadline, "gate was never reached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(store.read_status("replay-1").await.unwrap(), Some(InstanceStatus::Running));

    // "Restart": a fresh runtime over the same store picks the instance up.
    resumed.store(true, Ordering::SeqCst);
    let recovered = Runtime::new(store.clone(), activities, orchestrations);
    let status = recovered.resume("replay-1").await.unwrap();

    assert_eq!(status, InstanceStatus::Completed { output: "in+one+two".to_string() });
    assert_eq!(
        step_one_count.load(Ordering::SeqCst),
        1,
        "completed step must not be re-invoked on resume"
    );
    assert_eq!(gate_count.load(Ordering::SeqCst), 2, "interrupted step runs again");
    assert_eq!(step_two_count.load(Ordering::SeqCst), 1);
    assert_eq!(store.read_all("replay-1").await.unwrap().len(), 3);

    // Both executions saw the same logical base time.
    let times = observed_times.lock().unwrap();
    assert_eq!(times.len(), 2);
    assert_eq!(times[0], times[1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_of_terminal_instance_returns_stored_status() {
    common::init_tracing();
    let invocations = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&invocations);
    let activities = ActivityRegistry::builder()
        .register("echo", move |input: String| {
            let c = Arc::clone(&counter);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(input)
            }
        })
        .build();
    let orchestrations = OrchestrationRegistry::builder()
        .register("Echo", |ctx, input: String| async move {
            ctx.call_activity("echo", input).await
        })
        .build();

    let (runtime, _store) = common::mem_runtime(activities, orchestrations);
    runtime.start_if_not_running("echo-1", "Echo", "hello").await.unwrap();
    let first = runtime
        .wait_for_completion("echo-1", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(first, InstanceStatus::Completed { output: "hello".to_string() });

    let again = runtime.resume("echo-1").await.unwrap();
    assert_eq!(again, first);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn diverging_body_is_rejected_as_nondeterministic() {
    common::init_tracing();

    let activities = ActivityRegistry::builder()
        .register("alpha", |_input: String| async move { Ok("a".to_string()) })
        .register("beta", |_input: String| async move { Ok("b".to_string()) })
        .register("gate", |_input: String| async move {
            futures::future::pending::<()>().await;
            Ok(String::new())
        })
        .build();

    let v1 = OrchestrationRegistry::builder()
        .register("Evolving", |ctx, _input: String| async move {
            let _ = ctx.call_activity("alpha", "x").await?;
            ctx.call_activity("gate", "").await
        })
        .build();

    let (runtime, store) = common::mem_runtime(activities.clone(), v1);
    runtime.start_if_not_running("evolve-1", "Evolving", "").await.unwrap();
    assert!(common::wait_for_records(&store, "evolve-1", 1, 5_000).await);

    // Same orchestration name, different program: the first recorded step no
    // longer matches what the body asks for.
    let v2 = OrchestrationRegistry::builder()
        .register("Evolving", |ctx, _input: String| async move {
            let _ = ctx.call_activity("beta", "x").await?;
            ctx.call_activity("gate", "").await
        })
        .build();
    let swapped = Runtime::new(store.clone(), activities, v2);
    let status = swapped.resume("evolve-1").await.unwrap();
    match status {
        InstanceStatus::Failed { error } => {
            assert!(error.contains("nondeterministic"), "unexpected error: {error}");
            assert!(error.contains("alpha"));
            assert!(error.contains("beta"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn latched_fatal_overrides_a_swallowing_body() {
    common::init_tracing();

    let activities = ActivityRegistry::builder()
        .register("alpha", |_input: String| async move { Ok("a".to_string()) })
        .register("beta", |_input: String| async move { Ok("b".to_string()) })
        .register("gate", |_input: String| async move {
            futures::future::pending::<()>().await;
            Ok(String::new())
        })
        .build();

    let v1 = OrchestrationRegistry::builder()
        .register("Swallower", |ctx, _input: String| async move {
            let _ = ctx.call_activity("alpha", "x").await?;
            ctx.call_activity("gate", "").await
        })
        .build();
    let (runtime, store) = common::mem_runtime(activities.clone(), v1);
    runtime.start_if_not_running("swallow-1", "Swallower", "").await.unwrap();
    assert!(common::wait_for_records(&store, "swallow-1", 1, 5_000).await);

    // This body ignores every step error and claims success; the engine-level
    // determinism violation must still fail the instance.
    let v2 = OrchestrationRegistry::builder()
        .register("Swallower", |ctx, _input: String| async move {
            let _ = ctx.call_activity("beta", "x").await;
            Ok("pretend everything is fine".to_string())
        })
        .build();
    let swapped = Runtime::new(store.clone(), activities, v2);
    let status = swapped.resume("swallow-1").await.unwrap();
    assert!(
        matches!(status, InstanceStatus::Failed { ref error } if error.contains("nondeterministic")),
        "got {status:?}"
    );
}
