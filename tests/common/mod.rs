#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use duraflow::providers::in_memory::InMemoryCheckpointStore;
use duraflow::providers::CheckpointStore;
use duraflow::{ActivityRegistry, OrchestrationRegistry, Runtime};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn mem_runtime(
    activities: ActivityRegistry,
    orchestrations: OrchestrationRegistry,
) -> (Runtime, Arc<dyn CheckpointStore>) {
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runtime = Runtime::new(Arc::clone(&store), activities, orchestrations);
    (runtime, store)
}

/// Poll until the instance's checkpoint log holds at least `n` records.
pub async fn wait_for_records(
    store: &Arc<dyn CheckpointStore>,
    instance: &str,
    n: usize,
    timeout_ms: u64,
) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if let Ok(records) = store.read_all(instance).await {
            if records.len() >= n {
                return true;
            }
        }
        if Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
