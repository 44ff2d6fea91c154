//! Independent frames run concurrently up to the worker limit

use super::test_utils::{frame, register, result, Harness};
use scaffold_engine::catalog::{Frame, Stage};
use scaffold_engine::execution::BatchContext;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn sleepers(harness: &Harness, count: usize, sleep: Duration) -> Vec<Arc<Frame>> {
    (0..count)
        .map(|i| {
            let id = format!("sleep_{}", i);
            register(&harness.registry, &id, move |_| {
                std::thread::sleep(sleep);
                Ok(result(&[("slept", json!(true))]))
            });
            Arc::new(frame(&id, &[]))
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_five_independent_frames_overlap() {
    let harness = Harness::new();
    let frames = sleepers(&harness, 5, Duration::from_secs(1));
    let coordinator = harness.coordinator(5, 2);

    let started = Instant::now();
    let outcome = coordinator
        .run(&frames, &BatchContext::new("run-speedup", Stage::Implement, json!({})))
        .await;
    let wall = started.elapsed();

    assert_eq!(outcome.successful().count(), 5);
    assert_eq!(outcome.groups.len(), 1);
    assert!(wall < Duration::from_millis(2500), "batch took {:?}", wall);
    assert!(
        outcome.summary.speedup > 2.0,
        "speedup was {}",
        outcome.summary.speedup
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_worker_serializes_batch() {
    let harness = Harness::new();
    let frames = sleepers(&harness, 3, Duration::from_millis(200));
    let coordinator = harness.coordinator(1, 2);

    let started = Instant::now();
    let outcome = coordinator
        .run(&frames, &BatchContext::new("run-serial", Stage::Implement, json!({})))
        .await;

    assert_eq!(outcome.successful().count(), 3);
    assert!(started.elapsed() >= Duration::from_millis(600));
}

#[tokio::test]
async fn test_batch_summary_recorded_in_history() {
    let harness = Harness::new();
    let frames = sleepers(&harness, 2, Duration::from_millis(10));
    let coordinator = harness.coordinator(2, 2);

    coordinator
        .run(&frames, &BatchContext::new("run-history", Stage::Scope, json!({})))
        .await;

    let batches = harness.history.batches_for_run("run-history");
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].total_frames, 2);
    assert_eq!(batches[0].successful, 2);
    assert_eq!(harness.history.records_for_run("run-history").len(), 2);
}
