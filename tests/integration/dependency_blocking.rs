//! Failed dependencies block their dependents without dispatching them

use super::test_utils::{fail, frame, succeed, Harness};
use scaffold_engine::catalog::Stage;
use scaffold_engine::error::FrameError;
use scaffold_engine::execution::{BatchContext, FrameStatus};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_failed_dependency_blocks_dependent() {
    let harness = Harness::new();
    fail(&harness.registry, "a", "boom");
    succeed(&harness.registry, "b");
    let frames = vec![Arc::new(frame("a", &[])), Arc::new(frame("b", &["a"]))];

    let outcome = harness
        .coordinator(4, 2)
        .run(&frames, &BatchContext::new("run-block", Stage::Implement, json!({})))
        .await;

    let a = outcome.outcome("a").unwrap();
    assert_eq!(a.status, FrameStatus::Failed);
    assert_eq!(a.attempts, 2);
    assert!(matches!(
        a.error,
        Some(FrameError::AttemptsExhausted { attempts: 2, .. })
    ));

    let b = outcome.outcome("b").unwrap();
    assert_eq!(b.status, FrameStatus::Blocked);
    assert_eq!(b.blocked_by, vec!["a".to_string()]);
    assert!(harness.history.records_for_frame("b").is_empty());
    assert_eq!(harness.history.records_for_frame("a").len(), 2);
}

#[tokio::test]
async fn test_blocking_is_transitive_and_siblings_continue() {
    let harness = Harness::new();
    fail(&harness.registry, "root", "boom");
    succeed(&harness.registry, "mid");
    succeed(&harness.registry, "leaf");
    succeed(&harness.registry, "sibling");
    let frames = vec![
        Arc::new(frame("root", &[])),
        Arc::new(frame("sibling", &[])),
        Arc::new(frame("mid", &["root"])),
        Arc::new(frame("leaf", &["mid"])),
    ];

    let outcome = harness
        .coordinator(4, 1)
        .run(&frames, &BatchContext::new("run-chain", Stage::Implement, json!({})))
        .await;

    assert_eq!(outcome.groups.len(), 3);
    assert_eq!(outcome.outcome("sibling").unwrap().status, FrameStatus::Succeeded);
    assert_eq!(outcome.outcome("mid").unwrap().status, FrameStatus::Blocked);
    let leaf = outcome.outcome("leaf").unwrap();
    assert_eq!(leaf.status, FrameStatus::Blocked);
    assert_eq!(leaf.blocked_by, vec!["mid".to_string()]);
    assert_eq!(outcome.blocked().count(), 2);
}

#[tokio::test]
async fn test_out_of_batch_dependency_is_satisfied() {
    let harness = Harness::new();
    succeed(&harness.registry, "late");
    let frames = vec![Arc::new(frame("late", &["earlier_stage_frame"]))];

    let outcome = harness
        .coordinator(2, 2)
        .run(&frames, &BatchContext::new("run-outside", Stage::Plan, json!({})))
        .await;

    assert_eq!(outcome.successful().count(), 1);
    assert_eq!(outcome.groups, vec![vec!["late".to_string()]]);
}
