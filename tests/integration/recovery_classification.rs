//! Failure classification and escalation through the executor

use super::test_utils::{frame, register, result, Harness};
use scaffold_engine::catalog::Stage;
use scaffold_engine::error::CapabilityError;
use scaffold_engine::execution::{BatchContext, FrameStatus};
use scaffold_engine::recovery::{FailureCategory, RecoveryAction};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[test]
fn test_timeout_message_maps_to_timeout_category() {
    let category = FailureCategory::classify("Operation TIMED OUT after 30s");
    assert_eq!(category, FailureCategory::Timeout);
    assert_eq!(serde_json::to_value(category).unwrap(), json!("timeout_error"));
    assert_eq!(
        RecoveryAction::default_strategy(category).first(),
        Some(&RecoveryAction::Retry)
    );
    assert_eq!(
        FailureCategory::classify("something odd happened"),
        FailureCategory::Unknown
    );
}

#[tokio::test]
async fn test_transient_timeout_recovers_on_retry() {
    let harness = Harness::new();
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&calls);
    register(&harness.registry, "flaky", move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(CapabilityError::Invocation("upstream timeout".into()))
        } else {
            Ok(result(&[("flaky", json!("ok"))]))
        }
    });

    let outcome = harness
        .coordinator(1, 2)
        .run(
            &[Arc::new(frame("flaky", &[]))],
            &BatchContext::new("run-flaky", Stage::Implement, json!({})),
        )
        .await;

    let flaky = outcome.outcome("flaky").unwrap();
    assert_eq!(flaky.status, FrameStatus::Succeeded);
    assert_eq!(flaky.attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let history = harness.recovery.history_for("flaky");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].category, FailureCategory::Timeout);
    assert_eq!(history[0].attempts[0].action, RecoveryAction::Retry);
    assert!(history[0].successful);
}

#[tokio::test]
async fn test_repeated_timeouts_escalate_past_retry() {
    let harness = Harness::new();
    register(&harness.registry, "slowpoke", |_| {
        Err(CapabilityError::Invocation("request timed out".into()))
    });

    let outcome = harness
        .coordinator(1, 3)
        .run(
            &[Arc::new(frame("slowpoke", &[]))],
            &BatchContext::new("run-escalate", Stage::Implement, json!({})),
        )
        .await;

    assert_eq!(outcome.outcome("slowpoke").unwrap().attempts, 3);
    // Actions run between attempts; the final failure is recorded without any.
    let history = harness.recovery.history_for("slowpoke");
    assert_eq!(history.len(), 3);
    let second: Vec<RecoveryAction> = history[1].attempts.iter().map(|a| a.action).collect();
    assert_eq!(
        second,
        vec![RecoveryAction::Retry, RecoveryAction::IncreaseTimeout]
    );

    assert!(history[2].strategy.is_empty());
    assert!(!history[2].successful);
    assert_eq!(history[2].attempt, 3);

    let patterns = harness.recovery.patterns();
    assert_eq!(patterns[&FailureCategory::Timeout].count, 3);
    assert_eq!(patterns[&FailureCategory::Timeout].successful_recoveries, 2);
}

#[tokio::test]
async fn test_frame_id_keywords_do_not_drive_classification() {
    let harness = Harness::new();
    register(&harness.registry, "timeout_budget_check", |_| {
        Err(CapabilityError::Invocation("connection refused".into()))
    });

    let outcome = harness
        .coordinator(1, 2)
        .run(
            &[Arc::new(frame("timeout_budget_check", &[]))],
            &BatchContext::new("run-keywords", Stage::Implement, json!({})),
        )
        .await;

    let report = outcome.outcome("timeout_budget_check").unwrap().report();
    assert_eq!(report.classification, Some(FailureCategory::Connection));

    let history = harness.recovery.history_for("timeout_budget_check");
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .all(|r| r.category == FailureCategory::Connection));
    assert_eq!(
        history[0].strategy,
        RecoveryAction::default_strategy(FailureCategory::Connection)
    );
    assert!(!harness.recovery.patterns().contains_key(&FailureCategory::Timeout));
}
