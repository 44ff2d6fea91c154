//! The success-continue gate restarts a run at most once

use super::test_utils::{fail, frame, register, reports_with_prefix, result, scaffold, succeed, Harness};
use scaffold_engine::catalog::{Catalog, Stage};
use scaffold_engine::error::CapabilityError;
use scaffold_engine::orchestrator::{NoRestart, RunStatus, ScaffoldOrchestrator};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::new(
            vec![frame("scope", &[]), frame("analyze", &[]), frame("check", &[])],
            vec![scaffold(
                "audit",
                &[(1, &["scope"]), (2, &["analyze"]), (5, &["check"])],
            )],
        )
        .unwrap(),
    )
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_gate_failing_twice_restarts_once_then_halts() {
    let harness = Harness::new();
    succeed(&harness.registry, "scope");
    succeed(&harness.registry, "check");
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&calls);
    register(&harness.registry, "analyze", move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Err(CapabilityError::Invocation("analysis failed".into()))
    });
    let reports = TempDir::new().unwrap();
    let orchestrator =
        ScaffoldOrchestrator::new(catalog(), harness.coordinator(2, 1), reports.path());

    let status = orchestrator.run("audit", json!({})).await.unwrap();

    match &status {
        RunStatus::Error { stage, .. } => assert_eq!(*stage, Stage::SuccessContinue),
        other => panic!("expected halt, got {:?}", other),
    }
    // One call per pass.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(reports_with_prefix(reports.path(), "scaffold_failure_").len(), 1);
    assert!(reports_with_prefix(reports.path(), "scaffold_execution_").is_empty());

    let report = read_json(status.report_path());
    assert_eq!(report["error"]["kind"], "StageHalted");
    assert_eq!(report["halting_stage"], "success_continue");
    assert_eq!(report["restart"]["policy"], "alternate_strategy");
    assert_eq!(report["summary"]["restarts"], 1);

    let trail = report["stage_trail"].as_array().unwrap();
    let gate_failures = trail
        .iter()
        .filter(|r| r["status"] == "gate_failed")
        .count();
    assert_eq!(gate_failures, 2);
    let second_pass: Vec<u64> = trail
        .iter()
        .filter(|r| r["pass"] == 2 && r["status"] != "gate_failed")
        .map(|r| r["number"].as_u64().unwrap())
        .collect();
    assert_eq!(second_pass, vec![2, 3, 4]);
    // Stage 5 frames never ran.
    assert!(harness.history.records_for_frame("check").is_empty());
}

#[tokio::test]
async fn test_alternate_strategy_overlay_recovers_analysis() {
    let harness = Harness::new();
    succeed(&harness.registry, "scope");
    succeed(&harness.registry, "check");
    register(&harness.registry, "analyze", |input| {
        if input.parameters.get("alternate_strategy") == Some(&json!(true)) {
            Ok(result(&[("findings", json!(3))]))
        } else {
            Err(CapabilityError::Invocation("primary approach failed".into()))
        }
    });
    let reports = TempDir::new().unwrap();
    let orchestrator =
        ScaffoldOrchestrator::new(catalog(), harness.coordinator(2, 1), reports.path());

    let status = orchestrator.run("audit", json!({})).await.unwrap();

    assert!(status.is_complete(), "{:?}", status);
    let report = read_json(status.report_path());
    assert_eq!(report["summary"]["restarts"], 1);
    assert_eq!(report["final_results"]["findings"], 3);
    assert_eq!(report["final_results"]["check"], true);
    let gate = report["stage_trail"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["number"] == 5 && r["status"] == "succeeded")
        .map(|r| r["gate"]["passed"].clone());
    assert_eq!(gate, Some(json!(true)));
}

#[tokio::test]
async fn test_no_restart_policy_halts_on_first_gate_failure() {
    let harness = Harness::new();
    succeed(&harness.registry, "scope");
    succeed(&harness.registry, "check");
    fail(&harness.registry, "analyze", "analysis failed");
    let reports = TempDir::new().unwrap();
    let orchestrator =
        ScaffoldOrchestrator::new(catalog(), harness.coordinator(2, 1), reports.path())
            .with_restart_policy(Arc::new(NoRestart));

    let status = orchestrator.run("audit", json!({})).await.unwrap();

    assert!(!status.is_complete());
    let report = read_json(status.report_path());
    assert!(report["restart"].is_null());
    assert_eq!(harness.history.records_for_frame("analyze").len(), 1);
}
