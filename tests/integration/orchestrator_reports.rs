//! End-to-end runs: halts, publishing and preserved context

use super::test_utils::{
    fail, frame, register, reports_with_prefix, result, scaffold, succeed, with_criteria, Harness,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use scaffold_engine::catalog::{Catalog, Stage, PARAM_RESOURCES};
use scaffold_engine::config::AdmissionConfig;
use scaffold_engine::error::{CatalogError, EngineError};
use scaffold_engine::orchestrator::{PublishRequest, Publisher, RunStatus, ScaffoldOrchestrator};
use scaffold_engine::store::RunStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingPublisher {
    requests: Mutex<Vec<PublishRequest>>,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<String, EngineError> {
        self.requests.lock().push(request.clone());
        Ok(format!("memory://{}", request.run_id))
    }
}

struct RejectingPublisher;

#[async_trait]
impl Publisher for RejectingPublisher {
    async fn publish(&self, _request: &PublishRequest) -> Result<String, EngineError> {
        Err(EngineError::Publish("registry offline".into()))
    }
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn publishing_catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::new(
            vec![frame("scope", &[]), frame("build", &[]), frame("ship", &["build"])],
            vec![scaffold(
                "release",
                &[(1, &["scope"]), (4, &["build"]), (8, &["ship"])],
            )],
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_load_bearing_failure_halts_after_stage() {
    let harness = Harness::new();
    succeed(&harness.registry, "scope");
    succeed(&harness.registry, "side");
    succeed(&harness.registry, "audit");
    register(&harness.registry, "measure", |_| Ok(result(&[("coverage", json!(50))])));

    let mut release = scaffold(
        "release",
        &[(1, &["scope"]), (4, &["measure", "side"]), (6, &["audit"])],
    );
    release.success_criteria.insert("coverage".into(), json!(90));
    let catalog = Catalog::new(
        vec![
            frame("scope", &[]),
            with_criteria(frame("measure", &[]), &[("coverage", json!(90))]),
            frame("side", &[]),
            frame("audit", &[]),
        ],
        vec![release],
    )
    .unwrap();
    let reports = TempDir::new().unwrap();
    let orchestrator =
        ScaffoldOrchestrator::new(Arc::new(catalog), harness.coordinator(2, 2), reports.path());

    let status = orchestrator
        .run("release", json!({"target": "src"}))
        .await
        .unwrap();

    match &status {
        RunStatus::Error { stage, .. } => assert_eq!(*stage, Stage::Implement),
        other => panic!("expected halt, got {:?}", other),
    }
    assert!(harness.history.records_for_frame("audit").is_empty());
    // The sibling still ran to completion.
    assert_eq!(harness.history.records_for_frame("side").len(), 1);

    let report = read_json(status.report_path());
    let triggering = report["error"]["triggering_frames"].as_array().unwrap();
    assert_eq!(triggering.len(), 1);
    assert_eq!(triggering[0]["frame_id"], "measure");
    assert_eq!(triggering[0]["error_kind"], "AttemptsExhausted");
    assert_eq!(report["context"]["input"]["target"], "src");
    assert_eq!(report["context"]["previous_results"]["stage_1"]["status"], "succeeded");
}

#[tokio::test]
async fn test_load_bearing_admission_denial_halts_with_failure_report() {
    let mut config = AdmissionConfig::default();
    config.per_agent_ceiling.cpu = 25.0;
    let harness = Harness::with_admission(config);
    succeed(&harness.registry, "scope");
    succeed(&harness.registry, "hungry");
    succeed(&harness.registry, "audit");

    let mut hungry = with_criteria(frame("hungry", &[]), &[("hungry", json!(true))]);
    hungry
        .parameters
        .insert(PARAM_RESOURCES.to_string(), json!({"cpu": 30}));
    let mut release = scaffold("release", &[(1, &["scope"]), (4, &["hungry"]), (6, &["audit"])]);
    release.success_criteria.insert("hungry".into(), json!(true));
    let catalog = Catalog::new(
        vec![frame("scope", &[]), hungry, frame("audit", &[])],
        vec![release],
    )
    .unwrap();
    let reports = TempDir::new().unwrap();
    let orchestrator =
        ScaffoldOrchestrator::new(Arc::new(catalog), harness.coordinator(2, 3), reports.path());

    let status = orchestrator.run("release", json!({})).await.unwrap();

    match &status {
        RunStatus::Error { stage, .. } => assert_eq!(*stage, Stage::Implement),
        other => panic!("expected halt, got {:?}", other),
    }
    assert!(harness.history.records_for_frame("audit").is_empty());
    assert_eq!(harness.history.records_for_frame("hungry").len(), 1);
    assert!(reports_with_prefix(reports.path(), "scaffold_execution_").is_empty());
    assert_eq!(reports_with_prefix(reports.path(), "scaffold_failure_").len(), 1);

    let report = read_json(status.report_path());
    let triggering = report["error"]["triggering_frames"].as_array().unwrap();
    assert_eq!(triggering.len(), 1);
    assert_eq!(triggering[0]["frame_id"], "hungry");
    assert_eq!(triggering[0]["error_kind"], "ResourceUnavailable");
    assert_eq!(triggering[0]["attempts"], 1);
}

#[tokio::test]
async fn test_dependency_cycle_is_reported_as_degraded() {
    let harness = Harness::new();
    for id in ["scope", "left", "right"] {
        succeed(&harness.registry, id);
    }
    let catalog = Catalog::new(
        vec![
            frame("scope", &[]),
            frame("left", &["right"]),
            frame("right", &["left"]),
        ],
        vec![scaffold("release", &[(1, &["scope"]), (4, &["left", "right"])])],
    )
    .unwrap();
    let reports = TempDir::new().unwrap();
    let orchestrator =
        ScaffoldOrchestrator::new(Arc::new(catalog), harness.coordinator(2, 1), reports.path());

    let status = orchestrator.run("release", json!({})).await.unwrap();

    assert!(status.is_complete());
    let report = read_json(status.report_path());
    let warnings = report["degraded_warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    let warning = warnings[0].as_str().unwrap();
    assert!(warning.contains("CyclicDependencyDegraded"), "{}", warning);
    assert!(warning.contains("left") && warning.contains("right"), "{}", warning);

    let implement = report["stage_trail"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["number"] == 4)
        .unwrap();
    assert_eq!(implement["degraded"], json!(warning));
    assert_eq!(implement["groups"], json!([["left", "right"]]));
    assert_eq!(implement["status"], "succeeded");
    let scope = report["stage_trail"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["number"] == 1)
        .unwrap();
    assert!(scope.get("degraded").is_none());
}

#[tokio::test]
async fn test_non_load_bearing_failure_does_not_halt() {
    let harness = Harness::new();
    succeed(&harness.registry, "scope");
    fail(&harness.registry, "optional", "lint noise");
    let catalog = Catalog::new(
        vec![frame("scope", &[]), frame("optional", &[])],
        vec![scaffold("release", &[(1, &["scope"]), (4, &["optional"])])],
    )
    .unwrap();
    let reports = TempDir::new().unwrap();
    let orchestrator =
        ScaffoldOrchestrator::new(Arc::new(catalog), harness.coordinator(2, 1), reports.path());

    let status = orchestrator.run("release", json!({})).await.unwrap();

    assert!(status.is_complete());
    let report = read_json(status.report_path());
    assert_eq!(report["frame_errors"][0]["frame_id"], "optional");
    assert_eq!(report["summary"]["frames_failed"], 1);
}

#[tokio::test]
async fn test_publisher_receives_final_results() {
    let harness = Harness::new();
    for id in ["scope", "build", "ship"] {
        succeed(&harness.registry, id);
    }
    let publisher = Arc::new(RecordingPublisher::default());
    let reports = TempDir::new().unwrap();
    let orchestrator = ScaffoldOrchestrator::new(
        publishing_catalog(),
        harness.coordinator(2, 2),
        reports.path(),
    )
    .with_publisher(publisher.clone());

    let status = orchestrator.run("release", json!({})).await.unwrap();

    assert!(status.is_complete());
    let requests = publisher.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].scaffold_id, "release");
    assert_eq!(requests[0].results["ship"], true);
    assert_eq!(requests[0].results["build"], true);

    let report = read_json(status.report_path());
    assert_eq!(report["published_to"], format!("memory://{}", status.run_id()));
    assert_eq!(reports_with_prefix(reports.path(), "scaffold_execution_").len(), 1);
}

#[tokio::test]
async fn test_publish_failure_halts_at_publish_stage() {
    let harness = Harness::new();
    for id in ["scope", "build", "ship"] {
        succeed(&harness.registry, id);
    }
    let reports = TempDir::new().unwrap();
    let orchestrator = ScaffoldOrchestrator::new(
        publishing_catalog(),
        harness.coordinator(2, 2),
        reports.path(),
    )
    .with_publisher(Arc::new(RejectingPublisher));

    let status = orchestrator.run("release", json!({})).await.unwrap();

    match &status {
        RunStatus::Error { stage, error, .. } => {
            assert_eq!(*stage, Stage::Publish);
            assert!(error.contains("registry offline"));
        }
        other => panic!("expected halt, got {:?}", other),
    }
    let report = read_json(status.report_path());
    assert_eq!(report["error"]["kind"], "PublishFailed");
}

#[tokio::test]
async fn test_failed_publish_stage_skips_publisher() {
    let harness = Harness::new();
    succeed(&harness.registry, "scope");
    succeed(&harness.registry, "build");
    fail(&harness.registry, "ship", "upload rejected");
    let publisher = Arc::new(RecordingPublisher::default());
    let reports = TempDir::new().unwrap();
    let orchestrator = ScaffoldOrchestrator::new(
        publishing_catalog(),
        harness.coordinator(2, 1),
        reports.path(),
    )
    .with_publisher(publisher.clone());

    let status = orchestrator.run("release", json!({})).await.unwrap();

    assert!(status.is_complete());
    assert!(publisher.requests.lock().is_empty());
    assert!(read_json(status.report_path())["published_to"].is_null());
}

#[tokio::test]
async fn test_preserved_context_merges_across_runs() {
    let harness = Harness::new();
    succeed(&harness.registry, "scope");
    register(&harness.registry, "remember", |input| {
        let runs = input
            .preserved_context
            .get("runs_seen")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(result(&[("runs_seen", json!(runs + 1))]))
    });
    let catalog = Arc::new(
        Catalog::new(
            vec![frame("scope", &[]), frame("remember", &[])],
            vec![scaffold("memo", &[(1, &["scope"]), (7, &["remember"])])],
        )
        .unwrap(),
    );
    let store = Arc::new(RunStore::temporary().unwrap());
    let reports = TempDir::new().unwrap();
    let orchestrator = ScaffoldOrchestrator::new(catalog, harness.coordinator(2, 2), reports.path())
        .with_store(Arc::clone(&store));

    let first = orchestrator.run("memo", json!({})).await.unwrap();
    let second = orchestrator.run("memo", json!({})).await.unwrap();

    assert_ne!(first.run_id(), second.run_id());
    let report = read_json(second.report_path());
    assert_eq!(report["preserved_context_merges"], 2);
    assert_eq!(report["final_results"]["runs_seen"], 2);

    let context = store.load_context("memo").unwrap().unwrap();
    assert_eq!(context.merge_count, 2);
    assert_eq!(context.data["runs_seen"], 2);
}

#[tokio::test]
async fn test_unmet_scaffold_criteria_still_completes() {
    let harness = Harness::new();
    register(&harness.registry, "scope", |_| Ok(result(&[("coverage", json!(70))])));
    let mut audit = scaffold("audit", &[(1, &["scope"])]);
    audit.success_criteria.insert("coverage".into(), json!(90));
    audit.success_criteria.insert("signed".into(), json!(true));
    let catalog = Arc::new(Catalog::new(vec![frame("scope", &[])], vec![audit]).unwrap());
    let reports = TempDir::new().unwrap();
    let orchestrator = ScaffoldOrchestrator::new(catalog, harness.coordinator(1, 1), reports.path());

    let status = orchestrator.run("audit", json!({})).await.unwrap();

    match &status {
        RunStatus::Complete {
            criteria_satisfied, ..
        } => assert!(!criteria_satisfied),
        other => panic!("expected completion, got {:?}", other),
    }
    let report = read_json(status.report_path());
    assert_eq!(report["scaffold_criteria"]["missing"], json!(["signed"]));
    assert_eq!(report["scaffold_criteria"]["mismatched"][0]["key"], "coverage");
}

#[tokio::test]
async fn test_unknown_scaffold_writes_no_report() {
    let harness = Harness::new();
    let reports = TempDir::new().unwrap();
    let orchestrator = ScaffoldOrchestrator::new(
        publishing_catalog(),
        harness.coordinator(1, 1),
        reports.path(),
    );

    let err = orchestrator.run("ghost", json!({})).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::Catalog(CatalogError::ScaffoldNotFound(_))
    ));
    assert!(reports_with_prefix(reports.path(), "scaffold_").is_empty());
}
