//! Per-agent ceilings deny requests and resource denials are not retried

use super::test_utils::{frame, succeed, Harness};
use scaffold_engine::admission::{ResourceRequest, ResourceType};
use scaffold_engine::catalog::{Stage, PARAM_RESOURCES};
use scaffold_engine::config::AdmissionConfig;
use scaffold_engine::error::{AdmissionError, FrameError};
use scaffold_engine::execution::BatchContext;
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_request_above_agent_ceiling_is_denied() {
    let harness = Harness::new();
    let err = harness
        .admission
        .request(ResourceRequest::new("agent-1", ResourceType::Cpu, 30.0))
        .unwrap_err();
    assert!(matches!(err, AdmissionError::Denied { .. }));

    let granted = harness
        .admission
        .request(ResourceRequest::new("agent-1", ResourceType::Cpu, 20.0))
        .unwrap();
    assert_eq!(harness.admission.agent_status("agent-1").active.len(), 1);

    harness.admission.release(&granted.allocation_id).unwrap();
    assert_eq!(harness.admission.agent_status("agent-1").active.len(), 0);
}

#[test]
fn test_ceiling_counts_existing_allocations() {
    let harness = Harness::new();
    harness
        .admission
        .request(ResourceRequest::new("agent-2", ResourceType::Cpu, 15.0))
        .unwrap();
    assert!(harness
        .admission
        .request(ResourceRequest::new("agent-2", ResourceType::Cpu, 15.0))
        .is_err());
    // Ceilings are per agent.
    assert!(harness
        .admission
        .request(ResourceRequest::new("agent-3", ResourceType::Cpu, 15.0))
        .is_ok());
}

#[tokio::test]
async fn test_frame_over_ceiling_fails_without_retry() {
    let mut config = AdmissionConfig::default();
    config.per_agent_ceiling.cpu = 25.0;
    let harness = Harness::with_admission(config);
    succeed(&harness.registry, "hungry");
    let mut hungry = frame("hungry", &[]);
    hungry
        .parameters
        .insert(PARAM_RESOURCES.to_string(), json!({"cpu": 30}));

    let outcome = harness
        .coordinator(2, 3)
        .run(
            &[Arc::new(hungry)],
            &BatchContext::new("run-admission", Stage::Implement, json!({})),
        )
        .await;

    let hungry = outcome.outcome("hungry").unwrap();
    assert!(matches!(
        hungry.error,
        Some(FrameError::ResourceUnavailable { .. })
    ));
    assert_eq!(hungry.attempts, 1);
    assert!(hungry.is_halting());
}

#[tokio::test]
async fn test_granted_allocations_are_released_after_attempt() {
    let harness = Harness::new();
    succeed(&harness.registry, "modest");
    let mut modest = frame("modest", &[]);
    modest
        .parameters
        .insert(PARAM_RESOURCES.to_string(), json!({"cpu": 10, "memory": 1}));

    let outcome = harness
        .coordinator(2, 2)
        .run(
            &[Arc::new(modest)],
            &BatchContext::new("run-release", Stage::Implement, json!({})),
        )
        .await;

    assert_eq!(outcome.successful().count(), 1);
    assert_eq!(harness.admission.agent_status("modest").active.len(), 0);
}
