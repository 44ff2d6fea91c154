//! Shared builders for integration tests
//!
//! Frames here are in-process and resolved through a per-test registry, so no
//! test touches the network or spawns processes.

use scaffold_engine::admission::{AdmissionController, StaticProbe};
use scaffold_engine::capability::{CapabilityRegistry, InProcessCapability};
use scaffold_engine::catalog::{CapabilityKind, Frame, ResultMap, Scaffold};
use scaffold_engine::config::{AdmissionConfig, CoordinatorConfig, ExecutorConfig};
use scaffold_engine::error::CapabilityError;
use scaffold_engine::execution::{ExecutionHistory, FrameExecutor, ParallelCoordinator};
use scaffold_engine::recovery::RecoveryManager;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn frame(id: &str, deps: &[&str]) -> Frame {
    Frame {
        id: id.to_string(),
        name: id.to_string(),
        capability_kind: CapabilityKind::InProcess,
        entry_point: id.to_string(),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        rollback_description: String::new(),
        version: "1.0".to_string(),
        parameters: BTreeMap::new(),
        success_criteria: BTreeMap::new(),
    }
}

pub fn with_criteria(mut frame: Frame, criteria: &[(&str, Value)]) -> Frame {
    frame.success_criteria = criteria
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    frame
}

pub fn scaffold(id: &str, stages: &[(u8, &[&str])]) -> Scaffold {
    Scaffold {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        stages: stages
            .iter()
            .map(|(n, ids)| (*n, ids.iter().map(|s| s.to_string()).collect()))
            .collect(),
        dependencies: vec![],
        success_criteria: BTreeMap::new(),
        version: "1.0".to_string(),
    }
}

pub fn result(pairs: &[(&str, Value)]) -> ResultMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Register a capability under the frame id it serves.
pub fn register<F>(registry: &CapabilityRegistry, id: &str, func: F)
where
    F: Fn(scaffold_engine::capability::CapabilityInput) -> Result<ResultMap, CapabilityError>
        + Send
        + Sync
        + 'static,
{
    registry.register_in_process(InProcessCapability::new(id, func));
}

pub fn succeed(registry: &CapabilityRegistry, id: &str) {
    let id_owned = id.to_string();
    register(registry, id, move |_| Ok(result(&[(id_owned.as_str(), json!(true))])));
}

pub fn fail(registry: &CapabilityRegistry, id: &str, message: &str) {
    let message = message.to_string();
    register(registry, id, move |_| {
        Err(CapabilityError::Invocation(message.clone()))
    });
}

pub struct Harness {
    pub registry: Arc<CapabilityRegistry>,
    pub admission: Arc<AdmissionController>,
    pub recovery: Arc<RecoveryManager>,
    pub history: Arc<ExecutionHistory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_admission(AdmissionConfig::default())
    }

    /// Admission over a probe reporting 100 units of every resource.
    pub fn with_admission(config: AdmissionConfig) -> Self {
        Self {
            registry: Arc::new(CapabilityRegistry::empty()),
            admission: Arc::new(AdmissionController::new(
                config,
                Arc::new(StaticProbe::uniform(100.0)),
            )),
            recovery: Arc::new(RecoveryManager::default()),
            history: Arc::new(ExecutionHistory::new()),
        }
    }

    pub fn executor(&self, max_attempts: u32) -> Arc<FrameExecutor> {
        Arc::new(FrameExecutor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.admission),
            Arc::clone(&self.recovery),
            Arc::clone(&self.history),
            ExecutorConfig {
                max_attempts,
                default_timeout_secs: 30,
                max_timeout_secs: 60,
            },
        ))
    }

    pub fn coordinator(&self, max_workers: usize, max_attempts: u32) -> Arc<ParallelCoordinator> {
        Arc::new(ParallelCoordinator::new(
            self.executor(max_attempts),
            CoordinatorConfig { max_workers },
        ))
    }
}

/// Report files in `dir` whose name starts with `prefix`.
pub fn reports_with_prefix(dir: &std::path::Path, prefix: &str) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}
