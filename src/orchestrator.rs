//! Scaffold Orchestrator
//!
//! Drives a scaffold through its eight stages. Each stage's frames run as one
//! coordinator batch and the stage aggregate is folded into
//! `previous_results["stage_<n>"]` for the stages after it. The
//! success-continue gate may restart the run from the analysis stage once.
//! A run ends with exactly one report: an execution report on completion or
//! a failure report on halt.

pub mod publish;
pub mod report;
pub mod restart;
pub mod stage;

pub use publish::{GitPublisher, PublishRequest, Publisher, ReportDirPublisher};
pub use report::{ExecutionReport, FailureReport, ReportWriter};
pub use restart::{AlternateStrategy, NoRestart, RestartDirective, RestartPolicy};
pub use stage::{CriteriaCheck, GateEvaluation, StageRecord, StageStatus};

use crate::admission::AdmissionController;
use crate::capability::CapabilityRegistry;
use crate::catalog::{Catalog, ResultMap, Scaffold, Stage};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::execution::{
    BatchContext, ExecutionHistory, FrameExecutor, FrameReport, ParallelCoordinator,
};
use crate::recovery::RecoveryManager;
use crate::store::RunStore;
use chrono::{DateTime, Utc};
use report::{FailureInfo, HaltContext, ReportMetadata, RunRecord};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of one scaffold run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Complete {
        run_id: String,
        report_path: PathBuf,
        criteria_satisfied: bool,
    },
    Error {
        run_id: String,
        report_path: PathBuf,
        stage: Stage,
        error: String,
    },
}

impl RunStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, RunStatus::Complete { .. })
    }

    pub fn run_id(&self) -> &str {
        match self {
            RunStatus::Complete { run_id, .. } | RunStatus::Error { run_id, .. } => run_id,
        }
    }

    pub fn report_path(&self) -> &Path {
        match self {
            RunStatus::Complete { report_path, .. } | RunStatus::Error { report_path, .. } => {
                report_path
            }
        }
    }
}

struct RunState {
    run_id: String,
    scaffold: Arc<Scaffold>,
    input: Arc<Value>,
    preserved: Arc<ResultMap>,
    previous_results: ResultMap,
    /// Results of every successful frame, merged in stage order.
    final_results: ResultMap,
    trail: Vec<StageRecord>,
    overlay: BTreeMap<String, Value>,
    restart: Option<RestartDirective>,
    published_to: Option<String>,
    pass: u32,
    started_at: DateTime<Utc>,
}

impl RunState {
    /// Most recent record of `stage` in the trail.
    fn latest(&self, stage: Stage) -> Option<&StageRecord> {
        self.trail.iter().rev().find(|r| r.stage == stage)
    }
}

struct Halt {
    stage: Stage,
    error: EngineError,
    triggering: Vec<FrameReport>,
}

pub struct ScaffoldOrchestrator {
    catalog: Arc<Catalog>,
    coordinator: Arc<ParallelCoordinator>,
    restart_policy: Arc<dyn RestartPolicy>,
    publisher: Arc<dyn Publisher>,
    reports: ReportWriter,
    store: Option<Arc<RunStore>>,
    sweep_interval: Option<Duration>,
}

impl ScaffoldOrchestrator {
    /// Orchestrator with the alternate-strategy restart policy and a
    /// publisher writing into `<reports_dir>/published`.
    pub fn new(
        catalog: Arc<Catalog>,
        coordinator: Arc<ParallelCoordinator>,
        reports_dir: impl Into<PathBuf>,
    ) -> Self {
        let reports_dir = reports_dir.into();
        Self {
            catalog,
            coordinator,
            restart_policy: Arc::new(AlternateStrategy::default()),
            publisher: Arc::new(ReportDirPublisher::new(reports_dir.join("published"))),
            reports: ReportWriter::new(reports_dir),
            store: None,
            sweep_interval: None,
        }
    }

    /// Wire every component from configuration. Relative paths resolve
    /// against `workspace_root`.
    pub fn from_config(
        catalog: Arc<Catalog>,
        registry: Arc<CapabilityRegistry>,
        config: &EngineConfig,
        workspace_root: &Path,
    ) -> Result<Self, EngineError> {
        let orchestrator_config = &config.orchestrator;
        let store = if orchestrator_config.store_enabled {
            let path = workspace_root.join(&orchestrator_config.store_path);
            Some(Arc::new(RunStore::open(path)?))
        } else {
            None
        };
        let history = match &store {
            Some(store) => ExecutionHistory::with_store(Arc::clone(store)),
            None => ExecutionHistory::new(),
        };
        let executor = FrameExecutor::new(
            registry,
            Arc::new(AdmissionController::with_system_probe(config.admission.clone())),
            Arc::new(RecoveryManager::from_config(&config.recovery)?),
            Arc::new(history),
            config.executor.clone(),
        );
        let coordinator = ParallelCoordinator::new(Arc::new(executor), config.coordinator.clone());

        let mut orchestrator = Self::new(
            catalog,
            Arc::new(coordinator),
            workspace_root.join(&orchestrator_config.reports_dir),
        )
        .with_restart_policy(Arc::new(AlternateStrategy::new(
            orchestrator_config.restart_overlay_key.clone(),
        )))
        .with_sweeper(Duration::from_secs(config.admission.sweep_interval_secs));
        if let Some(repo) = &orchestrator_config.publish_git_repo {
            let mut publisher = GitPublisher::new(workspace_root.join(repo));
            if let Some(remote) = &orchestrator_config.publish_git_remote {
                publisher = publisher.with_remote(remote.clone());
            }
            orchestrator = orchestrator.with_publisher(Arc::new(publisher));
        }
        orchestrator.store = store;
        Ok(orchestrator)
    }

    pub fn with_restart_policy(mut self, policy: Arc<dyn RestartPolicy>) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_store(mut self, store: Arc<RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sweep expired allocations every `interval` while a run is active.
    pub fn with_sweeper(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn coordinator(&self) -> &Arc<ParallelCoordinator> {
        &self.coordinator
    }

    pub fn reports_dir(&self) -> &Path {
        self.reports.dir()
    }

    /// Run a scaffold end to end.
    ///
    /// Returns `Err` only when the run cannot start (unknown scaffold,
    /// unreadable store) or its report cannot be written. Halts are reported
    /// through [`RunStatus::Error`] with the failure report path.
    pub async fn run(&self, scaffold_id: &str, input: Value) -> Result<RunStatus, EngineError> {
        let scaffold = self.catalog.get_scaffold(scaffold_id)?;
        let preserved = match &self.store {
            Some(store) => store
                .load_context(scaffold_id)?
                .map(|c| c.data)
                .unwrap_or_default(),
            None => ResultMap::new(),
        };
        let mut state = RunState {
            run_id: uuid::Uuid::new_v4().to_string(),
            scaffold,
            input: Arc::new(input),
            preserved: Arc::new(preserved),
            previous_results: ResultMap::new(),
            final_results: ResultMap::new(),
            trail: Vec::new(),
            overlay: BTreeMap::new(),
            restart: None,
            published_to: None,
            pass: 1,
            started_at: Utc::now(),
        };
        info!(
            run_id = %state.run_id,
            scaffold_id,
            preserved_keys = state.preserved.len(),
            "Scaffold run started"
        );

        let sweeper = self
            .sweep_interval
            .map(|interval| self.coordinator.executor().admission().start_sweeper(interval));
        let halt = self.drive(&mut state).await;
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }

        match halt? {
            None => self.complete(state),
            Some(halt) => self.fail(state, halt),
        }
    }

    async fn drive(&self, state: &mut RunState) -> Result<Option<Halt>, EngineError> {
        let mut stage = Stage::Scope;
        loop {
            let mut gate = None;
            if stage == Stage::SuccessContinue {
                let evaluation = GateEvaluation::evaluate(state.latest(Stage::IdentifyAnalyze));
                if !evaluation.passed {
                    let directive = match state.restart {
                        None => self.restart_policy.plan_restart(&evaluation),
                        Some(_) => None,
                    };
                    let already_restarted = state.restart.is_some();
                    state
                        .trail
                        .push(StageRecord::gate_failed(state.pass, evaluation.clone()));
                    match directive {
                        Some(directive) => {
                            warn!(
                                run_id = %state.run_id,
                                policy = %directive.policy,
                                reason = %evaluation.reason,
                                "Success-continue gate failed; restarting from stage 2"
                            );
                            state.overlay.extend(directive.overlay.clone());
                            state.restart = Some(directive);
                            state.pass += 1;
                            stage = Stage::IdentifyAnalyze;
                            continue;
                        }
                        None => {
                            let reason = if already_restarted {
                                format!(
                                    "success-continue gate failed again after restart: {}",
                                    evaluation.reason
                                )
                            } else {
                                format!("success-continue gate failed: {}", evaluation.reason)
                            };
                            return Ok(Some(Halt {
                                stage,
                                error: EngineError::StageHalted { stage, reason },
                                triggering: Vec::new(),
                            }));
                        }
                    }
                }
                gate = Some(evaluation);
            }

            let (mut record, halting) = self.run_stage(state, stage).await?;
            record.gate = gate;
            let succeeded = record.status == StageStatus::Succeeded;
            state.trail.push(record);

            if !halting.is_empty() {
                let frames: Vec<&str> = halting.iter().map(|f| f.frame_id.as_str()).collect();
                let reason = format!(
                    "load-bearing frame(s) failed terminally: {}",
                    frames.join(", ")
                );
                warn!(run_id = %state.run_id, %stage, %reason, "Halting scaffold");
                return Ok(Some(Halt {
                    stage,
                    error: EngineError::StageHalted { stage, reason },
                    triggering: halting,
                }));
            }

            if stage == Stage::Publish && !state.scaffold.frame_ids(stage).is_empty() {
                if succeeded {
                    match self.publish(state).await {
                        Ok(location) => state.published_to = Some(location),
                        Err(error) => {
                            return Ok(Some(Halt {
                                stage,
                                error,
                                triggering: Vec::new(),
                            }))
                        }
                    }
                } else {
                    warn!(run_id = %state.run_id, "Publish stage did not succeed; results not published");
                }
            }

            match stage.next() {
                Some(next) => stage = next,
                None => return Ok(None),
            }
        }
    }

    /// Run one stage and fold its aggregate into the run state. Returns the
    /// stage record and the reports of load-bearing frames that failed
    /// terminally.
    async fn run_stage(
        &self,
        state: &mut RunState,
        stage: Stage,
    ) -> Result<(StageRecord, Vec<FrameReport>), EngineError> {
        let frames = self.catalog.frames_for_stage(&state.scaffold, stage)?;
        if frames.is_empty() {
            info!(run_id = %state.run_id, %stage, "Stage has no frames");
            let record = StageRecord::empty(stage, state.pass);
            state
                .previous_results
                .insert(stage.result_key(), record.aggregate(ResultMap::new()));
            return Ok((record, Vec::new()));
        }

        let started_at = Utc::now();
        let mut batch = BatchContext::new(state.run_id.clone(), stage, Value::Null)
            .with_previous_results(Arc::new(state.previous_results.clone()))
            .with_preserved_context(Arc::clone(&state.preserved))
            .with_overlay(state.overlay.clone());
        batch.input = Arc::clone(&state.input);

        info!(run_id = %state.run_id, %stage, frames = frames.len(), pass = state.pass, "Stage started");
        let outcome = self.coordinator.run(&frames, &batch).await;
        let record = StageRecord::from_batch(stage, state.pass, &outcome, started_at);
        info!(
            run_id = %state.run_id,
            %stage,
            successful = record.successful_frames,
            failed = record.failed_frames,
            blocked = record.blocked_frames,
            "Stage finished"
        );

        let halting = frames
            .iter()
            .filter(|frame| state.scaffold.is_load_bearing(frame))
            .filter_map(|frame| outcome.outcome(&frame.id))
            .filter(|o| o.is_halting())
            .map(|o| o.report())
            .collect();

        let merged = outcome.merged_results();
        state.final_results.extend(merged.clone());
        state
            .previous_results
            .insert(stage.result_key(), record.aggregate(merged));
        Ok((record, halting))
    }

    async fn publish(&self, state: &RunState) -> Result<String, EngineError> {
        let request = PublishRequest {
            run_id: state.run_id.clone(),
            scaffold_id: state.scaffold.id.clone(),
            scaffold_version: state.scaffold.version.clone(),
            results: state.final_results.clone(),
            published_at: Utc::now(),
        };
        self.publisher.publish(&request).await
    }

    fn run_record(&self, state: &RunState) -> RunRecord {
        let end_time = Utc::now();
        let history = self.coordinator.executor().history();
        let scaffold_frames: HashSet<&str> = state
            .scaffold
            .stages
            .values()
            .flatten()
            .map(String::as_str)
            .collect();
        let recovery_history = self
            .coordinator
            .executor()
            .recovery()
            .history()
            .into_iter()
            .filter(|r| r.timestamp >= state.started_at)
            .filter(|r| scaffold_frames.contains(r.frame_id.as_str()))
            .collect();
        RunRecord {
            metadata: ReportMetadata {
                scaffold_id: state.scaffold.id.clone(),
                scaffold_name: state.scaffold.name.clone(),
                scaffold_version: state.scaffold.version.clone(),
                run_id: state.run_id.clone(),
                engine_version: env!("CARGO_PKG_VERSION"),
                start_time: state.started_at,
                end_time,
                duration_ms: (end_time - state.started_at).num_milliseconds(),
            },
            stage_trail: state.trail.clone(),
            restart: state.restart.clone(),
            batches: history.batches_for_run(&state.run_id),
            execution_history: history.records_for_run(&state.run_id),
            recovery_history,
        }
    }

    fn complete(&self, state: RunState) -> Result<RunStatus, EngineError> {
        let criteria = CriteriaCheck::evaluate(&state.scaffold.success_criteria, &state.final_results);
        if !criteria.satisfied {
            warn!(
                run_id = %state.run_id,
                missing = ?criteria.missing,
                mismatched = criteria.mismatched.len(),
                "Scaffold success criteria not met"
            );
        }

        let merges = match &self.store {
            Some(store) => {
                let context = store.save_context(&state.scaffold.id, &state.final_results)?;
                store.flush()?;
                Some(context.merge_count)
            }
            None => None,
        };

        let run = self.run_record(&state);
        let report = ExecutionReport::new(
            run,
            criteria.clone(),
            state.final_results,
            state.published_to,
            merges,
        );
        let report_path = self.reports.write_execution(&report)?;
        info!(
            run_id = %state.run_id,
            criteria_satisfied = criteria.satisfied,
            report = %report_path.display(),
            "Scaffold run complete"
        );
        Ok(RunStatus::Complete {
            run_id: state.run_id,
            report_path,
            criteria_satisfied: criteria.satisfied,
        })
    }

    fn fail(&self, state: RunState, halt: Halt) -> Result<RunStatus, EngineError> {
        let run = self.run_record(&state);
        let kind = match &halt.error {
            EngineError::StageHalted { .. } => "StageHalted",
            EngineError::Publish(_) => "PublishFailed",
            _ => "EngineError",
        };
        let message = halt.error.to_string();
        let report = FailureReport::new(
            run,
            FailureInfo {
                kind: kind.to_string(),
                message: message.clone(),
                stage: halt.stage,
                triggering_frames: halt.triggering,
            },
            HaltContext {
                input: Value::clone(&state.input),
                previous_results: state.previous_results.clone(),
                preserved_context: ResultMap::clone(&state.preserved),
            },
        );
        let report_path = self.reports.write_failure(&report)?;
        warn!(
            run_id = %state.run_id,
            stage = %halt.stage,
            error = %message,
            report = %report_path.display(),
            "Scaffold run halted"
        );
        Ok(RunStatus::Error {
            run_id: state.run_id,
            report_path,
            stage: halt.stage,
            error: message,
        })
    }
}
