//! Execution and failure reports. A run writes exactly one of the two.

use crate::catalog::{ResultMap, Stage};
use crate::error::EngineError;
use crate::execution::{BatchSummary, ExecutionRecord, FrameReport};
use crate::orchestrator::restart::RestartDirective;
use crate::orchestrator::stage::{CriteriaCheck, StageRecord, StageStatus};
use crate::recovery::RecoveryRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub scaffold_id: String,
    pub scaffold_name: String,
    pub scaffold_version: String,
    pub run_id: String,
    pub engine_version: &'static str,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub stages_attempted: usize,
    pub stages_succeeded: usize,
    pub stages_failed: usize,
    pub frames_executed: usize,
    pub frames_succeeded: usize,
    pub frames_failed: usize,
    pub frames_blocked: usize,
    pub restarts: usize,
}

impl ReportSummary {
    pub fn from_trail(trail: &[StageRecord], restarts: usize) -> Self {
        let mut summary = Self {
            restarts,
            ..Self::default()
        };
        for record in trail {
            summary.stages_attempted += 1;
            match record.status {
                StageStatus::Succeeded | StageStatus::Empty => summary.stages_succeeded += 1,
                StageStatus::Failed | StageStatus::GateFailed => summary.stages_failed += 1,
            }
            summary.frames_executed += record.successful_frames + record.failed_frames;
            summary.frames_succeeded += record.successful_frames;
            summary.frames_failed += record.failed_frames;
            summary.frames_blocked += record.blocked_frames;
        }
        summary
    }
}

/// Everything a run observed, shared by both report kinds.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub metadata: ReportMetadata,
    pub stage_trail: Vec<StageRecord>,
    pub restart: Option<RestartDirective>,
    pub batches: Vec<BatchSummary>,
    pub execution_history: Vec<ExecutionRecord>,
    pub recovery_history: Vec<RecoveryRecord>,
}

impl RunRecord {
    pub fn frame_errors(&self) -> Vec<FrameReport> {
        self.stage_trail
            .iter()
            .flat_map(StageRecord::frame_errors)
            .cloned()
            .collect()
    }

    pub fn degraded_warnings(&self) -> Vec<String> {
        self.stage_trail
            .iter()
            .filter_map(|r| r.degraded.clone())
            .collect()
    }

    fn summary(&self) -> ReportSummary {
        ReportSummary::from_trail(&self.stage_trail, usize::from(self.restart.is_some()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    pub stage_trail: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<RestartDirective>,
    pub batches: Vec<BatchSummary>,
    pub execution_history: Vec<ExecutionRecord>,
    pub frame_errors: Vec<FrameReport>,
    pub recovery_history: Vec<RecoveryRecord>,
    pub degraded_warnings: Vec<String>,
    pub scaffold_criteria: CriteriaCheck,
    pub final_results: ResultMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserved_context_merges: Option<u64>,
}

impl ExecutionReport {
    pub fn new(
        run: RunRecord,
        scaffold_criteria: CriteriaCheck,
        final_results: ResultMap,
        published_to: Option<String>,
        preserved_context_merges: Option<u64>,
    ) -> Self {
        Self {
            summary: run.summary(),
            frame_errors: run.frame_errors(),
            degraded_warnings: run.degraded_warnings(),
            metadata: run.metadata,
            stage_trail: run.stage_trail,
            restart: run.restart,
            batches: run.batches,
            execution_history: run.execution_history,
            recovery_history: run.recovery_history,
            scaffold_criteria,
            final_results,
            published_to,
            preserved_context_merges,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureInfo {
    /// Taxonomy name, e.g. `StageHalted`.
    pub kind: String,
    pub message: String,
    pub stage: Stage,
    /// Frame failures that triggered the halt, if any.
    pub triggering_frames: Vec<FrameReport>,
}

/// Context visible to the stage that halted.
#[derive(Debug, Clone, Serialize)]
pub struct HaltContext {
    pub input: Value,
    pub previous_results: ResultMap,
    pub preserved_context: ResultMap,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub metadata: ReportMetadata,
    pub error: FailureInfo,
    pub halting_stage: Stage,
    pub context: HaltContext,
    pub summary: ReportSummary,
    pub stage_trail: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<RestartDirective>,
    pub frame_errors: Vec<FrameReport>,
    pub batches: Vec<BatchSummary>,
    pub execution_history: Vec<ExecutionRecord>,
    pub recovery_history: Vec<RecoveryRecord>,
    pub degraded_warnings: Vec<String>,
}

impl FailureReport {
    pub fn new(run: RunRecord, error: FailureInfo, context: HaltContext) -> Self {
        Self {
            summary: run.summary(),
            frame_errors: run.frame_errors(),
            degraded_warnings: run.degraded_warnings(),
            halting_stage: error.stage,
            metadata: run.metadata,
            error,
            context,
            stage_trail: run.stage_trail,
            restart: run.restart,
            batches: run.batches,
            execution_history: run.execution_history,
            recovery_history: run.recovery_history,
        }
    }
}

/// Writes reports as pretty JSON under one directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_execution(&self, report: &ExecutionReport) -> Result<PathBuf, EngineError> {
        self.write("scaffold_execution", &report.metadata, report)
    }

    pub fn write_failure(&self, report: &FailureReport) -> Result<PathBuf, EngineError> {
        self.write("scaffold_failure", &report.metadata, report)
    }

    fn write<T: Serialize>(
        &self,
        prefix: &str,
        metadata: &ReportMetadata,
        report: &T,
    ) -> Result<PathBuf, EngineError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            EngineError::Report(format!(
                "Failed to create reports directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        let file_name = format!(
            "{}_{}_{}.json",
            prefix,
            metadata.scaffold_id,
            metadata.end_time.format("%Y%m%d_%H%M%S_%3f")
        );
        let path = self.dir.join(file_name);
        let bytes = serde_json::to_vec_pretty(report)?;
        std::fs::write(&path, bytes).map_err(|e| {
            EngineError::Report(format!("Failed to write report {}: {}", path.display(), e))
        })?;
        info!(run_id = %metadata.run_id, path = %path.display(), "Report written");
        Ok(path)
    }
}
