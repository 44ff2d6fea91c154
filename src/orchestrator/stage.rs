//! Stage records, the success-continue gate and scaffold criteria checks.

use crate::catalog::{ResultMap, Stage};
use crate::execution::{BatchOutcome, FrameReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    /// At least one frame failed or was blocked.
    Failed,
    /// No frames bound to the stage.
    Empty,
    /// The success-continue gate rejected the analysis stage.
    GateFailed,
}

/// One entry of the stage trail.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub number: u8,
    pub name: &'static str,
    /// 1 for the first pass, 2 for stages re-run after the gate restart.
    pub pass: u32,
    pub status: StageStatus,
    pub successful_frames: usize,
    pub failed_frames: usize,
    pub blocked_frames: usize,
    pub groups: Vec<Vec<String>>,
    pub frames: Vec<FrameReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateEvaluation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl StageRecord {
    pub fn from_batch(
        stage: Stage,
        pass: u32,
        batch: &BatchOutcome,
        started_at: DateTime<Utc>,
    ) -> Self {
        let successful_frames = batch.successful().count();
        let failed_frames = batch.failed().count();
        let blocked_frames = batch.blocked().count();
        let status = if batch.outcomes.is_empty() {
            StageStatus::Empty
        } else if failed_frames == 0 && blocked_frames == 0 {
            StageStatus::Succeeded
        } else {
            StageStatus::Failed
        };
        Self {
            stage,
            number: stage.number(),
            name: stage.name(),
            pass,
            status,
            successful_frames,
            failed_frames,
            blocked_frames,
            groups: batch.groups.clone(),
            frames: batch.outcomes.iter().map(|o| o.report()).collect(),
            gate: None,
            degraded: batch.degraded.as_ref().map(ToString::to_string),
            started_at,
            duration_ms: batch.summary.wall_clock_ms,
        }
    }

    pub fn empty(stage: Stage, pass: u32) -> Self {
        Self::without_frames(stage, pass, StageStatus::Empty, None)
    }

    pub fn gate_failed(pass: u32, gate: GateEvaluation) -> Self {
        Self::without_frames(Stage::SuccessContinue, pass, StageStatus::GateFailed, Some(gate))
    }

    fn without_frames(
        stage: Stage,
        pass: u32,
        status: StageStatus,
        gate: Option<GateEvaluation>,
    ) -> Self {
        Self {
            stage,
            number: stage.number(),
            name: stage.name(),
            pass,
            status,
            successful_frames: 0,
            failed_frames: 0,
            blocked_frames: 0,
            groups: Vec::new(),
            frames: Vec::new(),
            gate,
            degraded: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Aggregate folded into `previous_results` under `stage_<n>`.
    pub fn aggregate(&self, results: ResultMap) -> Value {
        json!({
            "stage": self.number,
            "name": self.name,
            "status": self.status,
            "successful_frames": self.successful_frames,
            "failed_frames": self.failed_frames,
            "blocked_frames": self.blocked_frames,
            "results": results,
        })
    }

    pub fn frame_errors(&self) -> impl Iterator<Item = &FrameReport> {
        self.frames.iter().filter(|f| f.error.is_some())
    }
}

/// Verdict of the success-continue gate over the analysis stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateEvaluation {
    pub evaluated_stage: Stage,
    pub passed: bool,
    pub successful_frames: usize,
    pub failed_frames: usize,
    pub reason: String,
}

impl GateEvaluation {
    /// Fails when the evaluated stage had no success or any failure. A stage
    /// with no bound frames is a neutral pass.
    pub fn evaluate(record: Option<&StageRecord>) -> Self {
        let evaluated_stage = Stage::IdentifyAnalyze;
        let Some(record) = record.filter(|r| r.status != StageStatus::Empty) else {
            return Self {
                evaluated_stage,
                passed: true,
                successful_frames: 0,
                failed_frames: 0,
                reason: "no frames bound to the analysis stage".to_string(),
            };
        };
        let passed = record.successful_frames > 0 && record.failed_frames == 0;
        let reason = if passed {
            format!("{} frame(s) succeeded", record.successful_frames)
        } else if record.successful_frames == 0 {
            "no analysis frame succeeded".to_string()
        } else {
            format!("{} analysis frame(s) failed", record.failed_frames)
        };
        Self {
            evaluated_stage,
            passed,
            successful_frames: record.successful_frames,
            failed_frames: record.failed_frames,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriteriaMismatch {
    pub key: String,
    pub expected: Value,
    pub actual: Value,
}

/// Scaffold-level success criteria checked against the merged results of
/// every successful frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriteriaCheck {
    pub satisfied: bool,
    pub missing: Vec<String>,
    pub mismatched: Vec<CriteriaMismatch>,
}

impl CriteriaCheck {
    pub fn evaluate(criteria: &BTreeMap<String, Value>, results: &ResultMap) -> Self {
        let mut missing = Vec::new();
        let mut mismatched = Vec::new();
        for (key, expected) in criteria {
            match results.get(key) {
                None => missing.push(key.clone()),
                Some(actual) if actual != expected => mismatched.push(CriteriaMismatch {
                    key: key.clone(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                }),
                Some(_) => {}
            }
        }
        Self {
            satisfied: missing.is_empty() && mismatched.is_empty(),
            missing,
            mismatched,
        }
    }
}
