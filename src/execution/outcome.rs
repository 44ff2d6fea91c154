//! Frame and batch outcomes.

use crate::catalog::{ResultMap, Stage};
use crate::error::FrameError;
use crate::execution::history::{millis, BatchSummary};
use crate::recovery::FailureCategory;
use crate::resolver::CyclicDependencyDegraded;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    Succeeded,
    Failed,
    /// Not dispatched because an in-batch dependency did not succeed.
    Blocked,
}

#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub frame_id: String,
    pub stage: Stage,
    pub status: FrameStatus,
    pub result: Option<ResultMap>,
    pub error: Option<FrameError>,
    pub attempts: u32,
    pub duration: Duration,
    pub blocked_by: Vec<String>,
}

impl FrameOutcome {
    pub fn succeeded(
        frame_id: impl Into<String>,
        stage: Stage,
        result: ResultMap,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            frame_id: frame_id.into(),
            stage,
            status: FrameStatus::Succeeded,
            result: Some(result),
            error: None,
            attempts,
            duration,
            blocked_by: Vec::new(),
        }
    }

    pub fn failed(
        frame_id: impl Into<String>,
        stage: Stage,
        error: FrameError,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            frame_id: frame_id.into(),
            stage,
            status: FrameStatus::Failed,
            result: None,
            error: Some(error),
            attempts,
            duration,
            blocked_by: Vec::new(),
        }
    }

    pub fn blocked(frame_id: impl Into<String>, stage: Stage, blocked_by: Vec<String>) -> Self {
        Self {
            frame_id: frame_id.into(),
            stage,
            status: FrameStatus::Blocked,
            result: None,
            error: None,
            attempts: 0,
            duration: Duration::ZERO,
            blocked_by,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FrameStatus::Succeeded
    }

    /// Terminal failure that halts a scaffold when the frame is load-bearing.
    pub fn is_halting(&self) -> bool {
        self.error.as_ref().is_some_and(FrameError::is_halting)
    }

    pub fn report(&self) -> FrameReport {
        let classification = self.error.as_ref().map(FrameError::category);
        FrameReport {
            frame_id: self.frame_id.clone(),
            stage: self.stage,
            status: self.status,
            attempts: self.attempts,
            duration_ms: millis(self.duration),
            error_kind: self.error.as_ref().map(|e| e.kind().to_string()),
            error: self.error.as_ref().map(ToString::to_string),
            classification,
            blocked_by: self.blocked_by.clone(),
        }
    }
}

/// Serializable view of a frame outcome.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub frame_id: String,
    pub stage: Stage,
    pub status: FrameStatus,
    pub attempts: u32,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<FailureCategory>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Outcomes in plan order (group by group).
    pub outcomes: Vec<FrameOutcome>,
    pub groups: Vec<Vec<String>>,
    pub degraded: Option<CyclicDependencyDegraded>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    pub fn successful(&self) -> impl Iterator<Item = &FrameOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FrameOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == FrameStatus::Failed)
    }

    pub fn blocked(&self) -> impl Iterator<Item = &FrameOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == FrameStatus::Blocked)
    }

    pub fn outcome(&self, frame_id: &str) -> Option<&FrameOutcome> {
        self.outcomes.iter().find(|o| o.frame_id == frame_id)
    }

    /// Results of successful frames merged in plan order; later keys win.
    pub fn merged_results(&self) -> ResultMap {
        let mut merged = ResultMap::new();
        for result in self.successful().filter_map(|o| o.result.as_ref()) {
            merged.extend(result.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}
