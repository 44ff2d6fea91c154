//! Append-only execution history: one record per attempt, one summary per batch.

use crate::catalog::Stage;
use crate::recovery::FailureCategory;
use crate::store::RunStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub run_id: String,
    pub sequence: u64,
    pub frame_id: String,
    pub stage: Stage,
    pub attempt: u32,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<FailureCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Record contents before the history assigns a sequence number.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub run_id: String,
    pub frame_id: String,
    pub stage: Stage,
    pub attempt: u32,
    pub duration: Duration,
    pub error: Option<(String, FailureCategory, String)>,
}

/// Run-level summary of one coordinator batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub stage: Stage,
    pub total_frames: usize,
    pub independent_frames: usize,
    pub groups: usize,
    pub successful: usize,
    pub failed: usize,
    pub blocked: usize,
    pub wall_clock_ms: u64,
    pub sum_durations_ms: u64,
    pub speedup: f64,
    pub time_saved_ms: u64,
    pub degraded: bool,
    pub timestamp: DateTime<Utc>,
}

impl BatchSummary {
    pub fn speedup_of(sum: Duration, wall: Duration) -> f64 {
        if wall.is_zero() {
            1.0
        } else {
            sum.as_secs_f64() / wall.as_secs_f64()
        }
    }
}

#[derive(Debug, Default)]
struct HistoryLog {
    next_sequence: u64,
    records: Vec<ExecutionRecord>,
    batches: Vec<BatchSummary>,
}

/// Single-writer log shared by the executor and coordinator. Records are
/// mirrored into the run store when one is attached.
#[derive(Default)]
pub struct ExecutionHistory {
    log: Mutex<HistoryLog>,
    store: Option<Arc<RunStore>>,
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: Arc<RunStore>) -> Self {
        Self {
            log: Mutex::new(HistoryLog::default()),
            store: Some(store),
        }
    }

    pub fn append(&self, attempt: AttemptRecord) -> ExecutionRecord {
        let (error_kind, classification, error_message) = match attempt.error {
            Some((kind, category, message)) => (Some(kind), Some(category), Some(message)),
            None => (None, None, None),
        };
        let record = {
            let mut log = self.log.lock();
            let record = ExecutionRecord {
                run_id: attempt.run_id,
                sequence: log.next_sequence,
                frame_id: attempt.frame_id,
                stage: attempt.stage,
                attempt: attempt.attempt,
                success: error_kind.is_none(),
                duration_ms: millis(attempt.duration),
                error_kind,
                classification,
                error_message,
                timestamp: Utc::now(),
            };
            log.next_sequence += 1;
            log.records.push(record.clone());
            record
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.append_record(&record) {
                warn!(run_id = %record.run_id, sequence = record.sequence, error = %e, "Failed to persist execution record");
            }
        }
        record
    }

    pub fn push_batch(&self, summary: BatchSummary) {
        self.log.lock().batches.push(summary);
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.log.lock().records.clone()
    }

    pub fn records_for_run(&self, run_id: &str) -> Vec<ExecutionRecord> {
        self.log
            .lock()
            .records
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn records_for_frame(&self, frame_id: &str) -> Vec<ExecutionRecord> {
        self.log
            .lock()
            .records
            .iter()
            .filter(|r| r.frame_id == frame_id)
            .cloned()
            .collect()
    }

    pub fn batches(&self) -> Vec<BatchSummary> {
        self.log.lock().batches.clone()
    }

    pub fn batches_for_run(&self, run_id: &str) -> Vec<BatchSummary> {
        self.log
            .lock()
            .batches
            .iter()
            .filter(|b| b.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.log.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
