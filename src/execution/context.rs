//! Per-batch and per-attempt execution context.

use crate::capability::CapabilityInput;
use crate::catalog::{Frame, ResultMap, Stage};
use crate::config::ExecutorConfig;
use crate::recovery::RecoveryAdjustment;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Shared inputs for every frame of one batch.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub run_id: String,
    pub stage: Stage,
    pub input: Arc<Value>,
    /// Aggregate results of the stages already run, keyed `stage_<n>`.
    pub previous_results: Arc<ResultMap>,
    pub preserved_context: Arc<ResultMap>,
    /// Parameters layered over every frame's own parameters.
    pub parameter_overlay: BTreeMap<String, Value>,
}

impl BatchContext {
    pub fn new(run_id: impl Into<String>, stage: Stage, input: Value) -> Self {
        Self {
            run_id: run_id.into(),
            stage,
            input: Arc::new(input),
            previous_results: Arc::new(ResultMap::new()),
            preserved_context: Arc::new(ResultMap::new()),
            parameter_overlay: BTreeMap::new(),
        }
    }

    pub fn with_previous_results(mut self, previous_results: Arc<ResultMap>) -> Self {
        self.previous_results = previous_results;
        self
    }

    pub fn with_preserved_context(mut self, preserved_context: Arc<ResultMap>) -> Self {
        self.preserved_context = preserved_context;
        self
    }

    pub fn with_overlay(mut self, overlay: BTreeMap<String, Value>) -> Self {
        self.parameter_overlay = overlay;
        self
    }
}

/// State of one frame dispatch, advanced in place by the retry loop.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    pub stage: Stage,
    pub frame: Arc<Frame>,
    pub input: Arc<Value>,
    pub previous_results: Arc<ResultMap>,
    pub preserved_context: Arc<ResultMap>,
    pub parameters: BTreeMap<String, Value>,
    /// Failed attempts so far.
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub timeout: Duration,
    max_timeout: Duration,
}

impl ExecutionContext {
    pub fn for_frame(batch: &BatchContext, frame: Arc<Frame>, config: &ExecutorConfig) -> Self {
        let mut parameters = frame.parameters.clone();
        parameters.extend(
            batch
                .parameter_overlay
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let max_timeout = Duration::from_secs(config.max_timeout_secs.max(1));
        let timeout = frame
            .declared_timeout()
            .unwrap_or(Duration::from_secs(config.default_timeout_secs))
            .min(max_timeout);
        Self {
            run_id: batch.run_id.clone(),
            stage: batch.stage,
            input: Arc::clone(&batch.input),
            previous_results: Arc::clone(&batch.previous_results),
            preserved_context: Arc::clone(&batch.preserved_context),
            parameters,
            attempt_count: 0,
            max_attempts: config.max_attempts.max(1),
            timeout,
            max_timeout,
            frame,
        }
    }

    pub fn frame_id(&self) -> &str {
        &self.frame.id
    }

    /// 1-based number of the attempt about to run.
    pub fn attempt_number(&self) -> u32 {
        self.attempt_count + 1
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// Fold a recovery adjustment into the next attempt. Timeouts stay capped.
    pub fn apply(&mut self, adjustment: &RecoveryAdjustment) {
        if let Some(secs) = adjustment.timeout_secs {
            self.timeout = Duration::from_secs(secs).min(self.max_timeout);
        }
        self.parameters.extend(
            adjustment
                .parameters
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }

    pub fn capability_input(&self) -> CapabilityInput {
        CapabilityInput {
            frame_id: self.frame.id.clone(),
            stage: self.stage,
            attempt: self.attempt_number(),
            input: self.input.as_ref().clone(),
            parameters: self.parameters.clone(),
            previous_results: self.previous_results.as_ref().clone(),
            preserved_context: self.preserved_context.as_ref().clone(),
        }
    }
}
