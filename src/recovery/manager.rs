//! Recovery manager: classification, strategy lookup, history and patterns.

use crate::config::RecoveryConfig;
use crate::error::EngineError;
use crate::recovery::actions::{
    ActionResult, BuiltinRemediation, FailureContext, RecoveryAction, RecoveryAdjustment,
    RemediationHandler,
};
use crate::recovery::classify::FailureCategory;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// A single recovery, as recorded in history and reports.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryRecord {
    pub timestamp: DateTime<Utc>,
    pub frame_id: String,
    pub attempt: u32,
    pub category: FailureCategory,
    pub error_message: String,
    pub strategy: Vec<RecoveryAction>,
    pub attempts: Vec<ActionResult>,
    pub successful: bool,
}

/// Per-category counters kept for tuning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternStats {
    pub count: u64,
    pub successful_recoveries: u64,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Result handed back to the executor.
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub category: FailureCategory,
    pub successful: bool,
    pub adjustment: RecoveryAdjustment,
    pub record: RecoveryRecord,
}

pub struct RecoveryManager {
    strategies: BTreeMap<FailureCategory, Vec<RecoveryAction>>,
    handler: Arc<dyn RemediationHandler>,
    history: Mutex<VecDeque<RecoveryRecord>>,
    history_limit: usize,
    patterns: Mutex<BTreeMap<FailureCategory, PatternStats>>,
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::with_handler(
            BTreeMap::new(),
            Arc::new(BuiltinRemediation::default()),
            RecoveryConfig::DEFAULT_HISTORY_LIMIT,
        )
    }
}

impl RecoveryManager {
    /// Manager with the built-in handler and any strategy overrides from config.
    pub fn from_config(config: &RecoveryConfig) -> Result<Self, EngineError> {
        let handler = Arc::new(BuiltinRemediation::new(config.install_command.clone()));
        Self::from_config_with_handler(config, handler)
    }

    pub fn from_config_with_handler(
        config: &RecoveryConfig,
        handler: Arc<dyn RemediationHandler>,
    ) -> Result<Self, EngineError> {
        let mut overrides = BTreeMap::new();
        for (category, actions) in &config.strategies {
            let category: FailureCategory = category.parse().map_err(EngineError::ConfigError)?;
            let actions = actions
                .iter()
                .map(|a| a.parse::<RecoveryAction>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(EngineError::ConfigError)?;
            overrides.insert(category, actions);
        }
        Ok(Self::with_handler(overrides, handler, config.history_limit))
    }

    /// `overrides` replace the built-in strategy for their categories.
    pub fn with_handler(
        overrides: BTreeMap<FailureCategory, Vec<RecoveryAction>>,
        handler: Arc<dyn RemediationHandler>,
        history_limit: usize,
    ) -> Self {
        let strategies = FailureCategory::ALL
            .into_iter()
            .map(|category| {
                let actions = overrides
                    .get(&category)
                    .cloned()
                    .unwrap_or_else(|| RecoveryAction::default_strategy(category));
                (category, actions)
            })
            .collect();
        Self {
            strategies,
            handler,
            history: Mutex::new(VecDeque::new()),
            history_limit: history_limit.max(1),
            patterns: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn classify(&self, message: &str) -> FailureCategory {
        FailureCategory::classify(message)
    }

    pub fn strategy(&self, category: FailureCategory) -> &[RecoveryAction] {
        self.strategies
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Run the category's actions in order until one succeeds, then record
    /// the attempt. An `Unknown` category is reclassified from the message.
    pub async fn recover(&self, mut context: FailureContext) -> RecoveryOutcome {
        let category = match context.category {
            FailureCategory::Unknown => self.classify(&context.error_message),
            category => category,
        };
        context.category = category;
        let strategy = self.strategy(category).to_vec();

        let mut attempts = Vec::with_capacity(strategy.len());
        let mut adjustment = RecoveryAdjustment::default();
        let mut successful = false;
        for action in &strategy {
            let result = self.handler.execute(*action, &context).await;
            debug!(
                frame_id = %context.frame_id,
                action = %action,
                success = result.success,
                "Recovery action executed"
            );
            let done = result.success;
            if done {
                adjustment = result.adjustment.clone();
            }
            attempts.push(result);
            if done {
                successful = true;
                break;
            }
        }

        let record = RecoveryRecord {
            timestamp: Utc::now(),
            frame_id: context.frame_id.clone(),
            attempt: context.attempt,
            category,
            error_message: context.error_message.clone(),
            strategy,
            attempts,
            successful,
        };
        self.remember(&record);
        info!(
            frame_id = %record.frame_id,
            category = %category,
            successful,
            "Recovery attempted"
        );

        RecoveryOutcome {
            category,
            successful,
            adjustment,
            record,
        }
    }

    /// Record a terminal failure: classified and counted, with no actions run.
    pub fn record_terminal(
        &self,
        frame_id: &str,
        attempt: u32,
        category: FailureCategory,
        error_message: &str,
    ) -> RecoveryRecord {
        let record = RecoveryRecord {
            timestamp: Utc::now(),
            frame_id: frame_id.to_string(),
            attempt,
            category,
            error_message: error_message.to_string(),
            strategy: Vec::new(),
            attempts: Vec::new(),
            successful: false,
        };
        self.remember(&record);
        debug!(frame_id, category = %category, attempt, "Terminal failure recorded");
        record
    }

    fn remember(&self, record: &RecoveryRecord) {
        {
            let mut history = self.history.lock();
            if history.len() >= self.history_limit {
                history.pop_front();
            }
            history.push_back(record.clone());
        }
        let mut patterns = self.patterns.lock();
        let stats = patterns.entry(record.category).or_default();
        stats.count += 1;
        stats.last_seen = Some(record.timestamp);
        if record.successful {
            stats.successful_recoveries += 1;
        }
    }

    pub fn history(&self) -> Vec<RecoveryRecord> {
        self.history.lock().iter().cloned().collect()
    }

    /// History entries for one frame.
    pub fn history_for(&self, frame_id: &str) -> Vec<RecoveryRecord> {
        self.history
            .lock()
            .iter()
            .filter(|r| r.frame_id == frame_id)
            .cloned()
            .collect()
    }

    pub fn patterns(&self) -> BTreeMap<FailureCategory, PatternStats> {
        self.patterns.lock().clone()
    }
}
