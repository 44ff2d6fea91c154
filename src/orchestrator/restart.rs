//! Restart policy for a failed success-continue gate.

use crate::orchestrator::stage::GateEvaluation;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// How the re-run from the analysis stage differs from the first pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestartDirective {
    pub policy: String,
    /// Parameters layered over every frame for the rest of the run.
    pub overlay: BTreeMap<String, Value>,
    pub note: String,
}

/// Decides whether and how to restart after the gate fails. Returning `None`
/// declines the restart and the scaffold halts at the gate. The orchestrator
/// consults the policy at most once per run.
pub trait RestartPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn plan_restart(&self, gate: &GateEvaluation) -> Option<RestartDirective>;
}

/// Re-runs stages 2 through 4 with a flag parameter set on every frame, so
/// frame implementations can switch to their alternate approach.
#[derive(Debug, Clone)]
pub struct AlternateStrategy {
    overlay_key: String,
}

impl AlternateStrategy {
    pub const DEFAULT_KEY: &'static str = "alternate_strategy";

    pub fn new(overlay_key: impl Into<String>) -> Self {
        Self {
            overlay_key: overlay_key.into(),
        }
    }
}

impl Default for AlternateStrategy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_KEY)
    }
}

impl RestartPolicy for AlternateStrategy {
    fn name(&self) -> &str {
        "alternate_strategy"
    }

    fn plan_restart(&self, gate: &GateEvaluation) -> Option<RestartDirective> {
        Some(RestartDirective {
            policy: self.name().to_string(),
            overlay: BTreeMap::from([(self.overlay_key.clone(), Value::Bool(true))]),
            note: format!("restarting from stage 2 after gate failure: {}", gate.reason),
        })
    }
}

/// Never restarts; the first gate failure halts.
#[derive(Debug, Clone, Default)]
pub struct NoRestart;

impl RestartPolicy for NoRestart {
    fn name(&self) -> &str {
        "no_restart"
    }

    fn plan_restart(&self, _gate: &GateEvaluation) -> Option<RestartDirective> {
        None
    }
}
