//! Catalog model: frames, scaffolds, and the fixed stage enumeration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// Structured result returned by a capability.
pub type ResultMap = Map<String, Value>;

/// Parameter key for the per-attempt cooperative timeout.
pub const PARAM_TIMEOUT_SECS: &str = "timeout_secs";
/// Parameter key for per-attempt resource demands (`{"cpu": 10.0, ...}`).
pub const PARAM_RESOURCES: &str = "resources";
/// Parameter key for the admission priority of resource demands.
pub const PARAM_PRIORITY: &str = "priority";

/// Pipeline stages, in their fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scope = 1,
    IdentifyAnalyze = 2,
    Plan = 3,
    Implement = 4,
    SuccessContinue = 5,
    FinalAudit = 6,
    UpdateRegisters = 7,
    Publish = 8,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Scope,
        Stage::IdentifyAnalyze,
        Stage::Plan,
        Stage::Implement,
        Stage::SuccessContinue,
        Stage::FinalAudit,
        Stage::UpdateRegisters,
        Stage::Publish,
    ];

    pub fn from_number(number: u8) -> Option<Stage> {
        Stage::ALL.get(usize::from(number).checked_sub(1)?).copied()
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Scope => "SCOPE",
            Stage::IdentifyAnalyze => "IDENTIFY_ANALYZE",
            Stage::Plan => "PLAN",
            Stage::Implement => "IMPLEMENT",
            Stage::SuccessContinue => "SUCCESS_CONTINUE",
            Stage::FinalAudit => "FINAL_AUDIT",
            Stage::UpdateRegisters => "UPDATE_REGISTERS",
            Stage::Publish => "PUBLISH",
        }
    }

    /// Key under which this stage's aggregate result is folded into `previous_results`.
    pub fn result_key(self) -> String {
        format!("stage_{}", self.number())
    }

    pub fn next(self) -> Option<Stage> {
        Stage::from_number(self.number() + 1)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

/// How a frame's entry point is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    InProcess,
    Process,
    Remote,
}

impl CapabilityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityKind::InProcess => "in_process",
            CapabilityKind::Process => "process",
            CapabilityKind::Remote => "remote",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

/// A schedulable unit of work. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    pub name: String,
    pub capability_kind: CapabilityKind,
    pub entry_point: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub rollback_description: String,
    #[serde(default = "default_version")]
    pub version: String,
    // Tables last so the TOML rendering stays valid.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub success_criteria: BTreeMap<String, Value>,
}

impl Frame {
    pub fn depends_on(&self, frame_id: &str) -> bool {
        self.dependencies.iter().any(|dep| dep == frame_id)
    }

    /// Timeout declared through the `timeout_secs` parameter, if any.
    pub fn declared_timeout(&self) -> Option<Duration> {
        self.parameters
            .get(PARAM_TIMEOUT_SECS)
            .and_then(Value::as_u64)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Collapse duplicate dependency ids, keeping the first occurrence.
    pub(crate) fn normalize(&mut self) {
        let mut seen = BTreeSet::new();
        self.dependencies.retain(|dep| seen.insert(dep.clone()));
    }
}

/// A named pipeline of frame references across the eight stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaffold {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Stage number → ordered frame ids.
    #[serde(default)]
    pub stages: BTreeMap<u8, Vec<String>>,
    /// External tool requirements, informational only.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub success_criteria: BTreeMap<String, Value>,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Scaffold {
    pub fn frame_ids(&self, stage: Stage) -> &[String] {
        self.stages
            .get(&stage.number())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// A frame is load-bearing when it promises a field the scaffold itself requires.
    pub fn is_load_bearing(&self, frame: &Frame) -> bool {
        frame
            .success_criteria
            .keys()
            .any(|key| self.success_criteria.contains_key(key))
    }
}
