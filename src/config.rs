//! Configuration System
//!
//! Layered engine configuration: built-in defaults, the global config file,
//! workspace files and `SCAFFOLD__*` environment variables, in increasing
//! precedence. Every section deserializes with serde defaults so a partial
//! file is always valid input.

use crate::admission::ResourceType;
use crate::recovery::{FailureCategory, RecoveryAction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use crate::logging::LoggingConfig;

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub admission: AdmissionConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Per-frame attempt loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Attempt ceiling per frame dispatch
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Timeout applied when a frame declares no `timeout_secs`
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Upper bound for timeouts raised by recovery
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_timeout_secs() -> u64 {
    1800
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            default_timeout_secs: default_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Width of the worker pool used for each dependency group
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_max_workers() -> usize {
    4
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

/// Per-agent ceilings, one amount per resource type.
///
/// Units: cpu in percent, memory and disk in GB, network in Mbps, gpu in
/// devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCeilings {
    #[serde(default = "default_cpu_ceiling")]
    pub cpu: f64,
    #[serde(default = "default_memory_ceiling")]
    pub memory: f64,
    #[serde(default = "default_disk_ceiling")]
    pub disk: f64,
    #[serde(default = "default_network_ceiling")]
    pub network: f64,
    #[serde(default = "default_gpu_ceiling")]
    pub gpu: f64,
}

fn default_cpu_ceiling() -> f64 {
    25.0
}

fn default_memory_ceiling() -> f64 {
    4.0
}

fn default_disk_ceiling() -> f64 {
    10.0
}

fn default_network_ceiling() -> f64 {
    100.0
}

fn default_gpu_ceiling() -> f64 {
    1.0
}

impl Default for ResourceCeilings {
    fn default() -> Self {
        Self {
            cpu: default_cpu_ceiling(),
            memory: default_memory_ceiling(),
            disk: default_disk_ceiling(),
            network: default_network_ceiling(),
            gpu: default_gpu_ceiling(),
        }
    }
}

impl ResourceCeilings {
    pub fn get(&self, resource: ResourceType) -> f64 {
        match resource {
            ResourceType::Cpu => self.cpu,
            ResourceType::Memory => self.memory,
            ResourceType::Disk => self.disk,
            ResourceType::Network => self.network,
            ResourceType::Gpu => self.gpu,
        }
    }

    pub fn set(&mut self, resource: ResourceType, amount: f64) {
        match resource {
            ResourceType::Cpu => self.cpu = amount,
            ResourceType::Memory => self.memory = amount,
            ResourceType::Disk => self.disk = amount,
            ResourceType::Network => self.network = amount,
            ResourceType::Gpu => self.gpu = amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default)]
    pub per_agent_ceiling: ResourceCeilings,

    /// Seconds between sweeps of expired allocations
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Network capacity reported by the system probe (not sampled)
    #[serde(default = "default_network_capacity_mbps")]
    pub network_capacity_mbps: f64,

    /// GPU devices reported by the system probe (not sampled)
    #[serde(default)]
    pub gpu_capacity: f64,

    /// Retired allocations kept in memory
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_sweep_interval_secs() -> u64 {
    10
}

fn default_network_capacity_mbps() -> f64 {
    1000.0
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            per_agent_ceiling: ResourceCeilings::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
            network_capacity_mbps: default_network_capacity_mbps(),
            gpu_capacity: 0.0,
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Category name (`timeout` or `timeout_error`) to ordered action names.
    /// Listed categories replace the built-in strategy.
    #[serde(default)]
    pub strategies: BTreeMap<String, Vec<String>>,

    /// Command prefix for `install_dependency`; the action fails without one.
    #[serde(default)]
    pub install_command: Option<String>,

    /// Recovery records kept in memory
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl RecoveryConfig {
    pub const DEFAULT_HISTORY_LIMIT: usize = 1000;
}

fn default_history_limit() -> usize {
    RecoveryConfig::DEFAULT_HISTORY_LIMIT
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            strategies: BTreeMap::new(),
            install_command: None,
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Catalog document, relative to the workspace root
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Directory for execution and failure reports
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    /// Persist preserved contexts and execution records
    #[serde(default = "default_true")]
    pub store_enabled: bool,

    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Parameter set on every frame when the gate restarts from stage 2
    #[serde(default = "default_restart_overlay_key")]
    pub restart_overlay_key: String,

    /// Commit published results into this git repository, relative to the
    /// workspace root. Results go to `<reports_dir>/published` when unset.
    #[serde(default)]
    pub publish_git_repo: Option<PathBuf>,

    /// Remote pushed after each publish commit; nothing is pushed when unset
    #[serde(default)]
    pub publish_git_remote: Option<String>,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("scaffolds.toml")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from(".scaffold/reports")
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".scaffold/store")
}

fn default_restart_overlay_key() -> String {
    "alternate_strategy".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            reports_dir: default_reports_dir(),
            store_enabled: true,
            store_path: default_store_path(),
            restart_overlay_key: default_restart_overlay_key(),
            publish_git_repo: None,
            publish_git_remote: None,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Executor(String),
    Coordinator(String),
    Admission(String),
    Recovery(String),
    Orchestrator(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Executor(msg) => write!(f, "executor: {}", msg),
            ValidationError::Coordinator(msg) => write!(f, "coordinator: {}", msg),
            ValidationError::Admission(msg) => write!(f, "admission: {}", msg),
            ValidationError::Recovery(msg) => write!(f, "recovery: {}", msg),
            ValidationError::Orchestrator(msg) => write!(f, "orchestrator: {}", msg),
            ValidationError::Logging(msg) => write!(f, "logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl EngineConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.executor.max_attempts < 1 {
            errors.push(ValidationError::Executor(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.executor.default_timeout_secs == 0 {
            errors.push(ValidationError::Executor(
                "default_timeout_secs must be positive".to_string(),
            ));
        }
        if self.executor.max_timeout_secs < self.executor.default_timeout_secs {
            errors.push(ValidationError::Executor(format!(
                "max_timeout_secs ({}) is below default_timeout_secs ({})",
                self.executor.max_timeout_secs, self.executor.default_timeout_secs
            )));
        }

        if self.coordinator.max_workers < 1 {
            errors.push(ValidationError::Coordinator(
                "max_workers must be at least 1".to_string(),
            ));
        }

        for resource in ResourceType::ALL {
            let ceiling = self.admission.per_agent_ceiling.get(resource);
            if !(ceiling > 0.0) || !ceiling.is_finite() {
                errors.push(ValidationError::Admission(format!(
                    "per_agent_ceiling.{} must be positive (got {})",
                    resource.as_str(),
                    ceiling
                )));
            }
        }
        if self.admission.sweep_interval_secs == 0 {
            errors.push(ValidationError::Admission(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.admission.network_capacity_mbps < 0.0 || self.admission.gpu_capacity < 0.0 {
            errors.push(ValidationError::Admission(
                "configured capacities cannot be negative".to_string(),
            ));
        }
        if self.admission.history_limit == 0 {
            errors.push(ValidationError::Admission(
                "history_limit must be positive".to_string(),
            ));
        }

        for (category, actions) in &self.recovery.strategies {
            if let Err(e) = category.parse::<FailureCategory>() {
                errors.push(ValidationError::Recovery(e));
            }
            if actions.is_empty() {
                errors.push(ValidationError::Recovery(format!(
                    "strategy for {} lists no actions",
                    category
                )));
            }
            for action in actions {
                if let Err(e) = action.parse::<RecoveryAction>() {
                    errors.push(ValidationError::Recovery(e));
                }
            }
        }
        if self.recovery.history_limit == 0 {
            errors.push(ValidationError::Recovery(
                "history_limit must be positive".to_string(),
            ));
        }

        if self.orchestrator.reports_dir.as_os_str().is_empty() {
            errors.push(ValidationError::Orchestrator(
                "reports_dir cannot be empty".to_string(),
            ));
        }
        if self.orchestrator.store_enabled && self.orchestrator.store_path.as_os_str().is_empty() {
            errors.push(ValidationError::Orchestrator(
                "store_path cannot be empty when the store is enabled".to_string(),
            ));
        }
        if self.orchestrator.restart_overlay_key.trim().is_empty() {
            errors.push(ValidationError::Orchestrator(
                "restart_overlay_key cannot be empty".to_string(),
            ));
        }

        if let Err(e) = self.logging.parsed_format() {
            errors.push(ValidationError::Logging(e.to_string()));
        }
        if let Err(e) = self.logging.parsed_output() {
            errors.push(ValidationError::Logging(e.to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
