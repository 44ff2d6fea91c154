//! Recovery actions and the handler that carries them out.

use crate::recovery::classify::FailureCategory;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::process::Command;
use tracing::warn;

/// Upper bound for the `increase_timeout` action.
pub const MAX_TIMEOUT_SECS: u64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    IncreaseTimeout,
    Fallback,
    CreateFile,
    UseDefault,
    Skip,
    FixPermissions,
    UseAlternative,
    InstallDependency,
    FixJson,
    UseCached,
    ReduceLoad,
    Cleanup,
    LogError,
}

impl RecoveryAction {
    pub const ALL: [RecoveryAction; 14] = [
        RecoveryAction::Retry,
        RecoveryAction::IncreaseTimeout,
        RecoveryAction::Fallback,
        RecoveryAction::CreateFile,
        RecoveryAction::UseDefault,
        RecoveryAction::Skip,
        RecoveryAction::FixPermissions,
        RecoveryAction::UseAlternative,
        RecoveryAction::InstallDependency,
        RecoveryAction::FixJson,
        RecoveryAction::UseCached,
        RecoveryAction::ReduceLoad,
        RecoveryAction::Cleanup,
        RecoveryAction::LogError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryAction::Retry => "retry",
            RecoveryAction::IncreaseTimeout => "increase_timeout",
            RecoveryAction::Fallback => "fallback",
            RecoveryAction::CreateFile => "create_file",
            RecoveryAction::UseDefault => "use_default",
            RecoveryAction::Skip => "skip",
            RecoveryAction::FixPermissions => "fix_permissions",
            RecoveryAction::UseAlternative => "use_alternative",
            RecoveryAction::InstallDependency => "install_dependency",
            RecoveryAction::FixJson => "fix_json",
            RecoveryAction::UseCached => "use_cached",
            RecoveryAction::ReduceLoad => "reduce_load",
            RecoveryAction::Cleanup => "cleanup",
            RecoveryAction::LogError => "log_error",
        }
    }

    /// Built-in escalation order for a category.
    pub fn default_strategy(category: FailureCategory) -> Vec<RecoveryAction> {
        use RecoveryAction::*;
        match category {
            FailureCategory::Timeout => vec![Retry, IncreaseTimeout, Fallback],
            FailureCategory::NotFound => vec![CreateFile, UseDefault, Skip],
            FailureCategory::Permission => vec![FixPermissions, UseAlternative, Skip],
            FailureCategory::Dependency => vec![InstallDependency, UseAlternative, Skip],
            FailureCategory::MalformedData => vec![FixJson, UseDefault, Skip],
            FailureCategory::Connection => vec![Retry, UseCached, Skip],
            FailureCategory::ResourceExhaustion => vec![ReduceLoad, Cleanup, Skip],
            FailureCategory::Unknown => vec![Retry, LogError, Skip],
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        RecoveryAction::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| format!("unknown recovery action: {}", s))
    }
}

/// What the handler knows about the failed attempt.
#[derive(Debug, Clone, Serialize)]
pub struct FailureContext {
    pub frame_id: String,
    pub category: FailureCategory,
    pub error_message: String,
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    pub max_attempts: u32,
    pub timeout_secs: u64,
    pub parameters: BTreeMap<String, Value>,
}

/// Changes carried into the next attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryAdjustment {
    pub timeout_secs: Option<u64>,
    /// Parameter overlays for the next attempt (`fallback_used`, `default_used`, ...).
    pub parameters: BTreeMap<String, Value>,
    /// Reclaim expired allocations before retrying.
    pub sweep_allocations: bool,
}

impl RecoveryAdjustment {
    pub fn is_empty(&self) -> bool {
        self.timeout_secs.is_none() && self.parameters.is_empty() && !self.sweep_allocations
    }

    fn flag(key: &str) -> Self {
        Self {
            parameters: BTreeMap::from([(key.to_string(), json!(true))]),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub action: RecoveryAction,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "RecoveryAdjustment::is_empty")]
    pub adjustment: RecoveryAdjustment,
}

impl ActionResult {
    pub fn succeeded(action: RecoveryAction, message: impl Into<String>) -> Self {
        Self {
            action,
            success: true,
            message: message.into(),
            adjustment: RecoveryAdjustment::default(),
        }
    }

    pub fn failed(action: RecoveryAction, message: impl Into<String>) -> Self {
        Self {
            action,
            success: false,
            message: message.into(),
            adjustment: RecoveryAdjustment::default(),
        }
    }

    pub fn with_adjustment(mut self, adjustment: RecoveryAdjustment) -> Self {
        self.adjustment = adjustment;
        self
    }
}

/// Carries out one recovery action.
#[async_trait]
pub trait RemediationHandler: Send + Sync {
    async fn execute(&self, action: RecoveryAction, context: &FailureContext) -> ActionResult;
}

/// Default handler.
///
/// `retry` succeeds only for a frame's first failed attempt, so repeated
/// failures escalate to the later actions of the strategy. File actions read
/// `file_path` from the frame parameters; `install_dependency` runs the
/// configured installer with the `dependency` parameter appended.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRemediation {
    install_command: Option<String>,
}

impl BuiltinRemediation {
    pub fn new(install_command: Option<String>) -> Self {
        Self { install_command }
    }

    fn file_path(context: &FailureContext) -> Option<&str> {
        context
            .parameters
            .get("file_path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
    }

    fn create_file(context: &FailureContext) -> ActionResult {
        let action = RecoveryAction::CreateFile;
        let Some(raw) = Self::file_path(context) else {
            return ActionResult::failed(action, "No file path specified");
        };
        let path = Path::new(raw);
        if path.exists() {
            return ActionResult::succeeded(action, format!("{} already exists", raw));
        }
        let created = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(std::fs::create_dir_all)
            .transpose()
            .and_then(|_| std::fs::write(path, "{}"));
        match created {
            Ok(()) => ActionResult::succeeded(action, format!("Created missing file: {}", raw)),
            Err(e) => ActionResult::failed(action, format!("Failed to create {}: {}", raw, e)),
        }
    }

    fn fix_permissions(context: &FailureContext) -> ActionResult {
        let action = RecoveryAction::FixPermissions;
        let Some(raw) = Self::file_path(context) else {
            return ActionResult::failed(action, "No valid file path specified");
        };
        let path = Path::new(raw);
        if !path.exists() {
            return ActionResult::failed(action, format!("{} does not exist", raw));
        }
        match set_owner_read_write(path) {
            Ok(()) => ActionResult::succeeded(action, format!("Fixed permissions for {}", raw)),
            Err(e) => ActionResult::failed(
                action,
                format!("Failed to fix permissions for {}: {}", raw, e),
            ),
        }
    }

    async fn install_dependency(&self, context: &FailureContext) -> ActionResult {
        let action = RecoveryAction::InstallDependency;
        let Some(command) = self.install_command.as_deref() else {
            return ActionResult::failed(action, "No installer configured");
        };
        let Some(dependency) = context.parameters.get("dependency").and_then(Value::as_str)
        else {
            return ActionResult::failed(action, "No dependency specified");
        };
        let mut parts = command.split_whitespace();
        let Some(program) = parts.next() else {
            return ActionResult::failed(action, "Installer command is empty");
        };
        let status = Command::new(program)
            .args(parts)
            .arg(dependency)
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(status) if status.success() => {
                ActionResult::succeeded(action, format!("Installed dependency: {}", dependency))
            }
            Ok(status) => ActionResult::failed(
                action,
                format!("Installer exited with {} for {}", status, dependency),
            ),
            Err(e) => ActionResult::failed(action, format!("Installer failed to start: {}", e)),
        }
    }
}

#[cfg(unix)]
fn set_owner_read_write(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_owner_read_write(path: &Path) -> std::io::Result<()> {
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_readonly(false);
    std::fs::set_permissions(path, permissions)
}

#[async_trait]
impl RemediationHandler for BuiltinRemediation {
    async fn execute(&self, action: RecoveryAction, context: &FailureContext) -> ActionResult {
        match action {
            RecoveryAction::Retry => {
                if context.attempt <= 1 && context.attempt < context.max_attempts {
                    ActionResult::succeeded(
                        action,
                        format!("Retry attempt {} of {}", context.attempt + 1, context.max_attempts),
                    )
                } else {
                    ActionResult::failed(action, "Plain retry already used")
                }
            }
            RecoveryAction::IncreaseTimeout => {
                let current = context.timeout_secs.max(1);
                let next = current.saturating_mul(2).min(MAX_TIMEOUT_SECS);
                if next <= current {
                    return ActionResult::failed(
                        action,
                        format!("Timeout already at {}s limit", MAX_TIMEOUT_SECS),
                    );
                }
                ActionResult::succeeded(
                    action,
                    format!("Increased timeout from {}s to {}s", current, next),
                )
                .with_adjustment(RecoveryAdjustment {
                    timeout_secs: Some(next),
                    ..Default::default()
                })
            }
            RecoveryAction::Fallback => ActionResult::succeeded(action, "Using fallback mechanism")
                .with_adjustment(RecoveryAdjustment::flag("fallback_used")),
            RecoveryAction::CreateFile => Self::create_file(context),
            RecoveryAction::UseDefault => ActionResult::succeeded(action, "Using default value")
                .with_adjustment(RecoveryAdjustment::flag("default_used")),
            RecoveryAction::Skip => ActionResult::succeeded(action, "Action skipped")
                .with_adjustment(RecoveryAdjustment::flag("skipped")),
            RecoveryAction::FixPermissions => Self::fix_permissions(context),
            RecoveryAction::UseAlternative => {
                ActionResult::succeeded(action, "Using alternative approach")
                    .with_adjustment(RecoveryAdjustment::flag("alternative_used"))
            }
            RecoveryAction::InstallDependency => self.install_dependency(context).await,
            RecoveryAction::FixJson => ActionResult::succeeded(action, "Requesting JSON repair")
                .with_adjustment(RecoveryAdjustment::flag("json_repair")),
            RecoveryAction::UseCached => ActionResult::succeeded(action, "Using cached data")
                .with_adjustment(RecoveryAdjustment::flag("cached_used")),
            RecoveryAction::ReduceLoad => ActionResult::succeeded(action, "Reducing load")
                .with_adjustment(RecoveryAdjustment::flag("reduce_load")),
            RecoveryAction::Cleanup => {
                ActionResult::succeeded(action, "Reclaiming expired allocations").with_adjustment(
                    RecoveryAdjustment {
                        sweep_allocations: true,
                        ..Default::default()
                    },
                )
            }
            RecoveryAction::LogError => {
                warn!(
                    frame_id = %context.frame_id,
                    category = %context.category,
                    error = %context.error_message,
                    "Unclassified frame failure"
                );
                ActionResult::succeeded(action, "Error logged")
            }
        }
    }
}
