//! CLI route: single route table and run context. Dispatches to the catalog,
//! resolver and orchestrator, then to output formatting.

use crate::capability::CapabilityRegistry;
use crate::catalog::{Catalog, Stage};
use crate::cli::output::{
    format_frames_text, format_plan_text, format_run_status_text, format_scaffolds_text,
    format_validation_text, StagePlan, ValidationSummary,
};
use crate::cli::parse::{Commands, ListCommands};
use crate::config::{ConfigLoader, EngineConfig};
use crate::error::EngineError;
use crate::orchestrator::ScaffoldOrchestrator;
use crate::resolver;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Text to print and the process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub exit_code: i32,
}

impl CommandOutput {
    fn ok(text: String) -> Self {
        Self { text, exit_code: 0 }
    }
}

/// Runtime context for CLI execution: workspace, configuration and catalog.
pub struct RunContext {
    workspace_root: PathBuf,
    config: EngineConfig,
    catalog_path: PathBuf,
    catalog: Arc<Catalog>,
    registry: Arc<CapabilityRegistry>,
}

impl RunContext {
    /// Load configuration and the catalog for `workspace_root`.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        catalog_path: Option<PathBuf>,
    ) -> Result<Self, EngineError> {
        let config = ConfigLoader::load_with_override(&workspace_root, config_path.as_deref())?;
        let catalog_path =
            catalog_path.unwrap_or_else(|| workspace_root.join(&config.orchestrator.catalog_path));
        let catalog = Catalog::load(&catalog_path)?;
        info!(
            catalog = %catalog_path.display(),
            frames = catalog.list_frames().len(),
            scaffolds = catalog.list_scaffolds().len(),
            "Catalog loaded"
        );
        Ok(Self {
            workspace_root,
            config,
            catalog_path,
            catalog: Arc::new(catalog),
            registry: Arc::new(CapabilityRegistry::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Registry handed to the orchestrator; register in-process capabilities
    /// here before running.
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<CommandOutput, EngineError> {
        match command {
            Commands::Run {
                scaffold_id,
                input,
                input_file,
                format,
            } => {
                let input = read_input(input.as_deref(), input_file.as_deref())?;
                self.handle_run(scaffold_id, input, format).await
            }
            Commands::List { command } => match command {
                ListCommands::Frames { format } => {
                    let frames = self.catalog.list_frames();
                    if format == "json" {
                        let frames: Vec<_> = frames.iter().map(|f| f.as_ref()).collect();
                        to_json(&frames).map(CommandOutput::ok)
                    } else {
                        Ok(CommandOutput::ok(format_frames_text(frames)))
                    }
                }
                ListCommands::Scaffolds { format } => {
                    let scaffolds = self.catalog.list_scaffolds();
                    if format == "json" {
                        let scaffolds: Vec<_> = scaffolds.iter().map(|s| s.as_ref()).collect();
                        to_json(&scaffolds).map(CommandOutput::ok)
                    } else {
                        Ok(CommandOutput::ok(format_scaffolds_text(scaffolds)))
                    }
                }
            },
            Commands::Validate { format } => self.handle_validate(format),
            Commands::Plan {
                scaffold_id,
                format,
            } => self.handle_plan(scaffold_id, format),
        }
    }

    async fn handle_run(
        &self,
        scaffold_id: &str,
        input: Value,
        format: &str,
    ) -> Result<CommandOutput, EngineError> {
        validate_config(&self.config)?;
        let orchestrator = ScaffoldOrchestrator::from_config(
            Arc::clone(&self.catalog),
            Arc::clone(&self.registry),
            &self.config,
            &self.workspace_root,
        )?;
        let status = orchestrator.run(scaffold_id, input).await?;
        let exit_code = if status.is_complete() { 0 } else { 2 };
        let text = if format == "json" {
            to_json(&status)?
        } else {
            format_run_status_text(&status)
        };
        Ok(CommandOutput { text, exit_code })
    }

    fn handle_validate(&self, format: &str) -> Result<CommandOutput, EngineError> {
        let config_errors = match self.config.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors.iter().map(ToString::to_string).collect(),
        };
        let summary = ValidationSummary {
            catalog_path: self.catalog_path.clone(),
            frames: self.catalog.list_frames().len(),
            scaffolds: self.catalog.list_scaffolds().len(),
            fingerprint: self.catalog.fingerprint(),
            config_errors,
        };
        let exit_code = if summary.is_valid() { 0 } else { 1 };
        let text = if format == "json" {
            to_json(&summary)?
        } else {
            format_validation_text(&summary)
        };
        Ok(CommandOutput { text, exit_code })
    }

    fn handle_plan(&self, scaffold_id: &str, format: &str) -> Result<CommandOutput, EngineError> {
        let scaffold = self.catalog.get_scaffold(scaffold_id)?;
        let mut plans = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            let frames = self.catalog.frames_for_stage(&scaffold, stage)?;
            let plan = resolver::resolve(&frames);
            plans.push(StagePlan {
                stage,
                groups: plan.group_ids(),
                degraded: plan.degraded.as_ref().map(ToString::to_string),
            });
        }
        if format == "json" {
            to_json(&plans).map(CommandOutput::ok)
        } else {
            Ok(CommandOutput::ok(format_plan_text(&scaffold, &plans)))
        }
    }
}

fn validate_config(config: &EngineConfig) -> Result<(), EngineError> {
    config.validate().map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        EngineError::ConfigError(format!(
            "Configuration validation failed:\n{}",
            messages.join("\n")
        ))
    })
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, EngineError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Run input from `--input` or `--input-file`; an empty object when neither is given.
pub fn read_input(inline: Option<&str>, file: Option<&Path>) -> Result<Value, EngineError> {
    let parse = |text: &str, source: &str| {
        serde_json::from_str::<Value>(text)
            .map_err(|e| EngineError::ConfigError(format!("Invalid input JSON from {}: {}", source, e)))
    };
    match (inline, file) {
        (Some(text), _) => parse(text, "--input"),
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)?;
            parse(&text, &path.display().to_string())
        }
        (None, None) => Ok(Value::Object(Default::default())),
    }
}
