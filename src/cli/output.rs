//! CLI output: error mapping and human-readable formatting.

use crate::catalog::{Frame, Scaffold, Stage};
use crate::error::EngineError;
use crate::orchestrator::RunStatus;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &EngineError) -> String {
    format!("{} {}", "error:".red().bold(), e)
}

pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

/// Execution groups of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StagePlan {
    pub stage: Stage,
    pub groups: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub catalog_path: PathBuf,
    pub frames: usize,
    pub scaffolds: usize,
    pub fingerprint: String,
    pub config_errors: Vec<String>,
}

impl ValidationSummary {
    pub fn is_valid(&self) -> bool {
        self.config_errors.is_empty()
    }
}

pub fn format_frames_text(frames: &[Arc<Frame>]) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Frames"));
    if frames.is_empty() {
        out.push_str("No frames in catalog.\n");
        return out;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Frame", "Name", "Kind", "Entry point", "Depends on"]);
    for frame in frames {
        let deps = if frame.dependencies.is_empty() {
            "-".to_string()
        } else {
            frame.dependencies.join(", ")
        };
        table.add_row(vec![
            frame.id.clone(),
            frame.name.clone(),
            frame.capability_kind.to_string(),
            frame.entry_point.clone(),
            deps,
        ]);
    }
    out.push_str(&format!("{}\n", table));
    out
}

pub fn format_scaffolds_text(scaffolds: &[Arc<Scaffold>]) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Scaffolds"));
    if scaffolds.is_empty() {
        out.push_str("No scaffolds in catalog.\n");
        return out;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Scaffold", "Name", "Version", "Frames", "Stages"]);
    for scaffold in scaffolds {
        let frames: usize = scaffold.stages.values().map(Vec::len).sum();
        let stages: Vec<String> = scaffold
            .stages
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(number, _)| number.to_string())
            .collect();
        table.add_row(vec![
            scaffold.id.clone(),
            scaffold.name.clone(),
            scaffold.version.clone(),
            frames.to_string(),
            stages.join(","),
        ]);
    }
    out.push_str(&format!("{}\n", table));
    out
}

pub fn format_plan_text(scaffold: &Scaffold, plans: &[StagePlan]) -> String {
    let mut out = format!(
        "{}\n\n",
        format_section_heading(&format!("Plan for {}", scaffold.id))
    );
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Stage", "Group", "Frames"]);
    for plan in plans {
        if plan.groups.is_empty() {
            table.add_row(vec![plan.stage.to_string(), "-".to_string(), "(empty)".to_string()]);
            continue;
        }
        for (index, group) in plan.groups.iter().enumerate() {
            table.add_row(vec![plan.stage.to_string(), index.to_string(), group.join(", ")]);
        }
    }
    out.push_str(&format!("{}\n", table));
    for plan in plans {
        if let Some(warning) = &plan.degraded {
            out.push_str(&format!("{} {}: {}\n", "warning:".yellow().bold(), plan.stage, warning));
        }
    }
    out
}

pub fn format_run_status_text(status: &RunStatus) -> String {
    match status {
        RunStatus::Complete {
            run_id,
            report_path,
            criteria_satisfied,
        } => {
            let criteria = if *criteria_satisfied {
                "satisfied".green().to_string()
            } else {
                "not satisfied".yellow().to_string()
            };
            format!(
                "{} run {}\n  Success criteria: {}\n  Report: {}\n",
                "complete".green().bold(),
                run_id,
                criteria,
                report_path.display()
            )
        }
        RunStatus::Error {
            run_id,
            report_path,
            stage,
            error,
        } => format!(
            "{} run {} at stage {}\n  Error: {}\n  Failure report: {}\n",
            "halted".red().bold(),
            run_id,
            stage,
            error,
            report_path.display()
        ),
    }
}

pub fn format_validation_text(summary: &ValidationSummary) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Validation"));
    out.push_str(&format!("  Catalog: {}\n", summary.catalog_path.display()));
    out.push_str(&format!("  Frames: {}\n", summary.frames));
    out.push_str(&format!("  Scaffolds: {}\n", summary.scaffolds));
    out.push_str(&format!("  Fingerprint: {}\n", summary.fingerprint));
    if summary.is_valid() {
        out.push_str(&format!("  Configuration: {}\n", "valid".green()));
    } else {
        out.push_str(&format!("  Configuration: {}\n", "invalid".red()));
        for error in &summary.config_errors {
            out.push_str(&format!("    - {}\n", error));
        }
    }
    out
}
