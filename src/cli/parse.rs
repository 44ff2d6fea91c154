//! CLI parse: clap types for the scaffold binary. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Scaffold CLI - staged, dependency-aware frame execution
#[derive(Parser)]
#[command(name = "scaffold")]
#[command(about = "Run staged frame pipelines with dependency-aware parallelism")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Catalog document (overrides orchestrator.catalog_path)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Extra configuration file layered above the workspace files
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a scaffold through all eight stages
    Run {
        /// Scaffold id
        scaffold_id: String,
        /// Input payload as inline JSON
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,
        /// Input payload read from a JSON file
        #[arg(long)]
        input_file: Option<PathBuf>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List catalog entries
    List {
        #[command(subcommand)]
        command: ListCommands,
    },
    /// Validate the catalog and configuration
    Validate {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the execution groups of every stage of a scaffold
    Plan {
        /// Scaffold id
        scaffold_id: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum ListCommands {
    /// List frames in load order
    Frames {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List scaffolds in load order
    Scaffolds {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Run { .. } => "run",
            Commands::List {
                command: ListCommands::Frames { .. },
            } => "list frames",
            Commands::List {
                command: ListCommands::Scaffolds { .. },
            } => "list scaffolds",
            Commands::Validate { .. } => "validate",
            Commands::Plan { .. } => "plan",
        }
    }
}
