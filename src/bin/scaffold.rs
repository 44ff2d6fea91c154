//! Scaffold CLI Binary
//!
//! Command-line interface for the scaffold execution engine.

use anyhow::Context;
use clap::Parser;
use scaffold_engine::cli::{Cli, RunContext};
use scaffold_engine::config::ConfigLoader;
use scaffold_engine::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    if let Err(e) = init_logging(&logging_config) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let context = RunContext::new(cli.workspace.clone(), cli.config.clone(), cli.catalog.clone())
        .with_context(|| format!("failed to initialize workspace {}", cli.workspace.display()))?;
    info!(command = cli.command.name(), "CLI context initialized");

    let output = runtime
        .block_on(context.execute(&cli.command))
        .with_context(|| format!("`{}` failed", cli.command.name()))?;
    println!("{}", output.text.trim_end());
    Ok(output.exit_code)
}

/// Build logging configuration from CLI args, environment, and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = ConfigLoader::load_with_override(&cli.workspace, cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    } else if config.file.is_relative() {
        config.file = cli.workspace.join(&config.file);
    }

    config
}
