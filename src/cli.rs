//! CLI domain: parse, route and output only.
//! No domain orchestration; a single route table dispatches to the engine.

mod output;
mod parse;
mod route;

pub use output::{
    format_frames_text, format_plan_text, format_run_status_text, format_scaffolds_text,
    format_validation_text, map_error, StagePlan, ValidationSummary,
};
pub use parse::{Cli, Commands, ListCommands};
pub use route::{read_input, CommandOutput, RunContext};
