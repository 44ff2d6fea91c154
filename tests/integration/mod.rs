//! Integration tests for the scaffold execution engine

mod admission_ceiling;
mod bounded_restart;
mod catalog_round_trip;
mod cli_commands;
mod dependency_blocking;
mod orchestrator_reports;
mod parallel_speedup;
mod recovery_classification;
mod test_utils;
