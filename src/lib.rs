//! Scaffold Engine: Staged Frame Execution
//!
//! Turns a declarative scaffold (eight ordered stages of frames) into
//! concurrent execution with dependency-aware grouping, bounded retries,
//! resource admission and failure recovery.

pub mod admission;
pub mod capability;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod orchestrator;
pub mod recovery;
pub mod resolver;
pub mod store;
