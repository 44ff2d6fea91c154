//! Self-Healing / Recovery
//!
//! Classifies a failed attempt by its error message, walks the category's
//! escalation strategy through a [`RemediationHandler`], and keeps history and
//! per-category statistics. Outcomes only shape the next attempt; the attempt
//! ceiling is enforced by the executor.

pub mod actions;
pub mod classify;
pub mod manager;

pub use actions::{
    ActionResult, BuiltinRemediation, FailureContext, RecoveryAction, RecoveryAdjustment,
    RemediationHandler, MAX_TIMEOUT_SECS,
};
pub use classify::FailureCategory;
pub use manager::{PatternStats, RecoveryManager, RecoveryOutcome, RecoveryRecord};
