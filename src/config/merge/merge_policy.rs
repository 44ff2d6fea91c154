//! Defaults seeded into every builder before any file or environment source.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Only keys that other layers commonly override are seeded here; the rest
/// fall back to serde defaults during deserialization.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("executor.max_attempts", 2)?
        .set_default("coordinator.max_workers", 4)?
        .set_default("orchestrator.catalog_path", "scaffolds.toml")?
        .set_default("orchestrator.reports_dir", ".scaffold/reports")?
        .set_default("orchestrator.store_path", ".scaffold/store")
}
