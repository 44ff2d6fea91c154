//! Configuration loader: merges every source into one [`EngineConfig`].

use super::merge;
use super::sources::{env, global_file, workspace_file};
use super::EngineConfig;
use config::{ConfigError, File};
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root`.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace
    /// `config/config.toml`, `config/{SCAFFOLD_ENV}.toml`, `SCAFFOLD__*`
    /// environment variables.
    pub fn load(workspace_root: &Path) -> Result<EngineConfig, ConfigError> {
        Self::load_with_override(workspace_root, None)
    }

    /// Same as [`load`](Self::load) with an explicit file layered above the
    /// workspace files and below the environment.
    pub fn load_with_override(
        workspace_root: &Path,
        override_file: Option<&Path>,
    ) -> Result<EngineConfig, ConfigError> {
        let mut builder = merge::builder_with_defaults()?;
        builder = global_file::add_to_builder(builder)?;
        builder = workspace_file::add_to_builder(builder, workspace_root)?;
        if let Some(path) = override_file {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = env::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Load a single file on top of the defaults, ignoring every other source.
    pub fn load_from_file(path: &Path) -> Result<EngineConfig, ConfigError> {
        merge::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
