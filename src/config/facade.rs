//! Config loading entry point: assembles sources in precedence order and deserializes.

use super::merge::merge_policy::builder_with_defaults;
use super::sources::{environment, global_file, workspace_file};
use super::DeepflowConfig;
use config::{ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`DeepflowConfig`] from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence, lowest first: built-in defaults, global config file, `config/config.toml`,
    /// `config/{DEEPFLOW_ENV}.toml`, then `DEEPFLOW__SECTION__KEY` environment variables.
    pub fn load(workspace_root: &Path) -> Result<DeepflowConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);

        let config: DeepflowConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from a single file, plus defaults and environment overrides.
    pub fn load_from_file(path: &Path) -> Result<DeepflowConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = builder_with_defaults()?.add_source(File::from(path).required(true));
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Location of the user's global config file, whether or not it exists.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
