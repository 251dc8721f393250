//! Merge rules: defaults and override order.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with merge policy defaults applied.
///
/// Struct-level serde defaults cover every other key; these are the values that later
/// sources are most commonly layered over.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("pipeline.worker_limit", 10_i64)?
        .set_default("pipeline.retry_ceiling", 2_i64)?
        .set_default("pipeline.acceptance_threshold", 6.0_f64)?
        .set_default("stages.validate", false)?
        .set_default("stages.write", false)
}
