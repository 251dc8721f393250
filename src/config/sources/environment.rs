//! Environment overrides: DEEPFLOW__PIPELINE__WORKER_LIMIT=4 sets pipeline.worker_limit.

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment};

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("DEEPFLOW")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
