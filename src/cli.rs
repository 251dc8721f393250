//! CLI domain: parse, route, and presentation only.
//! No orchestration here; the route table dispatches to the pipeline.

mod parse;
mod presentation;
mod route;

pub use parse::{Cli, Commands, RunArgs};
pub use presentation::{format_outcome_summary, format_usage_table};
pub use route::RunContext;

use crate::error::PipelineError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &PipelineError) -> String {
    match e {
        PipelineError::ProviderAuthFailed(_) => {
            format!("{}\nCheck the API key variable named by provider.api_key_env.", e)
        }
        _ => e.to_string(),
    }
}
