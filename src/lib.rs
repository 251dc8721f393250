//! deepflow: multi-stage content generation
//!
//! Plans a list of topics for a description, researches every topic in parallel against an
//! LLM provider, optionally validates the assembled content with a bounded retry loop, and
//! optionally rewrites it into a final document. Token usage is accounted per call and
//! summed across the run.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod stage;
pub mod telemetry;

pub use error::PipelineError;
pub use pipeline::{ResearchFlow, RunOutcome};
