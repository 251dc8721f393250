//! CLI parse: clap types for deepflow. No behavior; definitions only.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_DESCRIPTION: &str = "Generate a comprehensive medium article on the latest \
qwen 2.5-omni model, include every feature, model methodology, detailed training process, \
relevant mathematical formulas whereever needed to show any working, it's breakthroughs, \
benchmarks, current challenges, example usage code for a particular application and a \
conclusion at the end.";

pub const DEFAULT_EMPHASIZER: &str = "Qwen 2.5-omni model";

/// deepflow - plan, research, validate and write long-form content with LLM stages
#[derive(Parser, Debug)]
#[command(name = "deepflow")]
#[command(about = "Multi-stage research and writing pipeline over LLM providers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline and print the final content
    Run(RunArgs),
    /// Print the configured stage graph as a Mermaid flowchart
    Graph,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// What to produce
    #[arg(long)]
    pub description: Option<String>,

    /// Subject the research should focus on
    #[arg(long)]
    pub emphasizer: Option<String>,

    /// Temporal context tag (defaults to the current year)
    #[arg(long)]
    pub datetime: Option<String>,

    /// Maximum concurrent research calls
    #[arg(long)]
    pub workers: Option<usize>,

    /// Maximum validate-triggered research retries
    #[arg(long)]
    pub retry_ceiling: Option<u32>,

    /// Acceptance threshold; scores strictly above it pass
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Enable the Validate stage
    #[arg(long)]
    pub validate: bool,

    /// Enable the Write stage
    #[arg(long)]
    pub write: bool,

    /// Research checkpoint path
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION)
    }

    pub fn emphasizer(&self) -> &str {
        self.emphasizer.as_deref().unwrap_or(DEFAULT_EMPHASIZER)
    }
}
