//! deepflow CLI Binary
//!
//! Command-line entry point for the research pipeline.

use clap::Parser;
use deepflow::cli::{map_error, Cli, RunContext};
use deepflow::config::ConfigLoader;
use deepflow::logging::{init_logging, LoggingConfig};
use std::path::Path;
use std::process;
use tracing::{error, info, warn};

fn main() {
    let cli = Cli::parse();

    let env_file = load_env_file(&cli.workspace);

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }
    match env_file {
        Ok(Some(path)) => info!(path = %path.display(), "Loaded environment from .env"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to load .env file"),
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            process::exit(1);
        }
    };

    let context = match RunContext::new(cli.workspace.clone(), cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    };

    let cancel = context.cancellation_token();
    let result = runtime.block_on(async {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        });
        context.execute(&cli.command).await
    });

    match result {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    }
}

/// Load the nearest `.env` walking up from the workspace root.
fn load_env_file(workspace: &Path) -> Result<Option<std::path::PathBuf>, dotenvy::Error> {
    let mut current = workspace
        .canonicalize()
        .unwrap_or_else(|_| workspace.to_path_buf());
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            dotenvy::from_path(&candidate)?;
            return Ok(Some(candidate));
        }
        if !current.pop() {
            return Ok(None);
        }
    }
}

/// Build logging configuration from CLI args and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let loaded = match cli.config {
        Some(ref config_path) => ConfigLoader::load_from_file(config_path),
        None => ConfigLoader::load(&cli.workspace),
    };
    let mut config = loaded.map(|c| c.logging).unwrap_or_default();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }
    config.resolve_file(&cli.workspace);
    config
}
