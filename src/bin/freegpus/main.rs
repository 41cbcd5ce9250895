mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::FreeGpus::parse();

    // stdout carries the report, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(
            args.verbose.tracing_level_filter(),
            std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        ))
        .with_writer(std::io::stderr)
        .init();

    if let Some(shell) = args.completions {
        commands::handle_completions(shell);
        return Ok(());
    }

    let config =
        freegpus::config::load_config(args.config.as_ref()).context("Failed to load config")?;
    tracing::debug!(?config, "Loaded configuration");

    commands::handle_query(&args, &config)
}

/// `RUST_LOG` directives win over the `-v`/`-q` level when set and valid.
fn log_filter(level: LevelFilter, rust_log: Option<String>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(level.into()))
}
