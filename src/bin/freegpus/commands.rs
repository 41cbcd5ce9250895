use crate::cli::FreeGpus;
use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use freegpus::config::Config;
use freegpus::core::report::{self, Mode};
use freegpus::core::select::OnlyUse;
use freegpus::utils::parse_only_use;
use std::io;

pub fn handle_completions(shell: Shell) {
    let mut cmd = FreeGpus::command();
    generate(shell, &mut cmd, "freegpus", &mut io::stdout());
}

pub fn handle_query(args: &FreeGpus, config: &Config) -> Result<()> {
    let mode = Mode::from_flags(
        args.who,
        args.sort_by_memory,
        args.randomize,
        args.print_only_first,
    );
    let only_use = resolve_only_use(args, config)?;
    tracing::debug!(%mode, only_use = ?only_use, "Selected report");

    let smi = config.nvidia_smi();
    let report = report::run(mode, &smi, only_use.as_ref(), &mut rand::rng())?;
    print!("{report}");
    Ok(())
}

/// CLI flag overrides config file; a blank flag lifts any restriction
fn resolve_only_use(args: &FreeGpus, config: &Config) -> Result<Option<OnlyUse>> {
    match args.only_use.as_deref() {
        Some(spec) if spec.trim().is_empty() => Ok(None),
        Some(spec) => parse_only_use(spec)
            .map(Some)
            .context("Invalid value for --only-use"),
        None => Ok(config.only_use()),
    }
}
