use clap::Parser;
use clap_complete::Shell;
use freegpus::core::version;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "freegpus",
    author,
    version = version(),
    about = "Find indices of free GPUs on system"
)]
pub struct FreeGpus {
    /// Print only first available index
    #[arg(short = 'f', long)]
    pub print_only_first: bool,

    /// Randomize order of indices
    #[arg(short = 'r', long)]
    pub randomize: bool,

    /// Print GPUs used by each user
    #[arg(short = 'w', long)]
    pub who: bool,

    /// Restrict GPU selection to given indices, e.g. "0,2" or "0-3".
    /// An empty value means no restriction
    #[arg(short = 'o', long, value_name = "INDICES")]
    pub only_use: Option<String>,

    /// Sort GPUs by amount of free memory. Without this, only completely empty GPUs will be printed
    #[arg(short = 'm', long)]
    pub sort_by_memory: bool,

    #[command(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,

    #[arg(long, help = "Path to the config file")]
    pub config: Option<PathBuf>,

    /// Print a completion script for the given shell and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<Shell>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        FreeGpus::command().debug_assert();
    }

    #[test]
    fn test_short_flags() {
        let args =
            FreeGpus::try_parse_from(["freegpus", "-f", "-r", "-o", "0,1", "-m", "-w"]).unwrap();
        assert!(args.print_only_first);
        assert!(args.randomize);
        assert!(args.sort_by_memory);
        assert!(args.who);
        assert_eq!(args.only_use.as_deref(), Some("0,1"));
    }

    #[test]
    fn test_long_flags() {
        let args =
            FreeGpus::try_parse_from(["freegpus", "--print-only-first", "--only-use", "2"])
                .unwrap();
        assert!(args.print_only_first);
        assert!(!args.randomize);
        assert_eq!(args.only_use.as_deref(), Some("2"));
    }
}
