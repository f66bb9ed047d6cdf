use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "terrace")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declare resources as a dependency graph and converge them in order", long_about = None)]
#[command(after_help = "Examples:\n  \
    terrace apply\n  \
    terrace directory describe\n  \
    terrace file:motd --dry-run apply\n  \
    terrace --unattended directory:app destroy")]
pub struct Cli {
    /// Selector expressions (kind, kind:name, :name or name) followed by the goal
    #[arg(value_name = "SELECTOR ... GOAL", required = true, num_args = 1..)]
    pub args: Vec<String>,

    /// Terracefile to load (default: nearest Terracefile.toml)
    #[arg(short, long, env = "TERRACE_FILE", value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long)]
    pub debug: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, conflicts_with = "debug")]
    pub quiet: bool,

    /// Converge one resource at a time
    #[arg(long)]
    pub serial: bool,

    /// Number of resources to converge in parallel
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Never prompt for confirmation
    #[arg(long)]
    pub unattended: bool,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Stop scheduling new resources after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Stop scheduling new resources after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// The goal is the last positional argument
    pub fn goal(&self) -> &str {
        self.args.last().map_or("", String::as_str)
    }

    /// Everything before the goal
    pub fn selectors(&self) -> &[String] {
        match self.args.split_last() {
            Some((_, selectors)) => selectors,
            None => &[],
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        if self.debug {
            return log::LevelFilter::Debug;
        }
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
