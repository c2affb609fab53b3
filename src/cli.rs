//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use lawcrawler_core::SourceKind;
use lawcrawler_core::crawl::constants::{MAX_WORKERS, MIN_WORKERS};

/// Log file used by `--source all` unless overridden.
pub const COMBINED_LOG_FILE: &str = "law_crawler.log";

/// Which database(s) to crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    /// National Laws & Regulations Database
    Central,
    /// Taipei City
    Taipei,
    /// New Taipei City
    NewTaipei,
    /// Taichung City
    Taichung,
    /// Taoyuan City
    Taoyuan,
    /// Kaohsiung City
    Kaohsiung,
    /// Every source, one after another
    All,
}

impl SourceArg {
    /// Sources to crawl, in run order.
    #[must_use]
    pub fn kinds(self) -> Vec<SourceKind> {
        match self {
            Self::Central => vec![SourceKind::Central],
            Self::Taipei => vec![SourceKind::Taipei],
            Self::NewTaipei => vec![SourceKind::NewTaipei],
            Self::Taichung => vec![SourceKind::Taichung],
            Self::Taoyuan => vec![SourceKind::Taoyuan],
            Self::Kaohsiung => vec![SourceKind::Kaohsiung],
            Self::All => SourceKind::ALL.to_vec(),
        }
    }
}

/// Crawl Taiwanese statute databases into one JSON file per law.
///
/// Lawcrawler walks each source's listing pages, then fetches, parses and
/// writes every law it finds using a bounded worker pool with randomized
/// pacing and retry.
#[derive(Parser, Debug)]
#[command(name = "lawcrawler")]
#[command(author, version, about)]
pub struct Args {
    /// Source to crawl
    #[arg(short, long, value_enum, default_value_t = SourceArg::All)]
    pub source: SourceArg,

    /// Config file (default: $XDG_CONFIG_HOME/lawcrawler/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output directory (overrides the per-source default)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent workers (1-100)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u8).range(MIN_WORKERS as i64..=MAX_WORKERS as i64))]
    pub max_workers: Option<u8>,

    /// Process at most N discovered laws per source
    #[arg(short, long, value_name = "N")]
    pub limit: Option<usize>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
