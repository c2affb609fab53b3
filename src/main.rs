//! CLI entry point for the law crawler.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use lawcrawler_core::config::{load_default_file_config, load_file_config};
use lawcrawler_core::{
    CrawlReport, DiscoveryError, FileConfig, LawCrawler, SourceConfig, SourceKind, build_source,
    determine_exit_outcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;

use cli::{Args, COMBINED_LOG_FILE};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let file_config = load_config(&args)?;
    let kinds = args.source.kinds();
    let configs = kinds
        .iter()
        .map(|&kind| source_config(&file_config, kind, &args, kinds.len() > 1).map(|config| (kind, config)))
        .collect::<Result<Vec<_>>>()?;

    let log_file = match (&args.log_file, configs.as_slice()) {
        (Some(path), _) => Some(path.clone()),
        (None, [(_, only)]) => only.log_file().map(Path::to_path_buf),
        _ => Some(COMBINED_LOG_FILE.into()),
    };
    init_tracing(&args, log_file.as_deref())?;

    debug!(?args, "CLI arguments parsed");
    info!(sources = ?kinds, "lawcrawler starting");

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight work");
            interrupt.cancel();
        }
    });

    let show_progress = !args.no_progress && !args.quiet;
    let mut reports = Vec::with_capacity(configs.len());
    for (kind, config) in configs {
        if cancel.is_cancelled() {
            reports.push(CrawlReport::discovery_failed(kind, &DiscoveryError::Cancelled));
            continue;
        }
        info!(source = %kind, "starting crawler");
        let crawler = LawCrawler::new(config)
            .with_context(|| format!("failed to set up the {kind} crawler"))?
            .with_progress(show_progress);
        let report = match crawler.crawl(build_source(kind), &cancel).await {
            Ok(report) => report,
            Err(error) => CrawlReport::discovery_failed(kind, &error),
        };
        report.log_summary();
        reports.push(report);
    }

    let exit = determine_exit_outcome(&reports);
    info!(?exit, "lawcrawler finished");
    Ok(exit.into())
}

fn load_config(args: &Args) -> Result<FileConfig> {
    if let Some(path) = &args.config {
        return load_file_config(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }
    let loaded = load_default_file_config().context("failed to load default config")?;
    Ok(loaded.config)
}

/// Layers CLI flags over the file config for one source.
///
/// With several sources, `--output-dir` becomes a parent directory holding
/// one subdirectory per source.
fn source_config(file: &FileConfig, kind: SourceKind, args: &Args, multi: bool) -> Result<SourceConfig> {
    let mut builder = file.builder_for(kind)?;
    if let Some(dir) = &args.output_dir {
        builder = builder.output_dir(if multi {
            dir.join(kind.default_output_dir())
        } else {
            dir.clone()
        });
    }
    if let Some(max_workers) = args.max_workers {
        builder = builder.max_workers(usize::from(max_workers));
    }
    if let Some(limit) = args.limit {
        builder = builder.limit(Some(limit));
    }
    builder
        .build()
        .with_context(|| format!("invalid configuration for source {kind}"))
}

fn init_tracing(args: &Args, log_file: Option<&Path>) -> Result<()> {
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
    Ok(())
}
