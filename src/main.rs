use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::LevelFilter;

use brc_chunked::config::{DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS};
use brc_chunked::output::write_csv_file;
use brc_chunked::profile::Profiler;
use brc_chunked::timing::RunTimes;
use brc_chunked::{aggregate_with, Config, ReadMode, Summary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputSize {
    Small,
    Mid,
    Large,
    Full,
}

impl InputSize {
    fn path(self) -> &'static str {
        match self {
            InputSize::Small => "data/measurements_small.txt",
            InputSize::Mid => "data/measurements_mid.txt",
            InputSize::Large => "data/measurements_large.txt",
            InputSize::Full => "data/measurements.txt",
        }
    }

    fn label(self) -> &'static str {
        match self {
            InputSize::Small => "small",
            InputSize::Mid => "mid",
            InputSize::Large => "large",
            InputSize::Full => "full",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "brc-chunked",
    about = "Per-key min/max/avg over a `key;value` file, read in parallel chunks",
    version
)]
struct Cli {
    /// Input size to pick from the data directory.
    #[arg(short = 'f', long, value_enum, default_value_t = InputSize::Small)]
    input: InputSize,

    /// Explicit input file; overrides --input.
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Number of timed executions.
    #[arg(short = 'n', long, default_value_t = 1)]
    loops: usize,

    /// Subdirectory of `profiles/` for profiling output.
    #[arg(long)]
    dir: Option<String>,

    /// Postfix for the profiling file names.
    #[arg(long, default_value = "")]
    psf: String,

    #[arg(short, long, default_value = "output/result.csv")]
    output: PathBuf,

    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Bytes per chunk.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Memory-map the input instead of positional reads.
    #[arg(long)]
    mmap: bool,

    /// Reassemble records longer than a chunk instead of failing.
    #[arg(long)]
    allow_long_records: bool,
}

fn init_logging() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn run_once(path: &Path, config: &Config, output: &Path) -> Result<Summary> {
    let summary = aggregate_with(path, config)
        .with_context(|| format!("aggregating {}", path.display()))?;
    write_csv_file(&summary.result, output)
        .with_context(|| format!("writing {}", output.display()))?;

    if !summary.diagnostics.is_clean() {
        log::warn!(
            "{} malformed records skipped, first ones:",
            summary.diagnostics.malformed
        );
        for sample in &summary.diagnostics.samples {
            log::warn!("  offset {}: {:?} ({})", sample.offset, sample.line, sample.reason);
        }
    }
    Ok(summary)
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = Config::default()
        .with_workers(cli.workers)
        .with_chunk_size(cli.chunk_size)
        .with_read_mode(if cli.mmap { ReadMode::Mapped } else { ReadMode::Positional })
        .with_long_records(cli.allow_long_records);
    config.validate()?;

    let profiler = cli
        .dir
        .as_deref()
        .map(|name| Profiler::create(Path::new("profiles"), name, &cli.psf))
        .transpose()
        .context("creating profile directory")?;

    let path = cli
        .file
        .clone()
        .unwrap_or_else(|| PathBuf::from(cli.input.path()));
    let label = match &cli.file {
        Some(file) => file.display().to_string(),
        None => cli.input.label().to_string(),
    };
    log::info!("input: {label}");
    log::info!("file path: {}", path.display());

    let mut runs = RunTimes::new();
    let mut last = None;
    for i in 0..cli.loops {
        let start = Instant::now();
        let summary = run_once(&path, &config, &cli.output)?;
        let elapsed = start.elapsed();
        log::info!(
            "run {}/{}: {} keys, {} chunks in {:.3}s",
            i + 1,
            cli.loops,
            summary.result.len(),
            summary.chunks,
            elapsed.as_secs_f64()
        );
        runs.push(elapsed);
        last = Some(summary);
    }

    if runs.is_empty() {
        return Ok(());
    }
    log::info!(
        "avg execution time was: {:.3}s (max {:.3}s, min {:.3}s)",
        runs.avg(),
        runs.max(),
        runs.min()
    );
    if let Err(err) = runs.append_csv(Path::new("stat/timestats.csv"), &label) {
        log::error!("could not save run statistics: {err}");
    }

    if let (Some(profiler), Some(summary)) = (profiler, last) {
        profiler
            .write(&summary.traces)
            .context("writing profile output")?;
    }
    Ok(())
}
