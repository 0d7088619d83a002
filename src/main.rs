use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use klippylog::export::{summarize, to_csv, to_json};
use klippylog::parsers::{Klippy, Registry, RegistryConfig, TimeSeriesTable};

/// Output rendering for each parsed log
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Record count, time span and per-metric min/mean/max
    #[default]
    Summary,
    Json,
    Csv,
}

/// Extract time-aligned performance series from Klipper `klippy.log` files.
#[derive(Parser, Debug)]
#[command(name = "klippylog", version, about)]
struct Cli {
    /// Log files to parse; each is reported separately
    #[arg(value_name = "KLIPPY_LOG", required = true)]
    files: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Summary)]
    format: Format,

    /// Parse each file as memory-mapped shards in parallel
    #[arg(long)]
    parallel: bool,

    /// Only report these metric keys, in this order
    #[arg(long, value_delimiter = ',')]
    keys: Option<Vec<String>>,

    /// Auxiliary controller names (default: toolhead0,toolhead1)
    #[arg(long, value_delimiter = ',')]
    controllers: Option<Vec<String>>,

    /// Heater names (default: extruder,extruder1,heater_bed)
    #[arg(long, value_delimiter = ',')]
    heaters: Option<Vec<String>>,
}

impl Cli {
    fn registry_config(&self) -> RegistryConfig {
        let mut config = RegistryConfig::default();
        if let Some(controllers) = &self.controllers {
            config.controllers = controllers.clone();
        }
        if let Some(heaters) = &self.heaters {
            config.heaters = heaters.clone();
        }
        config
    }
}

fn print_summary(
    out: &mut impl Write,
    path: &Path,
    table: &TimeSeriesTable,
    registry: &Registry,
) -> io::Result<()> {
    writeln!(out, "=== {} ===", path.display())?;
    writeln!(out, "Records: {}", table.len())?;

    if let (Some(first), Some(last)) = (table.timestamps().first(), table.timestamps().last()) {
        writeln!(
            out,
            "Time range: {:.3} to {:.3} ({:.1} minutes)",
            first,
            last,
            (last - first) / 60.0
        )?;
    }

    writeln!(
        out,
        "\n  {:<28} {:<14} {:>8} {:>14} {:>14} {:>14}",
        "metric", "shape", "samples", "min", "mean", "max"
    )?;
    for summary in summarize(table, registry) {
        if summary.samples == 0 {
            continue;
        }
        let fmt = |v: Option<f64>| v.map(|v| summary.unit.format_value(v, 3)).unwrap_or_default();
        let shape: &str = match &summary.shape {
            Some(shape) => shape.as_ref(),
            None => "-",
        };
        writeln!(
            out,
            "  {:<28} {:<14} {:>8} {:>14} {:>14} {:>14}",
            summary.key,
            shape,
            summary.samples,
            fmt(summary.min),
            fmt(summary.mean),
            fmt(summary.max)
        )?;
    }
    writeln!(out)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let registry = Registry::new(&cli.registry_config()).context("Invalid metric configuration")?;
    let parser = Klippy::new(registry);
    let shards = rayon::current_num_threads();

    // Each file is parsed independently; results are reported in argument order
    let results: Vec<Result<TimeSeriesTable>> = cli
        .files
        .par_iter()
        .map(|path| -> Result<TimeSeriesTable> {
            let table = if cli.parallel {
                parser.parse_file_parallel(path, shards)?
            } else {
                parser.parse_file(path)?
            };
            if table.is_empty() {
                tracing::warn!("{}: no Stats record lines found", path.display());
            }
            Ok(match &cli.keys {
                Some(keys) => {
                    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                    table.select(&keys)
                }
                None => table,
            })
        })
        .collect();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (path, result) in cli.files.iter().zip(results) {
        let table = result.with_context(|| format!("Failed to parse {}", path.display()))?;
        match cli.format {
            Format::Summary => print_summary(&mut out, path, &table, parser.registry())?,
            Format::Json => writeln!(out, "{}", to_json(&table)?)?,
            Format::Csv => to_csv(&table, &mut out)?,
        }
    }

    Ok(())
}
