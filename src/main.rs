use anyhow::Context;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use netclean_cli::io;
use netclean_cli::{CleanerConfig, NetworkCleaner, RunOutcome};

/// Command line arguments for the network cleaner
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliArgs {
    /// GeoJSON line layer to clean
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Where to write the cleaned network
    #[arg(long, value_name = "FILE", default_value = "cleaned.geojson")]
    pub output: PathBuf,

    /// GeoJSON point layer of unlink markers
    #[arg(long, value_name = "FILE")]
    pub unlinks: Option<PathBuf>,

    /// Write per-feature error records here
    #[arg(long, value_name = "FILE")]
    pub errors_output: Option<PathBuf>,

    /// Write the unlink report here
    #[arg(long, value_name = "FILE")]
    pub unlinks_output: Option<PathBuf>,

    /// Write trimmed stub points here
    #[arg(long, value_name = "FILE")]
    pub stubs_output: Option<PathBuf>,

    /// JSON file with base cleaner settings
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Decimal places vertices are snapped to
    #[arg(long, value_name = "DIGITS")]
    pub precision: Option<u32>,

    /// Collect per-feature error records
    #[arg(long, default_value_t = false)]
    pub collect_errors: bool,

    /// Suppress crossings marked in the unlinks layer
    #[arg(long, default_value_t = false)]
    pub resolve_unlinks: bool,

    /// Distance within which a marker touches a line
    #[arg(long, value_name = "DIST")]
    pub unlink_tolerance: Option<f64>,

    /// Trim dangling end pieces shorter than this share of their line
    #[arg(long, value_name = "RATIO")]
    pub stub_ratio: Option<f64>,
}

/// Parsed configuration returned by the CLI
#[derive(Debug)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub unlinks: Option<PathBuf>,
    pub errors_output: Option<PathBuf>,
    pub unlinks_output: Option<PathBuf>,
    pub stubs_output: Option<PathBuf>,
    pub base: Option<PathBuf>,
    pub precision: Option<u32>,
    pub collect_errors: bool,
    pub resolve_unlinks: bool,
    pub unlink_tolerance: Option<f64>,
    pub stub_ratio: Option<f64>,
}

impl From<CliArgs> for Config {
    fn from(args: CliArgs) -> Self {
        Self {
            input: args.input,
            output: args.output,
            // asking for an output implies collecting it
            collect_errors: args.collect_errors || args.errors_output.is_some(),
            resolve_unlinks: args.resolve_unlinks || args.unlinks.is_some(),
            unlinks: args.unlinks,
            errors_output: args.errors_output,
            unlinks_output: args.unlinks_output,
            stubs_output: args.stubs_output,
            base: args.config,
            precision: args.precision,
            unlink_tolerance: args.unlink_tolerance,
            stub_ratio: args.stub_ratio,
        }
    }
}

impl Config {
    /// Cleaner settings: the base file if given, overridden by flags.
    pub fn cleaner(&self) -> anyhow::Result<CleanerConfig> {
        let mut cfg = match &self.base {
            Some(path) => CleanerConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => CleanerConfig::default(),
        };
        if let Some(p) = self.precision {
            cfg.precision = p;
        }
        cfg.collect_errors |= self.collect_errors;
        cfg.resolve_unlinks |= self.resolve_unlinks;
        if let Some(t) = self.unlink_tolerance {
            cfg.unlink_tolerance = t;
        }
        if self.stub_ratio.is_some() {
            cfg.stub_ratio = self.stub_ratio;
        }
        Ok(cfg)
    }
}

/// Parse command line arguments into a configuration struct
pub fn parse_config() -> Config {
    let args = CliArgs::parse();
    args.into()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cfg = parse_config();
    let cleaner_cfg = cfg.cleaner()?;

    let layer = io::layer_from_file(&cfg.input)?;
    let markers = match &cfg.unlinks {
        Some(path) => io::markers_from_file(path)?,
        None => Vec::new(),
    };
    info!(
        "read {} features and {} unlink markers",
        layer.features.len(),
        markers.len()
    );

    let report = match NetworkCleaner::new(cleaner_cfg).clean(&layer.schema, &layer.features, &markers)? {
        RunOutcome::Finished(report) => report,
        RunOutcome::Cancelled => anyhow::bail!("cleaning was cancelled"),
    };

    io::write_geojson(&cfg.output, &io::network_to_geojson(&report))?;
    if let (Some(path), Some(errors)) = (&cfg.errors_output, &report.errors) {
        io::write_geojson(path, &io::errors_to_geojson(errors))?;
        println!("{} error records written to {}", errors.len(), path.display());
    }
    if let (Some(path), Some(unlinks)) = (&cfg.unlinks_output, &report.unlinks) {
        io::write_geojson(path, &io::unlinks_to_geojson(unlinks))?;
        println!("Unlink report written to {}", path.display());
    }
    if let Some(path) = &cfg.stubs_output {
        io::write_geojson(path, &io::stubs_to_geojson(&report.stubs))?;
        println!("{} stub points written to {}", report.stubs.len(), path.display());
    }
    println!(
        "Cleaned network written to {} ({} edges)",
        cfg.output.display(),
        report.stats.output_edges
    );
    Ok(())
}
