//! paired-stats: CLI entry point.
//!
//! Runs the paired before/after analysis and prints its summary.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use paired_stats::config::{load_config_file, AnalysisConfig};
use paired_stats::pipeline;

#[derive(Parser)]
#[command(name = "paired-stats")]
#[command(about = "Paired-sample before/after analysis with diagnostic plots")]
#[command(version)]
struct Cli {
    /// CSV file with the paired measurements.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Where to write the PNG figure.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Column holding the "before" measurement.
    #[arg(long)]
    before_column: Option<String>,

    /// Column holding the "after" measurement.
    #[arg(long)]
    after_column: Option<String>,

    /// Seed of the synthetic fallback sample.
    #[arg(long)]
    seed: Option<u64>,

    /// Figure resolution in dots per inch.
    #[arg(long)]
    dpi: Option<u32>,

    /// Do not open the figure in an image viewer.
    #[arg(long)]
    no_show: bool,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Applies command-line overrides on top of `config`.
    fn apply(self, mut config: AnalysisConfig) -> AnalysisConfig {
        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(column) = self.before_column {
            config.before_column = column;
        }
        if let Some(column) = self.after_column {
            config.after_column = column;
        }
        if let Some(seed) = self.seed {
            config.fallback.seed = seed;
        }
        if let Some(dpi) = self.dpi {
            config.figure.dpi = dpi;
        }
        if self.no_show {
            config.show = false;
        }
        config
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => AnalysisConfig::default(),
    };
    let json = cli.json;
    let config = cli.apply(config);

    let report = pipeline::run(&config, !json)?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report:#}");
    }

    Ok(())
}
