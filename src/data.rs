//! Data provider: loads the paired sample or synthesizes a fallback.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{AnalysisConfig, FallbackSpec};
use crate::error::{AnalysisError, Result};

/// Cell values treated as missing, matching common spreadsheet exports.
const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A",
    "#NA", "<NA>",
];

/// Two measurements per subject, paired by row position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairedSample {
    before: Vec<f64>,
    after: Vec<f64>,
}

impl PairedSample {
    /// Builds a sample from equal-length, non-empty columns.
    pub fn new(before: Vec<f64>, after: Vec<f64>) -> Result<Self> {
        if before.is_empty() {
            return Err(AnalysisError::EmptySample);
        }
        if before.len() != after.len() {
            return Err(AnalysisError::Degenerate {
                test: "Paired sample",
                reason: format!(
                    "column lengths differ ({} before, {} after)",
                    before.len(),
                    after.len()
                ),
            });
        }
        Ok(Self { before, after })
    }

    pub fn before(&self) -> &[f64] {
        &self.before
    }

    pub fn after(&self) -> &[f64] {
        &self.after
    }

    pub fn len(&self) -> usize {
        self.before.len()
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty()
    }

    /// Iterates `(before, after)` pairs in row order.
    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.before.iter().copied().zip(self.after.iter().copied())
    }
}

/// Where the sample came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DataSource {
    /// Loaded from a CSV file.
    File {
        path: PathBuf,
        columns: Vec<String>,
        /// Shape of the table after dropping incomplete rows.
        rows: usize,
        cols: usize,
    },
    /// Generated from the seeded fallback distributions.
    Synthetic { seed: u64, size: usize },
}

impl DataSource {
    pub const fn is_synthetic(&self) -> bool {
        matches!(self, Self::Synthetic { .. })
    }
}

/// Loads the configured input, or synthesizes the fallback when it is absent.
pub fn provide(config: &AnalysisConfig) -> Result<(PairedSample, DataSource)> {
    if config.input.exists() {
        info!(path = %config.input.display(), "loading paired data");
        load_csv(&config.input, &config.before_column, &config.after_column)
    } else {
        info!(
            path = %config.input.display(),
            seed = config.fallback.seed,
            "input not found, synthesizing fallback sample"
        );
        let sample = synthesize(&config.fallback)?;
        Ok((
            sample,
            DataSource::Synthetic {
                seed: config.fallback.seed,
                size: config.fallback.size,
            },
        ))
    }
}

/// Reads a CSV table, drops incomplete rows and extracts the paired columns.
pub fn load_csv(
    path: &Path,
    before_column: &str,
    after_column: &str,
) -> Result<(PairedSample, DataSource)> {
    let csv_err = |source| AnalysisError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(String::from)
        .collect();

    let mut complete = Vec::new();
    let mut dropped = 0usize;
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        if record.iter().any(is_missing) || record.len() < headers.len() {
            dropped += 1;
            continue;
        }
        complete.push(record);
    }
    debug!(kept = complete.len(), dropped, "dropped incomplete rows");

    let before_idx = column_index(&headers, before_column)?;
    let after_idx = column_index(&headers, after_column)?;

    if complete.is_empty() {
        return Err(AnalysisError::EmptySample);
    }

    let mut before = Vec::with_capacity(complete.len());
    let mut after = Vec::with_capacity(complete.len());
    for (row, record) in complete.iter().enumerate() {
        before.push(parse_cell(&record[before_idx], before_column, row)?);
        after.push(parse_cell(&record[after_idx], after_column, row)?);
    }

    let source = DataSource::File {
        path: path.to_path_buf(),
        rows: complete.len(),
        cols: headers.len(),
        columns: headers,
    };

    Ok((PairedSample::new(before, after)?, source))
}

/// Generates the seeded fallback sample.
///
/// All `before` draws come first, then all `after` draws, from a single
/// ChaCha20 stream, so a seed always yields the same pairs.
pub fn synthesize(fallback: &FallbackSpec) -> Result<PairedSample> {
    let before_dist = normal("before", fallback.before_mean, fallback.before_sd)?;
    let after_dist = normal("after", fallback.after_mean, fallback.after_sd)?;

    let mut rng = ChaCha20Rng::seed_from_u64(fallback.seed);
    let before: Vec<f64> = (0..fallback.size).map(|_| before_dist.sample(&mut rng)).collect();
    let after: Vec<f64> = (0..fallback.size).map(|_| after_dist.sample(&mut rng)).collect();

    PairedSample::new(before, after)
}

/// `rand_distr` accepts a negative standard deviation, so it is checked here.
fn normal(label: &str, mean: f64, sd: f64) -> Result<Normal<f64>> {
    if !mean.is_finite() || !sd.is_finite() || sd <= 0.0 {
        return Err(AnalysisError::Distribution(format!(
            "{label}: mean {mean} and sd {sd} must be finite with sd > 0"
        )));
    }
    Normal::new(mean, sd).map_err(|e| AnalysisError::Distribution(format!("{label}: {e}")))
}

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell)
}

fn column_index(headers: &[String], name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| AnalysisError::MissingColumn {
            column: name.to_string(),
            available: headers.to_vec(),
        })
}

fn parse_cell(cell: &str, column: &str, row: usize) -> Result<f64> {
    cell.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AnalysisError::NonNumeric {
            column: column.to_string(),
            row,
            value: cell.to_string(),
        })
}
