//! Analysis configuration.
//!
//! Every parameter of the pipeline has a fixed default. A YAML file may
//! override any subset of them, and the CLI may override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, Result};

/// Top-level configuration for one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// CSV file holding the paired measurements.
    pub input: PathBuf,
    /// Where the 2x2 figure is written.
    pub output: PathBuf,
    /// Column read as the "Before" measurement.
    pub before_column: String,
    /// Column read as the "After" measurement.
    pub after_column: String,
    /// Significance threshold for the normality interpretation.
    pub alpha: f64,
    /// Open the saved figure in an image viewer.
    pub show: bool,
    /// Synthetic data used when the input file is absent.
    pub fallback: FallbackSpec,
    /// Figure geometry and styling.
    pub figure: FigureSpec,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("Stats.csv"),
            output: PathBuf::from("paired_analysis_plots.png"),
            before_column: "Math_Score".to_string(),
            after_column: "English_Score".to_string(),
            alpha: 0.05,
            show: true,
            fallback: FallbackSpec::default(),
            figure: FigureSpec::default(),
        }
    }
}

/// Parameters of the synthetic fallback sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackSpec {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Number of paired records.
    pub size: usize,
    pub before_mean: f64,
    pub before_sd: f64,
    pub after_mean: f64,
    pub after_sd: f64,
}

impl Default for FallbackSpec {
    fn default() -> Self {
        Self {
            seed: 42,
            size: 30,
            before_mean: 15.0,
            before_sd: 3.0,
            after_mean: 19.0,
            after_sd: 3.5,
        }
    }
}

/// Figure geometry. Sizes are in inches and points, scaled by `dpi`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FigureSpec {
    pub width_in: f64,
    pub height_in: f64,
    pub dpi: u32,
    /// Histogram bin count for the difference panel.
    pub hist_bins: usize,
    /// Half-width of the strip-plot jitter, in category units.
    pub jitter: f64,
    /// Extra TrueType/OpenType fonts tried before the system defaults.
    pub font_paths: Vec<PathBuf>,
}

impl Default for FigureSpec {
    fn default() -> Self {
        Self {
            width_in: 18.0,
            height_in: 14.0,
            dpi: 300,
            hist_bins: 10,
            jitter: 0.1,
            font_paths: Vec::new(),
        }
    }
}

impl FigureSpec {
    /// Pixel dimensions of the rendered bitmap.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn pixel_size(&self) -> (u32, u32) {
        let dpi = f64::from(self.dpi);
        (
            (self.width_in * dpi).round() as u32,
            (self.height_in * dpi).round() as u32,
        )
    }
}

impl AnalysisConfig {
    /// Checks that every parameter is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(AnalysisError::Config(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if self.before_column == self.after_column {
            return Err(AnalysisError::Config(format!(
                "before and after columns must differ (both '{}')",
                self.before_column
            )));
        }
        if self.fallback.size == 0 {
            return Err(AnalysisError::Config(
                "fallback.size must be at least 1".to_string(),
            ));
        }
        let fallback = &self.fallback;
        for (name, sd) in [("before_sd", fallback.before_sd), ("after_sd", fallback.after_sd)] {
            if !(sd.is_finite() && sd > 0.0) {
                return Err(AnalysisError::Config(format!(
                    "fallback.{name} must be finite and positive, got {sd}"
                )));
            }
        }
        for (name, mean) in [
            ("before_mean", fallback.before_mean),
            ("after_mean", fallback.after_mean),
        ] {
            if !mean.is_finite() {
                return Err(AnalysisError::Config(format!(
                    "fallback.{name} must be finite, got {mean}"
                )));
            }
        }
        let figure = &self.figure;
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if figure.dpi == 0 || !positive(figure.width_in) || !positive(figure.height_in) {
            return Err(AnalysisError::Config(
                "figure dimensions and dpi must be finite and positive".to_string(),
            ));
        }
        if !figure.jitter.is_finite() {
            return Err(AnalysisError::Config(format!(
                "figure.jitter must be finite, got {}",
                figure.jitter
            )));
        }
        if self.figure.hist_bins == 0 {
            return Err(AnalysisError::Config(
                "figure.hist_bins must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses a YAML configuration document.
pub fn load_config(content: &str) -> anyhow::Result<AnalysisConfig> {
    let config: AnalysisConfig = serde_yaml_ng::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Reads and parses a YAML configuration file.
pub fn load_config_file(path: &Path) -> anyhow::Result<AnalysisConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_fixed_constants() {
        let config = AnalysisConfig::default();
        assert_eq!(config.before_column, "Math_Score");
        assert_eq!(config.after_column, "English_Score");
        assert_eq!(config.fallback.seed, 42);
        assert_eq!(config.fallback.size, 30);
        assert_eq!(config.figure.dpi, 300);
        assert_eq!(config.figure.hist_bins, 10);
        assert!((config.alpha - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn pixel_size_scales_with_dpi() {
        let figure = FigureSpec::default();
        assert_eq!(figure.pixel_size(), (5400, 4200));
    }

    #[test]
    fn parse_partial_yaml() {
        let yaml = r"
input: data/scores.csv
before_column: Pre
after_column: Post
fallback:
  seed: 7
figure:
  dpi: 100
";
        let config = load_config(yaml).unwrap();
        assert_eq!(config.input, PathBuf::from("data/scores.csv"));
        assert_eq!(config.before_column, "Pre");
        assert_eq!(config.fallback.seed, 7);
        assert_eq!(config.fallback.size, 30);
        assert_eq!(config.figure.dpi, 100);
        assert_eq!(config.figure.hist_bins, 10);
    }

    #[test]
    fn reject_unknown_field() {
        assert!(load_config("bins: 12\n").is_err());
    }

    #[test]
    fn reject_same_columns() {
        let yaml = "before_column: Score\nafter_column: Score\n";
        assert!(load_config(yaml).is_err());
    }

    #[test]
    fn reject_bad_fallback_parameters() {
        assert!(load_config("fallback:\n  before_sd: -3.0\n").is_err());
        assert!(load_config("fallback:\n  after_sd: 0.0\n").is_err());
        assert!(load_config("fallback:\n  after_sd: .nan\n").is_err());
        assert!(load_config("fallback:\n  before_mean: .inf\n").is_err());
    }

    #[test]
    fn reject_non_finite_figure_values() {
        assert!(load_config("figure:\n  jitter: .nan\n").is_err());
        assert!(load_config("figure:\n  jitter: .inf\n").is_err());
        assert!(load_config("figure:\n  width_in: .nan\n").is_err());
        assert!(load_config("figure:\n  height_in: -1.0\n").is_err());
        assert!(load_config("figure:\n  jitter: 0.0\n").is_ok());
    }

    #[test]
    fn reject_zero_dpi() {
        let mut config = AnalysisConfig::default();
        config.figure.dpi = 0;
        assert!(config.validate().is_err());
    }
}
