//! Runs the analysis end to end: load, transform, test, plot, report.

use colored::Colorize;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

use crate::config::AnalysisConfig;
use crate::data::{self, DataSource};
use crate::display;
use crate::error::{AnalysisError, Result};
use crate::hypothesis;
use crate::render;
use crate::report::AnalysisReport;
use crate::transform;

/// Executes one analysis run.
///
/// Status lines go to stdout when `echo` is set. Any stage failure aborts the
/// run; only the image viewer is allowed to fail.
pub fn run(config: &AnalysisConfig, echo: bool) -> Result<AnalysisReport> {
    if echo {
        run_with(config, &mut std::io::stdout().lock())
    } else {
        run_with(config, &mut std::io::sink())
    }
}

/// Same as [`run`], writing status lines to `out`.
pub fn run_with(config: &AnalysisConfig, out: &mut impl Write) -> Result<AnalysisReport> {
    config.validate()?;

    let (sample, source) = data::provide(config)?;
    write_source(out, &source).map_err(status_error)?;

    let prepared = transform::prepare(sample);
    info!(n = prepared.sample.len(), "prepared paired sample");

    let tests = hypothesis::evaluate(&prepared)?;

    render::render(&prepared, &config.figure, &config.output)?;
    writeln!(out, "Plot saved to: {}", config.output.display()).map_err(status_error)?;
    if config.show {
        display::show(&config.output);
    }

    Ok(AnalysisReport::new(
        source,
        &prepared,
        tests,
        config.alpha,
        config.output.clone(),
    ))
}

fn status_error(source: io::Error) -> AnalysisError {
    AnalysisError::Io {
        path: PathBuf::from("<stdout>"),
        source,
    }
}

/// Reports which path the data provider took.
pub fn write_source(out: &mut impl Write, source: &DataSource) -> io::Result<()> {
    match source {
        DataSource::File {
            path,
            columns,
            rows,
            cols,
        } => {
            writeln!(
                out,
                "{} Data loaded from {}",
                "SUCCESS:".green().bold(),
                path.display()
            )?;
            writeln!(out, "Columns found: {columns:?}")?;
            writeln!(out, "Data shape: ({rows}, {cols})")
        }
        DataSource::Synthetic { .. } => writeln!(
            out,
            "{} File not found. Using generated dummy data.",
            "WARNING:".yellow().bold()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> AnalysisConfig {
        let mut config = AnalysisConfig {
            input: dir.join("Stats.csv"),
            output: dir.join("paired_analysis_plots.png"),
            show: false,
            ..AnalysisConfig::default()
        };
        config.figure.width_in = 6.0;
        config.figure.height_in = 4.5;
        config.figure.dpi = 60;
        config
    }

    #[test]
    fn test_absent_input_uses_fallback() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());

        let mut out = Vec::new();
        let report = run_with(&config, &mut out).unwrap();
        let status = String::from_utf8(out).unwrap();

        assert!(status.contains("WARNING:"));
        assert!(status.contains("File not found. Using generated dummy data."));
        assert!(status.contains(&format!("Plot saved to: {}", config.output.display())));
        assert!(report.source.is_synthetic());
        assert_eq!(report.n, 30);
        assert!(config.output.exists());
        for p in [
            report.tests.normality.p_value,
            report.tests.paired_t.p_value,
            report.tests.signed_rank.p_value,
        ] {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_csv_input_scenario() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        std::fs::write(
            &config.input,
            "Math_Score,English_Score\n10,12\n12,13\n14,17\n16,15\n18,20\n",
        )
        .unwrap();

        let mut out = Vec::new();
        let report = run_with(&config, &mut out).unwrap();
        let status = String::from_utf8(out).unwrap();

        assert!(status.contains("SUCCESS:"));
        assert!(status.contains(&format!("Data loaded from {}", config.input.display())));
        assert!(status.contains(r#"Columns found: ["Math_Score", "English_Score"]"#));
        assert!(status.contains("Data shape: (5, 2)"));
        assert!(!report.source.is_synthetic());
        assert_eq!(report.n, 5);
        assert_eq!(format!("{:.2}", report.mean_difference), "1.40");
        assert!((report.tests.paired_t.p_value - 0.107_939).abs() < 1e-5);
        assert!((report.tests.signed_rank.p_value - 0.102_470).abs() < 1e-5);
        assert!(config.output.exists());
    }

    #[test]
    fn test_missing_columns_fail_without_image() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        std::fs::write(&config.input, "Pre,Post\n1,2\n3,5\n4,4\n").unwrap();

        let err = run(&config, false).unwrap_err();

        assert!(matches!(err, AnalysisError::MissingColumn { .. }));
        assert!(!config.output.exists());
    }

    #[test]
    fn test_unwritable_output_fails() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        config.output = dir.path().join("no_such_dir").join("plot.png");

        let err = run(&config, false).unwrap_err();
        assert!(matches!(err, AnalysisError::Render(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        config.alpha = 1.5;
        assert!(matches!(
            run(&config, false).unwrap_err(),
            AnalysisError::Config(_)
        ));
    }
}
