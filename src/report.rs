//! Console summary of a finished analysis.

use colored::Colorize;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::data::DataSource;
use crate::hypothesis::TestSuite;
use crate::stats;
use crate::transform::PreparedData;

const RULE_WIDTH: usize = 40;

/// Interpretation of the normality test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Normality {
    Normal,
    NotNormal,
}

impl Normality {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::NotNormal => "NOT NORMAL",
        }
    }
}

/// `Normal` only when `p_value` is strictly above `alpha`.
pub fn normality_label(p_value: f64, alpha: f64) -> Normality {
    if p_value > alpha {
        Normality::Normal
    } else {
        Normality::NotNormal
    }
}

/// Everything a run produced, in printable and serializable form.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub source: DataSource,
    pub n: usize,
    pub alpha: f64,
    pub tests: TestSuite,
    pub normality: Normality,
    /// Mean of `after - before`.
    pub mean_difference: f64,
    pub plot: PathBuf,
}

impl AnalysisReport {
    pub fn new(
        source: DataSource,
        data: &PreparedData,
        tests: TestSuite,
        alpha: f64,
        plot: PathBuf,
    ) -> Self {
        Self {
            source,
            n: data.sample.len(),
            alpha,
            normality: normality_label(tests.normality.p_value, alpha),
            tests,
            mean_difference: stats::mean(&data.difference),
            plot,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Plain text by default; the alternate form (`{:#}`) bolds the headers.
impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let styled = f.alternate();
        let header = |text: String| {
            if styled {
                text.bold().to_string()
            } else {
                text
            }
        };
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(f)?;
        writeln!(f, "{rule}")?;
        writeln!(f, "{}", header(format!("{:^RULE_WIDTH$}", "STATISTICAL SUMMARY")))?;
        writeln!(f, "{rule}")?;
        writeln!(f)?;
        writeln!(f, "{}", header("1. NORMALITY CHECK (Difference)".to_string()))?;
        writeln!(
            f,
            "   Shapiro-Wilk p-value: {:.5}",
            self.tests.normality.p_value
        )?;
        writeln!(
            f,
            "   -> Data is {}. (Check QQ Plot bottom-right)",
            self.normality.as_str()
        )?;
        writeln!(f)?;
        writeln!(f, "{}", header("2. HYPOTHESIS TESTS".to_string()))?;
        writeln!(
            f,
            "   Paired T-Test p-value:       {:.5}",
            self.tests.paired_t.p_value
        )?;
        writeln!(
            f,
            "   Wilcoxon Signed-Rank p-value: {:.5}",
            self.tests.signed_rank.p_value
        )?;
        writeln!(f)?;
        writeln!(f, "{}", header("3. DESCRIPTIVE".to_string()))?;
        writeln!(f, "   Mean Difference (Growth):     {:.2}", self.mean_difference)?;
        writeln!(f, "{rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PairedSample;
    use crate::hypothesis::{SignedRankMethod, TestResult};
    use crate::transform::prepare;
    use pretty_assertions::assert_eq;

    fn report() -> AnalysisReport {
        let data = prepare(
            PairedSample::new(
                vec![10.0, 12.0, 14.0, 16.0, 18.0],
                vec![12.0, 13.0, 17.0, 15.0, 20.0],
            )
            .unwrap(),
        );
        let tests = TestSuite {
            normality: TestResult {
                statistic: 0.914_078,
                p_value: 0.492_481,
            },
            paired_t: TestResult {
                statistic: 2.064_187,
                p_value: 0.107_939,
            },
            paired_t_df: 4,
            signed_rank: TestResult {
                statistic: 1.5,
                p_value: 0.102_470,
            },
            signed_rank_method: SignedRankMethod::Approx,
        };
        AnalysisReport::new(
            DataSource::Synthetic { seed: 42, size: 5 },
            &data,
            tests,
            0.05,
            PathBuf::from("out.png"),
        )
    }

    #[test]
    fn test_normality_boundary() {
        assert_eq!(normality_label(0.05, 0.05), Normality::NotNormal);
        assert_eq!(normality_label(0.050_001, 0.05), Normality::Normal);
        assert_eq!(normality_label(0.01, 0.05), Normality::NotNormal);
        assert_eq!(Normality::NotNormal.as_str(), "NOT NORMAL");
    }

    #[test]
    fn test_summary_layout() {
        let title = format!("{}STATISTICAL SUMMARY{}", " ".repeat(10), " ".repeat(11));
        let expected = format!(
            "\n\
========================================
{title}
========================================

1. NORMALITY CHECK (Difference)
   Shapiro-Wilk p-value: 0.49248
   -> Data is NORMAL. (Check QQ Plot bottom-right)

2. HYPOTHESIS TESTS
   Paired T-Test p-value:       0.10794
   Wilcoxon Signed-Rank p-value: 0.10247

3. DESCRIPTIVE
   Mean Difference (Growth):     1.40
========================================
"
        );
        assert_eq!(report().to_string(), expected);
    }

    #[test]
    fn test_styled_summary_keeps_content() {
        let report = report();
        let styled = format!("{report:#}");
        for line in report.to_string().lines() {
            assert!(styled.contains(line.trim()), "missing line: {line}");
        }
        assert_eq!(styled.matches("========================================").count(), 3);
    }

    #[test]
    fn test_json_fields() {
        let json: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();
        assert_eq!(json["n"], 5);
        assert_eq!(json["normality"], "NORMAL");
        assert_eq!(json["source"]["kind"], "synthetic");
        assert_eq!(json["tests"]["signed_rank_method"], "approx");
        assert!((json["mean_difference"].as_f64().unwrap() - 1.4).abs() < 1e-12);
    }
}
