//! Paired hypothesis tests.
//!
//! Shapiro-Wilk normality of the differences, the paired t-test and the
//! Wilcoxon signed-rank test. Every test fails loudly when its preconditions
//! are not met; nothing here recovers.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use std::f64::consts::PI;
use tracing::{debug, warn};

use crate::error::{AnalysisError, Result};
use crate::stats;
use crate::transform::PreparedData;

/// Largest sample for which the signed-rank p-value is computed exactly.
const EXACT_SIGNED_RANK_MAX_N: usize = 50;

/// Above this size the Shapiro-Wilk p-value approximation degrades.
const SHAPIRO_MAX_N: usize = 5000;

/// A test statistic and its two-sided p-value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// How the signed-rank p-value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignedRankMethod {
    /// Exact null distribution of the rank sum.
    Exact,
    /// Normal approximation with tie correction.
    Approx,
}

/// The three results reported for a paired sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestSuite {
    pub normality: TestResult,
    pub paired_t: TestResult,
    pub paired_t_df: usize,
    pub signed_rank: TestResult,
    pub signed_rank_method: SignedRankMethod,
}

/// Runs all three tests. Any failure aborts the whole evaluation.
pub fn evaluate(data: &PreparedData) -> Result<TestSuite> {
    let normality = shapiro_wilk(&data.difference)?;
    debug!(w = normality.statistic, p = normality.p_value, "shapiro-wilk");

    let paired_t = paired_t_test(data.sample.after(), data.sample.before())?;
    debug!(t = paired_t.statistic, p = paired_t.p_value, "paired t-test");

    let (signed_rank, signed_rank_method) =
        wilcoxon_signed_rank(data.sample.after(), data.sample.before())?;
    debug!(
        t = signed_rank.statistic,
        p = signed_rank.p_value,
        method = ?signed_rank_method,
        "wilcoxon signed-rank"
    );

    Ok(TestSuite {
        normality,
        paired_t,
        paired_t_df: data.sample.len() - 1,
        signed_rank,
        signed_rank_method,
    })
}

// Royston (1995) polynomial coefficients.
const C1: [f64; 6] = [0.0, 0.221_157, -0.147_981, -2.071_190, 4.434_685, -2.706_056];
const C2: [f64; 6] = [0.0, 0.042_981, -0.293_762, -1.752_461, 5.682_633, -3.582_633];
const C3: [f64; 4] = [0.5440, -0.399_78, 0.025_054, -6.714e-4];
const C4: [f64; 4] = [1.3822, -0.778_57, 0.062_767, -0.002_032_2];
const C5: [f64; 4] = [-1.5861, -0.310_82, -0.083_751, 0.003_891_5];
const C6: [f64; 3] = [-0.4803, -0.082_676, 0.003_030_2];
const G: [f64; 2] = [-2.273, 0.459];

/// Evaluates `c[0] + c[1] x + c[2] x^2 + ...`.
fn poly(c: &[f64], x: f64) -> f64 {
    c.iter().rev().fold(0.0, |acc, &coef| acc.mul_add(x, coef))
}

/// Shapiro-Wilk W test for normality (Royston's algorithm AS R94).
pub fn shapiro_wilk(sample: &[f64]) -> Result<TestResult> {
    const TEST: &str = "Shapiro-Wilk";
    let n = sample.len();
    if n < 3 {
        return Err(AnalysisError::TooFewSamples {
            test: TEST,
            min: 3,
            got: n,
        });
    }
    if n > SHAPIRO_MAX_N {
        warn!(n, "Shapiro-Wilk p-value may be inaccurate above {SHAPIRO_MAX_N} samples");
    }

    let x = stats::sorted(sample);
    let range = x[n - 1] - x[0];
    if range < 1e-19 {
        return Err(AnalysisError::Degenerate {
            test: TEST,
            reason: "input data has range zero".to_string(),
        });
    }

    let half = shapiro_half_coefficients(n);
    let mut coef = vec![0.0; n];
    for (i, &a) in half.iter().enumerate() {
        coef[i] = -a;
        coef[n - 1 - i] = a;
    }

    // W is the squared correlation between the coefficients and the
    // ordered sample.
    let scaled: Vec<f64> = x.iter().map(|v| v / range).collect();
    let mx = stats::mean(&scaled);
    let mc = stats::mean(&coef);
    let (mut sax, mut ssa, mut ssx) = (0.0, 0.0, 0.0);
    for (&c, &v) in coef.iter().zip(&scaled) {
        let dc = c - mc;
        let dv = v - mx;
        sax += dc * dv;
        ssa += dc * dc;
        ssx += dv * dv;
    }
    let w = (sax * sax / (ssa * ssx)).min(1.0);

    Ok(TestResult {
        statistic: w,
        p_value: shapiro_p_value(w, n),
    })
}

/// Upper half of the antisymmetric Shapiro-Wilk coefficients.
fn shapiro_half_coefficients(n: usize) -> Vec<f64> {
    let nn2 = n / 2;
    let mut a = vec![0.0; nn2];
    if n == 3 {
        a[0] = 0.5f64.sqrt();
        return a;
    }

    let normal = Normal::standard();
    let an = n as f64;
    let an25 = an + 0.25;
    let m: Vec<f64> = (1..=nn2)
        .map(|i| normal.inverse_cdf((i as f64 - 0.375) / an25))
        .collect();
    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / an.sqrt();
    let a1 = poly(&C1, rsn) - m[0] / ssumm2;

    let (first_free, fac) = if n > 5 {
        let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
        let fac = ((summ2 - 2.0 * m[0].powi(2) - 2.0 * m[1].powi(2))
            / (1.0 - 2.0 * a1.powi(2) - 2.0 * a2.powi(2)))
        .sqrt();
        a[1] = a2;
        (2, fac)
    } else {
        let fac = ((summ2 - 2.0 * m[0].powi(2)) / (1.0 - 2.0 * a1.powi(2))).sqrt();
        (1, fac)
    };
    a[0] = a1;
    for i in first_free..nn2 {
        a[i] = -m[i] / fac;
    }
    a
}

fn shapiro_p_value(w: f64, n: usize) -> f64 {
    if n == 3 {
        let pw = 6.0 / PI * (w.sqrt().asin() - PI / 3.0);
        return pw.clamp(0.0, 1.0);
    }

    let an = n as f64;
    let mut y = (1.0 - w).ln();
    let (m, s) = if n <= 11 {
        let gamma = poly(&G, an);
        if y >= gamma {
            return 1e-99;
        }
        y = -(gamma - y).ln();
        (poly(&C3, an), poly(&C4, an).exp())
    } else {
        let ln_n = an.ln();
        (poly(&C5, ln_n), poly(&C6, ln_n).exp())
    };
    Normal::standard().sf((y - m) / s)
}

/// Paired t-test of `after - before` against a zero mean.
pub fn paired_t_test(after: &[f64], before: &[f64]) -> Result<TestResult> {
    const TEST: &str = "Paired t-test";
    check_paired(TEST, after, before)?;
    let n = after.len();
    if n < 2 {
        return Err(AnalysisError::TooFewSamples {
            test: TEST,
            min: 2,
            got: n,
        });
    }

    let diff: Vec<f64> = after.iter().zip(before).map(|(a, b)| a - b).collect();
    let sd = stats::std_dev(&diff);
    if sd <= 0.0 {
        return Err(AnalysisError::Degenerate {
            test: TEST,
            reason: "differences have zero variance".to_string(),
        });
    }

    let t = stats::mean(&diff) / (sd / (n as f64).sqrt());
    let dist = StudentsT::new(0.0, 1.0, (n - 1) as f64).map_err(|e| AnalysisError::Degenerate {
        test: TEST,
        reason: e.to_string(),
    })?;
    Ok(TestResult {
        statistic: t,
        p_value: (2.0 * dist.sf(t.abs())).min(1.0),
    })
}

/// Wilcoxon signed-rank test of `after - before`.
///
/// Zero differences are discarded. The statistic is the smaller of the
/// positive and negative rank sums.
pub fn wilcoxon_signed_rank(
    after: &[f64],
    before: &[f64],
) -> Result<(TestResult, SignedRankMethod)> {
    const TEST: &str = "Wilcoxon signed-rank";
    check_paired(TEST, after, before)?;

    let all: Vec<f64> = after.iter().zip(before).map(|(a, b)| a - b).collect();
    let has_zeros = all.iter().any(|&d| d == 0.0);
    let diff: Vec<f64> = all.into_iter().filter(|&d| d != 0.0).collect();
    let n = diff.len();
    if n == 0 {
        return Err(AnalysisError::Degenerate {
            test: TEST,
            reason: "all paired differences are zero".to_string(),
        });
    }

    let abs: Vec<f64> = diff.iter().map(|d| d.abs()).collect();
    let (ranks, tie_sizes) = average_ranks(&abs);
    let r_plus: f64 = diff
        .iter()
        .zip(&ranks)
        .filter(|(d, _)| **d > 0.0)
        .map(|(_, r)| r)
        .sum();
    let total = (n * (n + 1)) as f64 / 2.0;
    let r_minus = total - r_plus;
    let statistic = r_plus.min(r_minus);

    let has_ties = tie_sizes.iter().any(|&t| t > 1);
    if n <= EXACT_SIGNED_RANK_MAX_N && !has_ties && !has_zeros {
        let p_value = exact_signed_rank_p(statistic, n);
        return Ok((
            TestResult {
                statistic,
                p_value,
            },
            SignedRankMethod::Exact,
        ));
    }

    if n < 10 {
        debug!(n, "signed-rank sample is small; normal approximation is rough");
    }
    let nf = n as f64;
    let mean = nf * (nf + 1.0) / 4.0;
    let tie_term: f64 = tie_sizes
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum();
    let var = nf * (nf + 1.0) * 2.0f64.mul_add(nf, 1.0) / 24.0 - tie_term / 48.0;
    if var <= 0.0 {
        return Err(AnalysisError::Degenerate {
            test: TEST,
            reason: "rank variance is zero".to_string(),
        });
    }
    let z = (statistic - mean) / var.sqrt();
    let p_value = (2.0 * Normal::standard().sf(z.abs())).min(1.0);
    Ok((
        TestResult {
            statistic,
            p_value,
        },
        SignedRankMethod::Approx,
    ))
}

/// Two-sided exact p-value `2 P(T <= t)` for the signed-rank statistic.
fn exact_signed_rank_p(statistic: f64, n: usize) -> f64 {
    let max_sum = n * (n + 1) / 2;
    // counts[s] = number of subsets of {1..n} whose sum is s
    let mut counts = vec![0.0f64; max_sum + 1];
    counts[0] = 1.0;
    for rank in 1..=n {
        for s in (rank..=max_sum).rev() {
            counts[s] += counts[s - rank];
        }
    }
    let t = statistic.floor() as usize;
    let below: f64 = counts.iter().take(t + 1).sum();
    let total = 2.0f64.powi(n as i32);
    (2.0 * below / total).min(1.0)
}

/// Average ranks (1-based) and the sizes of every tie group.
fn average_ranks(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut ties = Vec::new();
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        ties.push(end - start);
        start = end;
    }
    (ranks, ties)
}

fn check_paired(test: &'static str, after: &[f64], before: &[f64]) -> Result<()> {
    if after.len() == before.len() {
        Ok(())
    } else {
        Err(AnalysisError::Degenerate {
            test,
            reason: format!(
                "unequal lengths ({} after, {} before)",
                after.len(),
                before.len()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PairedSample;
    use crate::transform::prepare;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    const BEFORE: [f64; 5] = [10.0, 12.0, 14.0, 16.0, 18.0];
    const AFTER: [f64; 5] = [12.0, 13.0, 17.0, 15.0, 20.0];

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_poly_horner() {
        assert_close(poly(&[1.0, 2.0, 3.0], 2.0), 17.0, 1e-12);
        assert_close(poly(&G, 10.0), 2.317, 1e-12);
    }

    #[test]
    fn test_shapiro_scenario_differences() {
        let r = shapiro_wilk(&[2.0, 1.0, 3.0, -1.0, 2.0]).unwrap();
        assert_close(r.statistic, 0.914_078, 1e-5);
        assert_close(r.p_value, 0.492_481, 1e-4);
    }

    #[test]
    fn test_shapiro_royston_weights() {
        let x = [
            148.0, 154.0, 158.0, 160.0, 161.0, 162.0, 166.0, 170.0, 182.0, 195.0, 236.0,
        ];
        let r = shapiro_wilk(&x).unwrap();
        assert_close(r.statistic, 0.788_815, 1e-5);
        assert_close(r.p_value, 0.006_704, 1e-4);
    }

    #[test]
    fn test_shapiro_uniform_grid() {
        let x: Vec<f64> = (1..=20).map(f64::from).collect();
        let r = shapiro_wilk(&x).unwrap();
        assert_close(r.statistic, 0.960_375, 1e-5);
        assert_close(r.p_value, 0.551_372, 1e-4);
    }

    #[test]
    fn test_shapiro_heavy_tail_rejects() {
        let x = [
            1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 3.0, 10.0, 30.0, 100.0, 200.0, 400.0, 800.0, 1600.0,
        ];
        let r = shapiro_wilk(&x).unwrap();
        assert_close(r.statistic, 0.581_112, 1e-5);
        assert!(r.p_value < 1e-4);
    }

    #[test]
    fn test_shapiro_three_points() {
        let r = shapiro_wilk(&[1.0, 2.0, 3.0]).unwrap();
        assert_close(r.statistic, 1.0, 1e-12);
        assert_close(r.p_value, 1.0, 1e-6);

        let r = shapiro_wilk(&[1.0, 2.0, 4.0]).unwrap();
        assert_close(r.statistic, 0.964_286, 1e-5);
        assert_close(r.p_value, 0.636_887, 1e-4);
    }

    #[test]
    fn test_shapiro_is_order_invariant() {
        let a = shapiro_wilk(&[3.0, -1.0, 2.0, 2.0, 1.0]).unwrap();
        let b = shapiro_wilk(&[2.0, 1.0, 3.0, -1.0, 2.0]).unwrap();
        assert_close(a.statistic, b.statistic, 1e-12);
    }

    #[test]
    fn test_shapiro_preconditions() {
        assert!(matches!(
            shapiro_wilk(&[1.0, 2.0]),
            Err(AnalysisError::TooFewSamples { min: 3, got: 2, .. })
        ));
        assert!(matches!(
            shapiro_wilk(&[4.0, 4.0, 4.0, 4.0]),
            Err(AnalysisError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_paired_t_scenario() {
        let r = paired_t_test(&AFTER, &BEFORE).unwrap();
        assert_close(r.statistic, 2.064_187, 1e-5);
        assert_close(r.p_value, 0.107_939, 1e-4);
    }

    #[test]
    fn test_paired_t_sign_follows_direction() {
        let r = paired_t_test(&BEFORE, &AFTER).unwrap();
        assert!(r.statistic < 0.0);
        assert_close(r.p_value, 0.107_939, 1e-4);
    }

    #[test]
    fn test_paired_t_preconditions() {
        assert!(matches!(
            paired_t_test(&[1.0], &[2.0]),
            Err(AnalysisError::TooFewSamples { .. })
        ));
        assert!(matches!(
            paired_t_test(&[2.0, 3.0, 4.0], &[1.0, 2.0, 3.0]),
            Err(AnalysisError::Degenerate { .. })
        ));
        assert!(paired_t_test(&[1.0, 2.0], &[1.0]).is_err());
    }

    #[test]
    fn test_wilcoxon_scenario_uses_tie_corrected_normal() {
        let (r, method) = wilcoxon_signed_rank(&AFTER, &BEFORE).unwrap();
        assert_eq!(method, SignedRankMethod::Approx);
        assert_close(r.statistic, 1.5, 1e-12);
        assert_close(r.p_value, 0.102_470, 1e-5);
    }

    #[test]
    fn test_wilcoxon_exact_all_positive() {
        let before = [0.0; 5];
        let after = [1.0, 2.0, 3.0, 4.0, 5.0];
        let (r, method) = wilcoxon_signed_rank(&after, &before).unwrap();
        assert_eq!(method, SignedRankMethod::Exact);
        assert_close(r.statistic, 0.0, 1e-12);
        assert_close(r.p_value, 0.0625, 1e-12);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Runs the signed-rank test with a debug-level subscriber and returns the log.
    fn signed_rank_log(after: &[f64], before: &[f64]) -> (SignedRankMethod, String) {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let (_, method) = tracing::subscriber::with_default(subscriber, || {
            wilcoxon_signed_rank(after, before).unwrap()
        });
        let text = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        (method, text)
    }

    #[test]
    fn test_wilcoxon_small_sample_note_only_when_approximate() {
        let (method, log) = signed_rank_log(&[1.0, 2.0, 3.0, 4.0, 5.0], &[0.0; 5]);
        assert_eq!(method, SignedRankMethod::Exact);
        assert!(!log.contains("normal approximation"), "{log}");

        let (method, log) = signed_rank_log(&AFTER, &BEFORE);
        assert_eq!(method, SignedRankMethod::Approx);
        assert!(log.contains("normal approximation is rough"), "{log}");
    }

    #[test]
    fn test_wilcoxon_exact_mixed_signs() {
        let before = [0.0; 5];
        let after = [1.0, -2.0, 3.0, 4.0, 5.0];
        let (r, _) = wilcoxon_signed_rank(&after, &before).unwrap();
        assert_close(r.statistic, 2.0, 1e-12);
        assert_close(r.p_value, 6.0 / 32.0, 1e-12);
    }

    #[test]
    fn test_wilcoxon_zeros_switch_to_approx() {
        let before = [0.0; 6];
        let after = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let (r, method) = wilcoxon_signed_rank(&after, &before).unwrap();
        assert_eq!(method, SignedRankMethod::Approx);
        assert_close(r.statistic, 0.0, 1e-12);
        // z = -7.5 / sqrt(13.75)
        assert_close(r.p_value, 0.043_115, 1e-5);
    }

    #[test]
    fn test_wilcoxon_all_zero_fails() {
        let x = [1.0, 2.0, 3.0];
        assert!(matches!(
            wilcoxon_signed_rank(&x, &x),
            Err(AnalysisError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_average_ranks_with_ties() {
        let (ranks, ties) = average_ranks(&[2.0, 1.0, 3.0, 1.0, 2.0]);
        assert_eq!(ranks, vec![3.5, 1.5, 5.0, 1.5, 3.5]);
        assert_eq!(ties, vec![2, 2, 1]);
    }

    #[test]
    fn test_exact_distribution_is_symmetric() {
        assert_close(exact_signed_rank_p(7.5, 5), 1.0, 1e-12);
        assert_close(exact_signed_rank_p(0.0, 1), 1.0, 1e-12);
    }

    #[test]
    fn test_evaluate_runs_all_tests() {
        let sample = PairedSample::new(BEFORE.to_vec(), AFTER.to_vec()).unwrap();
        let suite = evaluate(&prepare(sample)).unwrap();
        assert_eq!(suite.paired_t_df, 4);
        assert!((0.0..=1.0).contains(&suite.normality.p_value));
        assert!((0.0..=1.0).contains(&suite.paired_t.p_value));
        assert!((0.0..=1.0).contains(&suite.signed_rank.p_value));
    }

    #[test]
    fn test_evaluate_fails_on_too_small_sample() {
        let sample = PairedSample::new(vec![1.0, 2.0], vec![2.0, 4.0]).unwrap();
        assert!(evaluate(&prepare(sample)).is_err());
    }
}
