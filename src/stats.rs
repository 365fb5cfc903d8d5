//! Descriptive statistics and plot geometry.
//!
//! Sample moments, least-squares fits, quartiles, histograms, kernel density
//! estimates and normal probability plots used by the tests and the figure.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Arithmetic mean. `NaN` for an empty slice.
#[must_use]
pub fn mean(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return f64::NAN;
    }
    sample.iter().sum::<f64>() / sample.len() as f64
}

/// Sample variance with `n - 1` in the denominator. `NaN` below two values.
#[must_use]
pub fn variance(sample: &[f64]) -> f64 {
    if sample.len() < 2 {
        return f64::NAN;
    }
    let m = mean(sample);
    sample.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (sample.len() - 1) as f64
}

/// Sample standard deviation (`n - 1`).
#[must_use]
pub fn std_dev(sample: &[f64]) -> f64 {
    variance(sample).sqrt()
}

/// Returns an ascending copy of the sample.
#[must_use]
pub fn sorted(sample: &[f64]) -> Vec<f64> {
    let mut out = sample.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

/// Smallest and largest value, or `None` for an empty slice.
#[must_use]
pub fn min_max(sample: &[f64]) -> Option<(f64, f64)> {
    sample.iter().fold(None, |acc, &x| match acc {
        None => Some((x, x)),
        Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
    })
}

/// `n` evenly spaced points from `start` to `end` inclusive.
#[must_use]
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Ordinary least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation between x and y.
    pub r: f64,
}

impl LinearFit {
    #[must_use]
    pub fn predict(&self, x: f64) -> f64 {
        self.slope.mul_add(x, self.intercept)
    }

    #[must_use]
    pub fn r_squared(&self) -> f64 {
        self.r * self.r
    }
}

/// Fits a least-squares line. `None` when x has no spread or lengths differ.
#[must_use]
pub fn linregress(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mx;
        let dy = yi - my;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx <= 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    let r = if syy <= 0.0 {
        0.0
    } else {
        (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
    };
    Some(LinearFit {
        slope,
        intercept: slope.mul_add(-mx, my),
        r,
    })
}

/// Confidence band of the mean response of a least-squares fit.
///
/// Returns `(x, lower, upper)` for each grid point, or `None` with fewer than
/// three points.
#[must_use]
pub fn mean_response_band(
    x: &[f64],
    y: &[f64],
    fit: &LinearFit,
    grid: &[f64],
    level: f64,
) -> Option<Vec<(f64, f64, f64)>> {
    let n = x.len();
    if n < 3 || n != y.len() {
        return None;
    }
    let mx = mean(x);
    let sxx: f64 = x.iter().map(|xi| (xi - mx).powi(2)).sum();
    let sse: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| (yi - fit.predict(xi)).powi(2))
        .sum();
    let s = (sse / (n - 2) as f64).sqrt();
    let t = StudentsT::new(0.0, 1.0, (n - 2) as f64)
        .ok()?
        .inverse_cdf(0.5 + level / 2.0);

    Some(
        grid.iter()
            .map(|&g| {
                let half = t * s * (1.0 / n as f64 + (g - mx).powi(2) / sxx).sqrt();
                let center = fit.predict(g);
                (g, center - half, center + half)
            })
            .collect(),
    )
}

/// Quantile of an ascending sample by linear interpolation between order
/// statistics.
#[must_use]
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    (sorted[hi] - sorted[lo]).mul_add(frac, sorted[lo])
}

/// Five-number box summary with 1.5 IQR whiskers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Smallest observation within `q1 - 1.5 IQR`.
    pub whisker_low: f64,
    /// Largest observation within `q3 + 1.5 IQR`.
    pub whisker_high: f64,
}

/// Computes box-plot statistics, or `None` for an empty sample.
#[must_use]
pub fn box_stats(sample: &[f64]) -> Option<BoxStats> {
    if sample.is_empty() {
        return None;
    }
    let s = sorted(sample);
    let q1 = quantile(&s, 0.25);
    let median = quantile(&s, 0.5);
    let q3 = quantile(&s, 0.75);
    let iqr = q3 - q1;
    let low_fence = 1.5f64.mul_add(-iqr, q1);
    let high_fence = 1.5f64.mul_add(iqr, q3);
    let whisker_low = s.iter().copied().find(|&v| v >= low_fence).unwrap_or(q1);
    let whisker_high = s
        .iter()
        .rev()
        .copied()
        .find(|&v| v <= high_fence)
        .unwrap_or(q3);
    Some(BoxStats {
        q1,
        median,
        q3,
        whisker_low,
        whisker_high,
    })
}

/// Equal-width histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` ascending bin edges.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    #[must_use]
    pub fn bin_width(&self) -> f64 {
        match self.edges.as_slice() {
            [first, second, ..] => second - first,
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

/// Bins the sample into `bins` equal intervals spanning its range. The last
/// bin is closed on the right; a zero range is widened to one unit.
#[must_use]
pub fn histogram(sample: &[f64], bins: usize) -> Histogram {
    let bins = bins.max(1);
    let (mut lo, mut hi) = min_max(sample).unwrap_or((0.0, 1.0));
    if (hi - lo).abs() < f64::EPSILON {
        lo -= 0.5;
        hi += 0.5;
    }
    let edges = linspace(lo, hi, bins + 1);
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in sample {
        let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Histogram { edges, counts }
}

/// Scott's rule bandwidth `sd * n^(-1/5)`.
#[must_use]
pub fn scott_bandwidth(sample: &[f64]) -> f64 {
    std_dev(sample) * (sample.len() as f64).powf(-0.2)
}

/// Gaussian kernel density estimate evaluated on `grid`.
///
/// `None` when the bandwidth is not positive (fewer than two values or no
/// spread).
#[must_use]
pub fn gaussian_kde(sample: &[f64], grid: &[f64]) -> Option<Vec<f64>> {
    let bw = scott_bandwidth(sample);
    if !(bw.is_finite() && bw > 0.0) {
        return None;
    }
    let norm = 1.0 / (sample.len() as f64 * bw * (2.0 * std::f64::consts::PI).sqrt());
    Some(
        grid.iter()
            .map(|&g| {
                norm * sample
                    .iter()
                    .map(|&x| (-0.5 * ((g - x) / bw).powi(2)).exp())
                    .sum::<f64>()
            })
            .collect(),
    )
}

/// Normal probability plot data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbPlot {
    /// Theoretical standard-normal quantiles.
    pub theoretical: Vec<f64>,
    /// Ascending sample values.
    pub ordered: Vec<f64>,
    pub fit: Option<LinearFit>,
}

impl ProbPlot {
    /// Squared correlation of the fitted line, `NaN` without a fit.
    #[must_use]
    pub fn r_squared(&self) -> f64 {
        self.fit.map_or(f64::NAN, |f| f.r_squared())
    }
}

/// Filliben's estimate of the uniform order-statistic medians.
#[must_use]
pub fn uniform_order_medians(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let last = 0.5f64.powf(1.0 / n as f64);
    let mut v: Vec<f64> = (1..=n)
        .map(|i| (i as f64 - 0.3175) / (n as f64 + 0.365))
        .collect();
    v[n - 1] = last;
    v[0] = 1.0 - last;
    v
}

/// Pairs ordered sample values with normal quantiles and fits a line.
#[must_use]
pub fn probplot(sample: &[f64]) -> ProbPlot {
    let normal = Normal::standard();
    let theoretical: Vec<f64> = uniform_order_medians(sample.len())
        .into_iter()
        .map(|p| normal.inverse_cdf(p))
        .collect();
    let ordered = sorted(sample);
    let fit = linregress(&theoretical, &ordered);
    ProbPlot {
        theoretical,
        ordered,
        fit,
    }
}
