//! Derived views of a paired sample.

use serde::Serialize;
use std::fmt;

use crate::data::PairedSample;

/// Measurement occasion in the long-format view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Time {
    Before,
    After,
}

impl Time {
    pub const ALL: [Self; 2] = [Self::Before, Self::After];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "Before",
            Self::After => "After",
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the melted view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LongRecord {
    pub time: Time,
    pub score: f64,
}

/// The sample together with its derived series.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub sample: PairedSample,
    /// `after - before`, one value per row.
    pub difference: Vec<f64>,
    pub long: Vec<LongRecord>,
}

impl PreparedData {
    /// Scores of one occasion, in row order.
    pub fn scores(&self, time: Time) -> impl Iterator<Item = f64> + '_ {
        self.long
            .iter()
            .filter(move |r| r.time == time)
            .map(|r| r.score)
    }
}

/// Computes the difference series and the long-format view.
pub fn prepare(sample: PairedSample) -> PreparedData {
    let difference = difference(&sample);
    let long = melt(&sample);
    PreparedData {
        sample,
        difference,
        long,
    }
}

/// Per-row `after - before`.
pub fn difference(sample: &PairedSample) -> Vec<f64> {
    sample.pairs().map(|(before, after)| after - before).collect()
}

/// Unpivots the sample: every `Before` row in order, then every `After` row.
pub fn melt(sample: &PairedSample) -> Vec<LongRecord> {
    let before = sample.before().iter().map(|&score| LongRecord {
        time: Time::Before,
        score,
    });
    let after = sample.after().iter().map(|&score| LongRecord {
        time: Time::After,
        score,
    });
    before.chain(after).collect()
}
