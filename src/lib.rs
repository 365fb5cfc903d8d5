//! paired-stats: before/after analysis of paired measurements.
//!
//! Loads a paired sample (or a seeded synthetic one), tests the differences
//! for normality and for a shift in location, and renders a four-panel
//! diagnostic figure alongside a console summary.

pub mod config;
pub mod data;
pub mod display;
pub mod error;
pub mod fonts;
pub mod hypothesis;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod stats;
pub mod transform;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use report::AnalysisReport;
