//! Four-panel diagnostic figure.
//!
//! Top-left: before/after scatter with regression and identity lines.
//! Top-right: box plots by occasion with a jittered strip.
//! Bottom-left: histogram and density of the differences.
//! Bottom-right: normal QQ plot of the differences.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::path::Path;
use tracing::{debug, info};

use crate::config::FigureSpec;
use crate::error::{AnalysisError, Result};
use crate::fonts;
use crate::stats;
use crate::transform::{PreparedData, Time};

type DrawResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;
type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;
type Chart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

const DARK_BLUE: RGBColor = RGBColor(0, 0, 139);
const TEAL: RGBColor = RGBColor(0, 128, 128);
const PURPLE: RGBColor = RGBColor(128, 0, 128);
const BEFORE_FILL: RGBColor = RGBColor(0xff, 0x99, 0x99);
const AFTER_FILL: RGBColor = RGBColor(0x99, 0xff, 0x99);

const FIGURE_TITLE: &str = "Paired Analysis: Before vs. After";
/// Strip-plot jitter is seeded so repeated runs draw identical figures.
const JITTER_SEED: u64 = 0x5EED;
const BOX_WIDTH: f64 = 0.8;
const KDE_POINTS: usize = 200;

/// Converts point sizes to pixels and tracks whether text can be drawn.
#[derive(Debug, Clone, Copy)]
struct Scale {
    px_per_pt: f64,
    text: bool,
}

impl Scale {
    fn new(dpi: u32, text: bool) -> Self {
        Self {
            px_per_pt: f64::from(dpi) / 72.0,
            text,
        }
    }

    fn px(self, points: f64) -> u32 {
        (points * self.px_per_pt).round().max(1.0) as u32
    }

    fn font(self, points: f64) -> TextStyle<'static> {
        (fonts::FAMILY, points * self.px_per_pt).into()
    }

    fn bold(self, points: f64) -> TextStyle<'static> {
        (fonts::FAMILY, points * self.px_per_pt, FontStyle::Bold).into()
    }
}

/// Axis titles for one panel.
struct Axes<'f> {
    x_desc: &'f str,
    y_desc: &'f str,
    x_formatter: Option<&'f dyn Fn(&f64) -> String>,
}

/// Renders the figure to a PNG at `path`.
pub fn render(data: &PreparedData, figure: &FigureSpec, path: &Path) -> Result<()> {
    let text = fonts::ensure_font(&figure.font_paths);
    debug!(font = ?fonts::registered_font(), "rendering figure");
    let scale = Scale::new(figure.dpi, text);
    let (width, height) = figure.pixel_size();

    draw_figure(data, figure, scale, path, (width, height))
        .map_err(|e| AnalysisError::Render(e.to_string()))?;
    info!(path = %path.display(), width, height, "figure saved");
    Ok(())
}

fn draw_figure(
    data: &PreparedData,
    figure: &FigureSpec,
    scale: Scale,
    path: &Path,
    size: (u32, u32),
) -> DrawResult<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let body = if scale.text {
        root.titled(FIGURE_TITLE, scale.bold(18.0))?
    } else {
        root.clone()
    };
    let panels = body.split_evenly((2, 2));

    scatter_panel(&panels[0], data, scale)?;
    box_panel(&panels[1], data, figure, scale)?;
    histogram_panel(&panels[2], data, figure, scale)?;
    qq_panel(&panels[3], data, scale)?;

    root.present()?;
    Ok(())
}

/// Widens `(lo, hi)` by 5% on each side, or by half a unit when flat.
fn padded((lo, hi): (f64, f64)) -> (f64, f64) {
    let span = hi - lo;
    if span.abs() < f64::EPSILON {
        (lo - 0.5, hi + 0.5)
    } else {
        (0.05f64.mul_add(-span, lo), 0.05f64.mul_add(span, hi))
    }
}

fn build_chart<'a, 'b>(
    area: &'a Area<'b>,
    title: &str,
    x: (f64, f64),
    y: (f64, f64),
    scale: Scale,
) -> DrawResult<Chart<'a, 'b>> {
    let mut builder = ChartBuilder::on(area);
    builder.margin(scale.px(14.0));
    if scale.text {
        builder
            .caption(title, scale.bold(14.0))
            .x_label_area_size(scale.px(36.0))
            .y_label_area_size(scale.px(44.0));
    }
    Ok(builder.build_cartesian_2d(x.0..x.1, y.0..y.1)?)
}

fn decorate(chart: &mut Chart<'_, '_>, axes: &Axes<'_>, scale: Scale) -> DrawResult<()> {
    if !scale.text {
        let (x, y) = (chart.x_range(), chart.y_range());
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x.start, y.start), (x.end, y.end)],
            BLACK.stroke_width(scale.px(0.8)),
        )))?;
        return Ok(());
    }

    let mut mesh = chart.configure_mesh();
    mesh.x_desc(axes.x_desc)
        .y_desc(axes.y_desc)
        .axis_desc_style(scale.font(12.0))
        .label_style(scale.font(10.0))
        .bold_line_style(BLACK.mix(0.12).stroke_width(scale.px(0.6)))
        .light_line_style(TRANSPARENT.stroke_width(0))
        .axis_style(BLACK.stroke_width(scale.px(0.8)))
        .set_all_tick_mark_size(scale.px(3.5));
    if let Some(formatter) = axes.x_formatter {
        mesh.x_label_formatter(formatter).x_labels(5).disable_x_mesh();
    }
    mesh.draw()?;
    Ok(())
}

fn draw_legend<'a, 'b: 'a>(chart: &mut Chart<'a, 'b>, scale: Scale) -> DrawResult<()> {
    if scale.text {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.85))
            .border_style(BLACK.mix(0.4))
            .label_font(scale.font(10.0))
            .margin(scale.px(6.0))
            .draw()?;
    }
    Ok(())
}

fn scatter_panel(area: &Area<'_>, data: &PreparedData, scale: Scale) -> DrawResult<()> {
    let before = data.sample.before();
    let after = data.sample.after();
    let (x_lo, x_hi) = padded(stats::min_max(before).unwrap_or((0.0, 1.0)));
    let (y_lo, y_hi) = padded(stats::min_max(after).unwrap_or((0.0, 1.0)));
    // Shared limits so the identity line spans the whole plot.
    let lo = x_lo.min(y_lo);
    let hi = x_hi.max(y_hi);

    let mut chart = build_chart(area, "Scatter Plot: Correlation", (lo, hi), (lo, hi), scale)?;
    decorate(
        &mut chart,
        &Axes {
            x_desc: "Before Score",
            y_desc: "After Score",
            x_formatter: None,
        },
        scale,
    )?;

    let line_width = scale.px(2.0);
    let legend_len = scale.px(20.0) as i32;
    let fit = stats::linregress(before, after);
    let grid = stats::min_max(before)
        .map(|(a, b)| stats::linspace(a, b, 100))
        .unwrap_or_default();

    if let Some(fit) = fit {
        if let Some(band) = stats::mean_response_band(before, after, &fit, &grid, 0.95) {
            let mut outline: Vec<(f64, f64)> = band.iter().map(|&(x, low, _)| (x, low)).collect();
            outline.extend(band.iter().rev().map(|&(x, _, high)| (x, high)));
            chart.draw_series(std::iter::once(Polygon::new(outline, RED.mix(0.15).filled())))?;
        }
    }

    chart.draw_series(
        data.sample
            .pairs()
            .map(|(b, a)| Circle::new((b, a), scale.px(4.4), DARK_BLUE.mix(0.7).filled())),
    )?;

    if let Some(fit) = fit {
        chart
            .draw_series(LineSeries::new(
                grid.iter().map(|&x| (x, fit.predict(x))),
                RED.stroke_width(line_width),
            ))?
            .label("Regression Line")
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + legend_len, y)], RED.stroke_width(line_width))
            });
    }

    chart
        .draw_series(DashedLineSeries::new(
            vec![(lo, lo), (hi, hi)],
            scale.px(5.0),
            scale.px(3.0),
            BLACK.mix(0.5).stroke_width(line_width),
        ))?
        .label("No Change (y=x)")
        .legend(move |(x, y)| {
            PathElement::new(
                vec![(x, y), (x + legend_len, y)],
                BLACK.mix(0.5).stroke_width(line_width),
            )
        });

    draw_legend(&mut chart, scale)
}

fn category_label(value: &f64) -> String {
    Time::ALL
        .iter()
        .enumerate()
        .find(|(i, _)| (value - *i as f64).abs() < 1e-6)
        .map(|(_, time)| time.to_string())
        .unwrap_or_default()
}

fn box_panel(
    area: &Area<'_>,
    data: &PreparedData,
    figure: &FigureSpec,
    scale: Scale,
) -> DrawResult<()> {
    let scores: Vec<f64> = data.long.iter().map(|r| r.score).collect();
    let (y_lo, y_hi) = padded(stats::min_max(&scores).unwrap_or((0.0, 1.0)));

    let mut chart = build_chart(
        area,
        "Boxplot: Central Tendency",
        (-0.5, 1.5),
        (y_lo, y_hi),
        scale,
    )?;
    decorate(
        &mut chart,
        &Axes {
            x_desc: "Time Period",
            y_desc: "Score",
            x_formatter: Some(&category_label),
        },
        scale,
    )?;

    let edge = BLACK.stroke_width(scale.px(1.2));
    let half = BOX_WIDTH / 2.0;
    for (i, time) in Time::ALL.iter().enumerate() {
        let values: Vec<f64> = data.scores(*time).collect();
        let Some(summary) = stats::box_stats(&values) else {
            continue;
        };
        let x = i as f64;
        let fill = match time {
            Time::Before => BEFORE_FILL,
            Time::After => AFTER_FILL,
        };
        chart.draw_series([
            Rectangle::new([(x - half, summary.q1), (x + half, summary.q3)], fill.filled()),
            Rectangle::new([(x - half, summary.q1), (x + half, summary.q3)], edge),
        ])?;
        chart.draw_series([
            PathElement::new(vec![(x - half, summary.median), (x + half, summary.median)], edge),
            PathElement::new(vec![(x, summary.q3), (x, summary.whisker_high)], edge),
            PathElement::new(vec![(x, summary.q1), (x, summary.whisker_low)], edge),
            PathElement::new(
                vec![(x - half / 2.0, summary.whisker_high), (x + half / 2.0, summary.whisker_high)],
                edge,
            ),
            PathElement::new(
                vec![(x - half / 2.0, summary.whisker_low), (x + half / 2.0, summary.whisker_low)],
                edge,
            ),
        ])?;
    }

    let mut rng = ChaCha20Rng::seed_from_u64(JITTER_SEED);
    let jitter = if figure.jitter.is_finite() {
        figure.jitter.abs()
    } else {
        0.0
    };
    let points: Vec<(f64, f64)> = data
        .long
        .iter()
        .map(|r| {
            let x = match r.time {
                Time::Before => 0.0,
                Time::After => 1.0,
            };
            (x + rng.gen_range(-jitter..=jitter), r.score)
        })
        .collect();
    chart.draw_series(
        points
            .into_iter()
            .map(|p| Circle::new(p, scale.px(2.5), BLACK.mix(0.5).filled())),
    )?;
    Ok(())
}

fn histogram_panel(
    area: &Area<'_>,
    data: &PreparedData,
    figure: &FigureSpec,
    scale: Scale,
) -> DrawResult<()> {
    let diff = &data.difference;
    let hist = stats::histogram(diff, figure.hist_bins);
    let lo = hist.edges.first().copied().unwrap_or(0.0);
    let hi = hist.edges.last().copied().unwrap_or(1.0);

    // Density rescaled to counts so it overlays the bars.
    let grid = stats::min_max(diff)
        .map(|(a, b)| stats::linspace(a, b, KDE_POINTS))
        .unwrap_or_default();
    let to_counts = diff.len() as f64 * hist.bin_width();
    let kde: Option<Vec<(f64, f64)>> = stats::gaussian_kde(diff, &grid).map(|density| {
        grid.iter()
            .zip(density)
            .map(|(&x, d)| (x, d * to_counts))
            .collect()
    });

    let kde_peak = kde
        .as_ref()
        .map_or(0.0, |k| k.iter().map(|p| p.1).fold(0.0, f64::max));
    let y_hi = (hist.max_count() as f64).max(kde_peak).max(1.0) * 1.1;
    let (x_lo, x_hi) = padded((lo.min(0.0), hi.max(0.0)));

    let mut chart = build_chart(
        area,
        "Histogram: Distribution of Differences",
        (x_lo, x_hi),
        (0.0, y_hi),
        scale,
    )?;
    decorate(
        &mut chart,
        &Axes {
            x_desc: "Difference (After - Before)",
            y_desc: "Frequency",
            x_formatter: None,
        },
        scale,
    )?;

    let edge = BLACK.stroke_width(scale.px(0.8));
    chart.draw_series(hist.edges.windows(2).zip(&hist.counts).flat_map(|(w, &c)| {
        let corners = [(w[0], 0.0), (w[1], c as f64)];
        [
            Rectangle::new(corners, TEAL.mix(0.6).filled()),
            Rectangle::new(corners, edge),
        ]
    }))?;

    if let Some(kde) = kde {
        chart.draw_series(LineSeries::new(kde, TEAL.stroke_width(scale.px(2.0))))?;
    }

    let line_width = scale.px(2.0);
    let legend_len = scale.px(20.0) as i32;
    chart
        .draw_series(DashedLineSeries::new(
            vec![(0.0, 0.0), (0.0, y_hi)],
            scale.px(5.0),
            scale.px(3.0),
            RED.stroke_width(line_width),
        ))?
        .label("Zero Difference")
        .legend(move |(x, y)| {
            PathElement::new(vec![(x, y), (x + legend_len, y)], RED.stroke_width(line_width))
        });

    draw_legend(&mut chart, scale)
}

fn qq_panel(area: &Area<'_>, data: &PreparedData, scale: Scale) -> DrawResult<()> {
    let plot = stats::probplot(&data.difference);
    let title = format!("QQ Plot (Normality Check)  R²={:.3}", plot.r_squared());

    let (x_lo, x_hi) = padded(stats::min_max(&plot.theoretical).unwrap_or((-1.0, 1.0)));
    let (y_lo, y_hi) = padded(stats::min_max(&plot.ordered).unwrap_or((-1.0, 1.0)));
    let mut chart = build_chart(area, &title, (x_lo, x_hi), (y_lo, y_hi), scale)?;
    decorate(
        &mut chart,
        &Axes {
            x_desc: "Theoretical Quantiles",
            y_desc: "Sample Quantiles",
            x_formatter: None,
        },
        scale,
    )?;

    let radius = scale.px(3.0);
    let points: Vec<(f64, f64)> = plot
        .theoretical
        .iter()
        .copied()
        .zip(plot.ordered.iter().copied())
        .collect();
    chart.draw_series(points.iter().map(|&p| Circle::new(p, radius, PURPLE.filled())))?;
    chart.draw_series(
        points
            .iter()
            .map(|&p| Circle::new(p, radius, BLUE.stroke_width(scale.px(0.6)))),
    )?;

    if let (Some(fit), Some((t_lo, t_hi))) = (plot.fit, stats::min_max(&plot.theoretical)) {
        chart.draw_series(LineSeries::new(
            [(t_lo, fit.predict(t_lo)), (t_hi, fit.predict(t_hi))],
            RED.stroke_width(scale.px(1.5)),
        ))?;
    }
    Ok(())
}
