//! Historical closing-price chart rendering.
//!
//! Charts are drawn with the plotters SVG backend and shipped base64-encoded, so the
//! same series always yields the same bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Datelike, NaiveDate};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::fmt;

pub const CHART_TITLE: &str = "Historical Closing Prices";
pub const CHART_FORMAT: &str = "svg";
const CHART_SIZE: (u32, u32) = (1000, 600);

#[derive(Debug, Clone, PartialEq)]
pub enum ChartError {
    NoData,
    NonFinitePrice(NaiveDate),
    Render(String),
}

impl fmt::Display for ChartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartError::NoData => write!(f, "no price points to chart"),
            ChartError::NonFinitePrice(date) => write!(f, "price on {} is not a finite number", date),
            ChartError::Render(msg) => write!(f, "chart rendering failed: {}", msg),
        }
    }
}

/// Renders `(date, close)` pairs, in the order given, as an SVG line chart with markers.
pub fn render_price_chart_svg(points: &[(NaiveDate, f64)]) -> Result<String, ChartError> {
    if points.is_empty() {
        return Err(ChartError::NoData);
    }
    if let Some((date, _)) = points.iter().find(|(_, price)| !price.is_finite()) {
        return Err(ChartError::NonFinitePrice(*date));
    }

    let series: Vec<(f64, f64)> = points
        .iter()
        .map(|(date, price)| (day_number(*date), *price))
        .collect();
    let (x_range, y_range) = axis_ranges(&series)?;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(CHART_TITLE, ("sans-serif", 24))
            .margin(20)
            .x_label_area_size(90)
            .y_label_area_size(80)
            .build_cartesian_2d(x_range, y_range)
            .map_err(render_error)?;

        let rotated = TextStyle::from(("sans-serif", 12))
            .transform(FontTransform::Rotate90)
            .pos(Pos::new(HPos::Left, VPos::Center));
        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc("Closing Price (USD)")
            .x_labels(12)
            .x_label_style(rotated)
            .x_label_formatter(&|x| format_day_number(*x))
            .y_label_formatter(&|y| format!("{:.2}", y))
            .draw()
            .map_err(render_error)?;

        chart
            .draw_series(LineSeries::new(series.iter().copied(), &BLUE))
            .map_err(render_error)?;
        chart
            .draw_series(
                series
                    .iter()
                    .map(|point| Circle::new(*point, 2, BLUE.filled())),
            )
            .map_err(render_error)?;

        root.present().map_err(render_error)?;
    }

    Ok(svg)
}

/// Renders the chart and encodes it for JSON transport.
pub fn render_price_chart_base64(points: &[(NaiveDate, f64)]) -> Result<String, ChartError> {
    let svg = render_price_chart_svg(points)?;
    Ok(STANDARD.encode(svg.as_bytes()))
}

fn render_error<E: std::error::Error>(err: E) -> ChartError {
    ChartError::Render(err.to_string())
}

fn day_number(date: NaiveDate) -> f64 {
    date.num_days_from_ce() as f64
}

fn format_day_number(x: f64) -> String {
    NaiveDate::from_num_days_from_ce_opt(x.round() as i32)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Axis bounds with a little headroom; degenerate ranges are widened so a single point
/// still gets a drawable plot area. Prices so extreme that the padded bounds overflow are
/// rejected.
fn axis_ranges(
    series: &[(f64, f64)],
) -> Result<(std::ops::Range<f64>, std::ops::Range<f64>), ChartError> {
    let (mut x_min, mut x_max) = (f64::MAX, f64::MIN);
    let (mut y_min, mut y_max) = (f64::MAX, f64::MIN);
    for (x, y) in series {
        x_min = x_min.min(*x);
        x_max = x_max.max(*x);
        y_min = y_min.min(*y);
        y_max = y_max.max(*y);
    }

    if x_max - x_min < 1.0 {
        x_min -= 1.0;
        x_max += 1.0;
    }
    let pad = if y_max > y_min {
        (y_max - y_min) * 0.05
    } else {
        y_max.abs().max(1.0) * 0.05
    };

    let (y_low, y_high) = (y_min - pad, y_max + pad);
    if ![x_min, x_max, y_low, y_high].iter().all(|v| v.is_finite()) {
        return Err(ChartError::Render(format!(
            "price axis overflows ({} to {})",
            y_min, y_max
        )));
    }
    Ok((x_min..x_max, y_low..y_high))
}
