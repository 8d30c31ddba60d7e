//! SVG rendering of the per-ticker statistics.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use plotters::prelude::*;
use tracing::{info, warn};

use crate::analysis::{detect_outliers, TickerStats};
use crate::series::InstrumentSeries;
use crate::Result;

const SIZE: (u32, u32) = (1400, 700);
const BAR_SIZE: (u32, u32) = (900, 600);

fn day_number(date: NaiveDate) -> i32 {
    date.num_days_from_ce()
}

fn day_label(day: &i32) -> String {
    NaiveDate::from_num_days_from_ce_opt(*day)
        .map(|d| d.format("%Y-%m").to_string())
        .unwrap_or_default()
}

fn padded(min: f64, max: f64) -> Range<f64> {
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    let span = max - min;
    let pad = if span == 0.0 {
        min.abs().max(1.0) * 0.05
    } else {
        span * 0.05
    };
    (min - pad)..(max + pad)
}

fn bounds<I: IntoIterator<Item = f64>>(values: I) -> (f64, f64) {
    values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

fn date_range(series: &[&InstrumentSeries]) -> Range<i32> {
    let days = series.iter().flat_map(|s| s.bars.iter().map(|b| day_number(b.date)));
    let (lo, hi) = days.fold((i32::MAX, i32::MIN), |(lo, hi), d| (lo.min(d), hi.max(d)));
    if lo > hi {
        return 0..1;
    }
    lo..hi.max(lo + 1)
}

/// Close over time, one line per ticker
pub fn closing_trends(path: &Path, series: &[InstrumentSeries]) -> Result<()> {
    let refs: Vec<&InstrumentSeries> = series.iter().collect();
    let (lo, hi) = bounds(series.iter().flat_map(|s| s.closes()));

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Closing Price Trends", ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(date_range(&refs), padded(lo, hi))?;

    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("Closing Price")
        .x_label_formatter(&day_label)
        .draw()?;

    for (i, s) in series.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(LineSeries::new(
                s.bars.iter().map(|b| (day_number(b.date), b.close)),
                color.stroke_width(2),
            ))?
            .label(s.ticker.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Close line with IQR outliers marked, optionally with volume on a second axis
pub fn close_with_outliers(path: &Path, series: &InstrumentSeries, with_volume: bool) -> Result<()> {
    let closes = series.closes();
    let outliers = detect_outliers(&closes);
    let (lo, hi) = bounds(closes.iter().copied());
    let x_range = date_range(&[series]);

    let title = if with_volume {
        format!("{} Closing Prices, Outliers, and Volume", series.ticker)
    } else {
        format!("{} Closing Prices with Outliers", series.ticker)
    };

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let max_volume = series.bars.iter().map(|b| b.volume).max().unwrap_or(0) as f64;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .right_y_label_area_size(if with_volume { 90 } else { 0 })
        .build_cartesian_2d(x_range.clone(), padded(lo, hi))?
        .set_secondary_coord(x_range, 0.0..(max_volume * 1.05).max(1.0));

    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("Close Price")
        .x_label_formatter(&day_label)
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            series.bars.iter().map(|b| (day_number(b.date), b.close)),
            BLUE.stroke_width(2),
        ))?
        .label("Closing Prices")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(2)));

    chart
        .draw_series(outliers.iter().map(|&i| {
            let bar = &series.bars[i];
            Circle::new((day_number(bar.date), bar.close), 4, RED.filled())
        }))?
        .label("Outliers")
        .legend(|(x, y)| Circle::new((x + 10, y), 4, RED.filled()));

    if with_volume {
        chart.configure_secondary_axes().y_desc("Volume").draw()?;
        chart
            .draw_secondary_series(LineSeries::new(
                series.bars.iter().map(|b| (day_number(b.date), b.volume as f64)),
                GREEN.mix(0.3),
            ))?
            .label("Volume")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], GREEN.mix(0.3)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// One bar per ticker. Negative values hang below the zero line.
///
/// Returns `false` without touching `path` when there is nothing to draw.
pub fn bar_chart(path: &Path, title: &str, y_desc: &str, values: &[(String, f64)]) -> Result<bool> {
    if values.is_empty() {
        warn!(title, "no values to chart");
        return Ok(false);
    }

    let (lo, hi) = bounds(values.iter().map(|(_, v)| *v));
    let y_range = padded(lo.min(0.0), hi.max(0.0));
    let n = values.len() as i32;

    let root = SVGBackend::new(path, BAR_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 26))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(90)
        .build_cartesian_2d((0..n).into_segmented(), y_range)?;

    let label = |v: &SegmentValue<i32>| match v {
        SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => values
            .get(*i as usize)
            .map(|(name, _)| name.clone())
            .unwrap_or_default(),
        SegmentValue::Last => String::new(),
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc(y_desc)
        .x_labels(values.len())
        .x_label_formatter(&label)
        .draw()?;

    chart.draw_series(values.iter().enumerate().map(|(i, (_, v))| {
        let i = i as i32;
        let mut bar = Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *v)],
            Palette99::pick(i as usize).mix(0.8).filled(),
        );
        bar.set_margin(0, 0, 12, 12);
        bar
    }))?;

    root.present()?;
    Ok(true)
}

/// Yearly mean close, one line per ticker. Returns `false` when no year has data.
pub fn yearly_average_close(path: &Path, stats: &[TickerStats]) -> Result<bool> {
    let years = stats.iter().flat_map(|s| s.yearly_close.keys().copied());
    let (first, last) = years.fold((i32::MAX, i32::MIN), |(lo, hi), y| (lo.min(y), hi.max(y)));
    if first > last {
        warn!("no yearly averages to chart");
        return Ok(false);
    }
    let (lo, hi) = bounds(stats.iter().flat_map(|s| s.yearly_close.values().copied()));

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Yearly Average Closing Prices", ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(first..last.max(first + 1), padded(lo, hi))?;

    chart
        .configure_mesh()
        .x_desc("Year")
        .y_desc("Average Closing Price")
        .draw()?;

    for (i, s) in stats.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(LineSeries::new(
                s.yearly_close.iter().map(|(y, v)| (*y, *v)),
                color.stroke_width(2),
            ))?
            .label(s.ticker.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(true)
}

/// Render the full chart set into `dir`, returning the files written
pub fn render_all(
    dir: &Path,
    series: &[InstrumentSeries],
    stats: &[TickerStats],
    outlier_ticker: &str,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let path = dir.join("closing_trends.svg");
    closing_trends(&path, series)?;
    written.push(path);

    match series.iter().find(|s| s.ticker == outlier_ticker) {
        Some(s) => {
            let path = dir.join(format!("{}_outliers.svg", s.ticker));
            close_with_outliers(&path, s, false)?;
            written.push(path);

            let path = dir.join(format!("{}_outliers_volume.svg", s.ticker));
            close_with_outliers(&path, s, true)?;
            written.push(path);
        }
        None => warn!(ticker = outlier_ticker, "outlier ticker not loaded, skipping outlier charts"),
    }

    let bars: [(&str, &str, &str, Vec<(String, f64)>); 4] = [
        (
            "average_volume.svg",
            "Average Trading Volume",
            "Average Volume",
            stats.iter().filter_map(|s| Some((s.ticker.clone(), s.mean_volume?))).collect(),
        ),
        (
            "roi.svg",
            "Return on Investment (%)",
            "ROI (%)",
            stats.iter().filter_map(|s| Some((s.ticker.clone(), s.roi?))).collect(),
        ),
        (
            "volatility.svg",
            "Average Daily Volatility",
            "Average Price Difference (High-Low)",
            stats.iter().filter_map(|s| Some((s.ticker.clone(), s.volatility?))).collect(),
        ),
        (
            "dividends.svg",
            "Total Dividends Distributed",
            "Total Dividends",
            stats.iter().map(|s| (s.ticker.clone(), s.total_dividends)).collect(),
        ),
    ];

    for (file, title, y_desc, values) in bars {
        let path = dir.join(file);
        if bar_chart(&path, title, y_desc, &values)? {
            written.push(path);
        }
    }

    let path = dir.join("yearly_average_close.svg");
    if yearly_average_close(&path, stats)? {
        written.push(path);
    }

    info!(dir = %dir.display(), charts = written.len(), "rendered charts");
    Ok(written)
}
