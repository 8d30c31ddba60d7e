use std::collections::BTreeMap;

use chrono::NaiveDate;
use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::series::InstrumentSeries;
use crate::Result;

/// Multiplier applied to the IQR when deriving outlier fences
pub const IQR_FENCE: f64 = 1.5;

fn float_chunked<I: Iterator<Item = f64>>(name: &str, values: I) -> Float64Chunked {
    Float64Chunked::from_iter_values(name.into(), values)
}

/// Quantile with linear interpolation between closest ranks
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    Float64Chunked::from_slice("values".into(), values)
        .quantile(q, QuantileMethod::Linear)
        .ok()
        .flatten()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutlierBounds {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Tukey fences for a column of values
pub fn outlier_bounds(values: &[f64]) -> Option<OutlierBounds> {
    let q1 = quantile(values, 0.25)?;
    let q3 = quantile(values, 0.75)?;
    let iqr = q3 - q1;

    Some(OutlierBounds {
        q1,
        q3,
        iqr,
        lower: q1 - IQR_FENCE * iqr,
        upper: q3 + IQR_FENCE * iqr,
    })
}

/// Row indices of values strictly outside the fences
pub fn detect_outliers(values: &[f64]) -> Vec<usize> {
    match outlier_bounds(values) {
        Some(bounds) => values
            .iter()
            .enumerate()
            .filter(|(_, v)| !bounds.contains(**v))
            .map(|(i, _)| i)
            .collect(),
        None => Vec::new(),
    }
}

/// Rows of `df` whose `column` lies outside the fences
pub fn outlier_rows(df: &DataFrame, column: &str) -> Result<DataFrame> {
    let values: Vec<f64> = df
        .column(column)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .flatten()
        .collect();

    let Some(bounds) = outlier_bounds(&values) else {
        return Ok(df.clear());
    };

    let rows = df
        .clone()
        .lazy()
        .filter(
            col(column)
                .lt(lit(bounds.lower))
                .or(col(column).gt(lit(bounds.upper))),
        )
        .collect()?;

    Ok(rows)
}

/// Mean daily traded volume
pub fn mean_volume(series: &InstrumentSeries) -> Option<f64> {
    float_chunked("Volume", series.bars.iter().map(|b| b.volume as f64)).mean()
}

/// Percentage return from the first to the last close
pub fn roi(series: &InstrumentSeries) -> Option<f64> {
    let initial = series.first()?.close;
    let last = series.last()?.close;

    if initial == 0.0 {
        return None;
    }

    Some((last - initial) / initial * 100.0)
}

/// Mean intraday range (High - Low)
pub fn volatility(series: &InstrumentSeries) -> Option<f64> {
    let high = float_chunked("High", series.bars.iter().map(|b| b.high));
    let low = float_chunked("Low", series.bars.iter().map(|b| b.low));
    (&high - &low).mean()
}

pub fn total_dividends(series: &InstrumentSeries) -> f64 {
    float_chunked("Dividends", series.bars.iter().map(|b| b.dividends))
        .sum()
        .unwrap_or(0.0)
}

/// Mean close per calendar year
pub fn yearly_average_close(series: &InstrumentSeries) -> Result<BTreeMap<i32, f64>> {
    let yearly = series
        .to_enriched_dataframe()?
        .lazy()
        .group_by([col("Year")])
        .agg([col("Close").mean()])
        .collect()?;

    let years = yearly.column("Year")?.i32()?;
    let closes = yearly.column("Close")?.f64()?;

    Ok(years
        .into_iter()
        .zip(closes)
        .filter_map(|(year, close)| Some((year?, close?)))
        .collect())
}

/// Day-over-day change in close; the first row has no predecessor
pub fn price_drops(series: &InstrumentSeries) -> Vec<Option<f64>> {
    let mut drops = Vec::with_capacity(series.len());
    if series.is_empty() {
        return drops;
    }

    drops.push(None);
    drops.extend(
        series
            .bars
            .windows(2)
            .map(|w| Some(w[1].close - w[0].close)),
    );
    drops
}

/// Date and size of the most negative close-to-close move.
///
/// Ties resolve to the earliest date.
pub fn largest_drop(series: &InstrumentSeries) -> Option<(NaiveDate, f64)> {
    let drops = price_drops(series);

    let mut worst: Option<(usize, f64)> = None;
    for (i, drop) in drops.iter().enumerate() {
        if let Some(d) = drop {
            match worst {
                Some((_, w)) if *d >= w => {}
                _ => worst = Some((i, *d)),
            }
        }
    }

    worst.map(|(i, d)| (series.bars[i].date, d))
}

/// Descriptive statistics for one numeric column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
}

pub fn describe(values: &[f64]) -> Option<Summary> {
    let ca = Float64Chunked::from_slice("values".into(), values);
    let quartile = |q: f64| ca.quantile(q, QuantileMethod::Linear).ok().flatten();

    // Sample standard deviation, undefined for a single observation
    let std = if ca.len() > 1 {
        ca.std(1).unwrap_or(f64::NAN)
    } else {
        f64::NAN
    };

    Some(Summary {
        count: ca.len(),
        mean: ca.mean()?,
        std,
        min: ca.min()?,
        q25: quartile(0.25)?,
        q50: quartile(0.5)?,
        q75: quartile(0.75)?,
        max: ca.max()?,
    })
}

/// Per-column summaries for the numeric columns of a series
pub fn describe_series(series: &InstrumentSeries) -> Vec<(&'static str, Summary)> {
    let columns: [(&'static str, Vec<f64>); 6] = [
        ("Open", series.bars.iter().map(|b| b.open).collect()),
        ("High", series.bars.iter().map(|b| b.high).collect()),
        ("Low", series.bars.iter().map(|b| b.low).collect()),
        ("Close", series.closes()),
        ("Volume", series.bars.iter().map(|b| b.volume as f64).collect()),
        ("Dividends", series.bars.iter().map(|b| b.dividends).collect()),
    ];

    columns
        .into_iter()
        .filter_map(|(name, values)| describe(&values).map(|s| (name, s)))
        .collect()
}

/// Everything computed for a single ticker
#[derive(Debug, Clone, PartialEq)]
pub struct TickerStats {
    pub ticker: String,
    pub rows: usize,
    pub mean_volume: Option<f64>,
    pub roi: Option<f64>,
    pub volatility: Option<f64>,
    pub total_dividends: f64,
    pub yearly_close: BTreeMap<i32, f64>,
    pub largest_drop: Option<(NaiveDate, f64)>,
    pub close_bounds: Option<OutlierBounds>,
    pub outliers: Vec<usize>,
}

pub fn analyze(series: &InstrumentSeries) -> Result<TickerStats> {
    let closes = series.closes();
    let stats = TickerStats {
        ticker: series.ticker.clone(),
        rows: series.len(),
        mean_volume: mean_volume(series),
        roi: roi(series),
        volatility: volatility(series),
        total_dividends: total_dividends(series),
        yearly_close: yearly_average_close(series)?,
        largest_drop: largest_drop(series),
        close_bounds: outlier_bounds(&closes),
        outliers: detect_outliers(&closes),
    };

    debug!(
        ticker = %stats.ticker,
        rows = stats.rows,
        outliers = stats.outliers.len(),
        "analyzed series"
    );

    Ok(stats)
}

/// Analyze every series in parallel, keeping input order
pub fn analyze_all(series: &[InstrumentSeries]) -> Result<Vec<TickerStats>> {
    series.par_iter().map(analyze).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::DailyBar;
    use approx::assert_relative_eq;

    fn series_from_closes(closes: &[f64]) -> InstrumentSeries {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| DailyBar {
                date: start + chrono::Days::new(i as u64),
                open: close,
                high: close + 2.0,
                low: close - 1.0,
                close,
                volume: 100 * (i as u64 + 1),
                dividends: 0.0,
            })
            .collect();
        InstrumentSeries::new("TEST", bars)
    }

    #[test]
    fn test_roi_fifty_percent() {
        let series = series_from_closes(&[100.0, 120.0, 90.0, 150.0]);
        assert_relative_eq!(roi(&series).unwrap(), 50.0);
    }

    #[test]
    fn test_roi_empty_and_zero_start() {
        assert!(roi(&InstrumentSeries::default()).is_none());
        assert!(roi(&series_from_closes(&[0.0, 5.0])).is_none());
    }

    #[test]
    fn test_volatility_zero_when_high_equals_low() {
        let mut series = series_from_closes(&[10.0, 11.0, 12.0]);
        for bar in &mut series.bars {
            bar.high = 7.0;
            bar.low = 7.0;
        }
        assert_eq!(volatility(&series).unwrap(), 0.0);
    }

    #[test]
    fn test_volatility_mean_range() {
        let series = series_from_closes(&[10.0, 11.0]);
        assert_relative_eq!(volatility(&series).unwrap(), 3.0);
    }

    #[test]
    fn test_price_drops_first_difference() {
        let series = series_from_closes(&[10.0, 12.0, 8.0, 15.0]);
        assert_eq!(
            price_drops(&series),
            vec![None, Some(2.0), Some(-4.0), Some(7.0)]
        );

        let (date, drop) = largest_drop(&series).unwrap();
        assert_eq!(date, series.bars[2].date);
        assert_eq!(drop, -4.0);
    }

    #[test]
    fn test_largest_drop_tie_takes_earliest() {
        let series = series_from_closes(&[10.0, 7.0, 9.0, 6.0]);
        let (date, _) = largest_drop(&series).unwrap();
        assert_eq!(date, series.bars[1].date);
    }

    #[test]
    fn test_largest_drop_needs_two_rows() {
        assert!(largest_drop(&series_from_closes(&[10.0])).is_none());
        assert!(price_drops(&InstrumentSeries::default()).is_empty());
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        assert_relative_eq!(quantile(&values, 0.25).unwrap(), 2.25);
        assert_relative_eq!(quantile(&values, 0.75).unwrap(), 4.75);
        assert!(quantile(&[], 0.5).is_none());
    }

    #[test]
    fn test_outliers_flag_only_extreme_value() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        assert_eq!(detect_outliers(&values), vec![5]);

        let bounds = outlier_bounds(&values).unwrap();
        assert_relative_eq!(bounds.iqr, 2.5);
        assert_relative_eq!(bounds.lower, -1.5);
        assert_relative_eq!(bounds.upper, 8.5);
    }

    #[test]
    fn test_outlier_rows_filters_frame() {
        let df = df! {
            "Date" => &["a", "b", "c", "d", "e", "f"],
            "Close" => &[1.0, 2.0, 3.0, 4.0, 5.0, 100.0],
        }
        .unwrap();

        let rows = outlier_rows(&df, "Close").unwrap();
        assert_eq!(rows.height(), 1);
        let date = rows.column("Date").unwrap().str().unwrap().get(0);
        assert_eq!(date, Some("f"));
    }

    #[test]
    fn test_yearly_average_two_groups() {
        let bars = [
            ("2022-12-29", 10.0),
            ("2022-12-30", 20.0),
            ("2023-01-03", 30.0),
            ("2023-01-04", 40.0),
            ("2023-01-05", 50.0),
        ]
        .iter()
        .map(|(d, c)| DailyBar {
            date: NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap(),
            open: *c,
            high: *c,
            low: *c,
            close: *c,
            volume: 0,
            dividends: 0.0,
        })
        .collect();
        let series = InstrumentSeries::new("GLD", bars);

        let yearly = yearly_average_close(&series).unwrap();
        assert_eq!(yearly.len(), 2);
        assert_relative_eq!(yearly[&2022], 15.0);
        assert_relative_eq!(yearly[&2023], 40.0);
    }

    #[test]
    fn test_yearly_average_empty_series() {
        let yearly = yearly_average_close(&InstrumentSeries::default()).unwrap();
        assert!(yearly.is_empty());
    }

    #[test]
    fn test_mean_volume_and_dividends() {
        let mut series = series_from_closes(&[1.0, 1.0, 1.0]);
        series.bars[1].dividends = 0.5;
        series.bars[2].dividends = 0.25;

        assert_relative_eq!(mean_volume(&series).unwrap(), 200.0);
        assert_relative_eq!(total_dividends(&series), 0.75);
        assert!(mean_volume(&InstrumentSeries::default()).is_none());
        assert_eq!(total_dividends(&InstrumentSeries::default()), 0.0);
    }

    #[test]
    fn test_describe() {
        let summary = describe(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(summary.count, 4);
        assert_relative_eq!(summary.mean, 2.5);
        assert_relative_eq!(summary.std, 1.2909944487358056);
        assert_eq!(summary.min, 1.0);
        assert_relative_eq!(summary.q50, 2.5);
        assert_eq!(summary.max, 4.0);

        assert!(describe(&[5.0]).unwrap().std.is_nan());
        assert!(describe(&[]).is_none());
    }

    #[test]
    fn test_analyze_all_keeps_order() {
        let mut a = series_from_closes(&[1.0, 2.0]);
        a.ticker = "SPY".to_string();
        let mut b = series_from_closes(&[2.0, 1.0]);
        b.ticker = "QQQ".to_string();

        let stats = analyze_all(&[a, b]).unwrap();
        let tickers: Vec<&str> = stats.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["SPY", "QQQ"]);
        assert_relative_eq!(stats[1].roi.unwrap(), -50.0);
    }
}
