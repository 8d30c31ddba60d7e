use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Sheet column order for a persisted series
pub const COLUMNS: [&str; 7] = ["Date", "Open", "High", "Low", "Close", "Volume", "Dividends"];

/// Format used for the Date column in frames and sheets
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One trading day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub dividends: f64,
}

/// Daily history of a single ticker, ordered by date
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstrumentSeries {
    pub ticker: String,
    pub bars: Vec<DailyBar>,
}

impl InstrumentSeries {
    pub fn new(ticker: impl Into<String>, bars: Vec<DailyBar>) -> Self {
        let mut series = InstrumentSeries {
            ticker: ticker.into(),
            bars,
        };
        series.sort_by_date();
        series
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&DailyBar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&DailyBar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    /// Stable sort, so bars sharing a date keep their relative order
    pub fn sort_by_date(&mut self) {
        self.bars.sort_by_key(|b| b.date);
    }

    /// Convert to a DataFrame with the persisted column layout
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let dates: Vec<String> = self
            .bars
            .iter()
            .map(|b| b.date.format(DATE_FORMAT).to_string())
            .collect();
        let open: Vec<f64> = self.bars.iter().map(|b| b.open).collect();
        let high: Vec<f64> = self.bars.iter().map(|b| b.high).collect();
        let low: Vec<f64> = self.bars.iter().map(|b| b.low).collect();
        let close: Vec<f64> = self.bars.iter().map(|b| b.close).collect();
        let volume: Vec<u64> = self.bars.iter().map(|b| b.volume).collect();
        let dividends: Vec<f64> = self.bars.iter().map(|b| b.dividends).collect();

        let df = DataFrame::new(vec![
            Column::new("Date".into(), dates),
            Column::new("Open".into(), open),
            Column::new("High".into(), high),
            Column::new("Low".into(), low),
            Column::new("Close".into(), close),
            Column::new("Volume".into(), volume),
            Column::new("Dividends".into(), dividends),
        ])?;

        Ok(df)
    }

    /// Frame with the analysis columns `Year` and `Price_Drop` appended
    pub fn to_enriched_dataframe(&self) -> Result<DataFrame> {
        let mut df = self.to_dataframe()?;

        let years: Vec<i32> = self.bars.iter().map(|b| b.date.year()).collect();
        df.with_column(Series::new("Year".into(), years))?;
        df.with_column(Series::new(
            "Price_Drop".into(),
            crate::analysis::price_drops(self),
        ))?;

        Ok(df)
    }

    /// Build a series from a reloaded sheet frame.
    ///
    /// This is where the Date column gets its calendar typing back. Every
    /// OHLCV column must be present and non-null; a missing `Dividends`
    /// column reads as no distributions.
    pub fn from_frame(ticker: &str, df: &DataFrame) -> Result<Self> {
        let dates = df.column("Date")?.str()?;
        let open = float_column(df, "Open")?;
        let high = float_column(df, "High")?;
        let low = float_column(df, "Low")?;
        let close = float_column(df, "Close")?;
        let volume = float_column(df, "Volume")?;
        let dividends = if df.column("Dividends").is_ok() {
            Some(float_column(df, "Dividends")?)
        } else {
            None
        };

        let mut bars = Vec::with_capacity(df.height());
        for (i, raw_date) in dates.into_iter().enumerate() {
            let raw_date = raw_date.ok_or_else(|| {
                Error::Parse(format!("{}: null Date at row {}", ticker, i))
            })?;
            let date = parse_date(raw_date)?;

            let required = |values: &[Option<f64>], name: &str| match values[i] {
                Some(v) if v.is_finite() => Ok(v),
                Some(v) => Err(Error::Parse(format!(
                    "{}: non-finite {} {} at row {}",
                    ticker, name, v, i
                ))),
                None => Err(Error::Parse(format!("{}: null {} at row {}", ticker, name, i))),
            };

            let shares = required(&volume, "Volume")?;
            if shares < 0.0 || shares.fract() != 0.0 {
                return Err(Error::Parse(format!(
                    "{}: Volume {} at row {} is not a whole share count",
                    ticker, shares, i
                )));
            }

            bars.push(DailyBar {
                date,
                open: required(&open, "Open")?,
                high: required(&high, "High")?,
                low: required(&low, "Low")?,
                close: required(&close, "Close")?,
                volume: shares as u64,
                dividends: dividends
                    .as_ref()
                    .and_then(|d| d[i])
                    .unwrap_or(0.0),
            });
        }

        Ok(InstrumentSeries::new(ticker, bars))
    }
}

/// Parse a Date cell, accepting a bare date or a datetime with a time part
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed
        .split(|c| c == 'T' || c == ' ')
        .next()
        .unwrap_or(trimmed);

    NaiveDate::parse_from_str(date_part, DATE_FORMAT)
        .map_err(|e| Error::Parse(format!("invalid date '{}': {}", raw, e)))
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}
