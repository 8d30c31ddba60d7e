//! Daily history download from the Yahoo Finance chart endpoint.
//!
//! Dates are converted to the exchange's local calendar day using the
//! `gmtoffset` reported in the response metadata, which leaves every bar
//! timezone-naive.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::series::{DailyBar, InstrumentSeries};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    events: Option<Events>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    #[serde(default)]
    gmtoffset: i64,
    #[serde(default)]
    exchange_timezone_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Events {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Calendar day of a unix timestamp shifted by the exchange offset
fn local_date(timestamp: i64, gmtoffset: i64) -> Result<NaiveDate> {
    DateTime::from_timestamp(timestamp + gmtoffset, 0)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| Error::Fetch(format!("timestamp out of range: {}", timestamp)))
}

/// Turn a chart response body into a series.
///
/// Bars with any missing OHLCV field are skipped. With `auto_adjust`, prices
/// are scaled by `adjclose / close` so the history is dividend-adjusted.
pub fn parse_chart_response(ticker: &str, json: &str, auto_adjust: bool) -> Result<InstrumentSeries> {
    let response: ChartResponse = serde_json::from_str(json)?;

    if let Some(error) = response.chart.error {
        return Err(Error::Fetch(format!(
            "{}: API error [{}]: {}",
            ticker, error.code, error.description
        )));
    }

    let data = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| Error::Fetch(format!("{}: no data returned", ticker)))?;

    let offset = data.meta.gmtoffset;
    if let Some(tz) = &data.meta.exchange_timezone_name {
        debug!(ticker, timezone = %tz, offset, "chart response metadata");
    }

    let mut dividends: HashMap<NaiveDate, f64> = HashMap::new();
    if let Some(events) = &data.events {
        for event in events.dividends.values() {
            *dividends.entry(local_date(event.date, offset)?).or_insert(0.0) += event.amount;
        }
    }

    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = data
        .indicators
        .adjclose
        .and_then(|a| a.into_iter().next())
        .map(|a| a.adjclose)
        .unwrap_or_default();

    // Keyed by date so a repeated day keeps the last bar
    let mut bars: BTreeMap<NaiveDate, DailyBar> = BTreeMap::new();
    let mut skipped = 0usize;

    for (i, &ts) in data.timestamp.iter().enumerate() {
        let field = |values: &[Option<f64>]| values.get(i).copied().flatten();
        let fields = (
            field(&quote.open),
            field(&quote.high),
            field(&quote.low),
            field(&quote.close),
            quote.volume.get(i).copied().flatten(),
        );

        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = fields else {
            skipped += 1;
            continue;
        };

        let ratio = match field(&adjclose) {
            Some(adj) if auto_adjust && close != 0.0 => adj / close,
            _ => 1.0,
        };

        let date = local_date(ts, offset)?;
        bars.insert(
            date,
            DailyBar {
                date,
                open: open * ratio,
                high: high * ratio,
                low: low * ratio,
                close: close * ratio,
                volume,
                dividends: dividends.get(&date).copied().unwrap_or(0.0),
            },
        );
    }

    if skipped > 0 {
        debug!(ticker, skipped, "skipped incomplete bars");
    }

    if bars.is_empty() {
        return Err(Error::Fetch(format!("{}: no complete bars returned", ticker)));
    }

    let unmatched = dividends.keys().filter(|d| !bars.contains_key(*d)).count();
    if unmatched > 0 {
        warn!(ticker, unmatched, "dividend events without a matching trading day");
    }

    Ok(InstrumentSeries::new(ticker, bars.into_values().collect()))
}

/// Blocking client for the chart endpoint
#[derive(Debug, Clone)]
pub struct YahooClient {
    base_url: String,
    client: reqwest::blocking::Client,
    auto_adjust: bool,
}

impl YahooClient {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration, auto_adjust: bool) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(YahooClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            auto_adjust,
        })
    }

    pub fn build_url(&self, ticker: &str, years: u32) -> String {
        format!(
            "{}/{}?range={}y&interval=1d&events=div&includeAdjustedClose=true",
            self.base_url, ticker, years
        )
    }

    /// Fetch `years` of daily history for one ticker
    pub fn fetch(&self, ticker: &str, years: u32) -> Result<InstrumentSeries> {
        let url = self.build_url(ticker, years);
        debug!(ticker, %url, "requesting chart");

        let response = self.client.get(&url).send()?;
        let status = response.status();
        let body = response.text()?;

        // The endpoint reports unknown symbols as a JSON error with a 404
        if !status.is_success() && !body.trim_start().starts_with('{') {
            return Err(Error::Fetch(format!("{}: HTTP {}", ticker, status)));
        }

        let series = parse_chart_response(ticker, &body, self.auto_adjust)?;
        info!(ticker, rows = series.len(), "fetched history");

        Ok(series)
    }
}

/// Fetch every ticker in order, stopping at the first failure
pub fn fetch_all(client: &YahooClient, tickers: &[String], years: u32) -> Result<Vec<InstrumentSeries>> {
    tickers.iter().map(|t| client.fetch(t, years)).collect()
}
