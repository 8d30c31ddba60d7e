use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as FmtWrite;
use std::path::Path;

use crate::analysis::{Summary, TickerStats};
use crate::cleaning::CleaningReport;
use crate::Result;

const RULE_WIDTH: usize = 40;

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "n/a".to_string(),
    }
}

/// Missing values and duplicate count for one sheet
pub fn format_cleaning_report(report: &CleaningReport) -> String {
    let mut out = String::new();

    writeln!(out, "Missing values for {}:", report.ticker).unwrap();
    for (column, nulls) in &report.null_counts {
        writeln!(out, "  {:<12}{:>8}", column, nulls).unwrap();
    }
    writeln!(out, "{}", "-".repeat(RULE_WIDTH)).unwrap();
    writeln!(out, "Duplicates for {}: {}", report.ticker, report.duplicates).unwrap();

    out
}

/// Summary statistics table, one column per price/volume field
pub fn format_summary(ticker: &str, summaries: &[(&str, Summary)]) -> String {
    let mut out = String::new();

    writeln!(out, "Summary statistics for {}:", ticker).unwrap();
    write!(out, "{:>8}", "").unwrap();
    for (name, _) in summaries {
        write!(out, "{:>16}", name).unwrap();
    }
    writeln!(out).unwrap();

    let rows: [(&str, fn(&Summary) -> f64); 8] = [
        ("count", |s| s.count as f64),
        ("mean", |s| s.mean),
        ("std", |s| s.std),
        ("min", |s| s.min),
        ("25%", |s| s.q25),
        ("50%", |s| s.q50),
        ("75%", |s| s.q75),
        ("max", |s| s.max),
    ];

    for (label, value) in rows {
        write!(out, "{:>8}", label).unwrap();
        for (_, summary) in summaries {
            write!(out, "{:>16.4}", value(summary)).unwrap();
        }
        writeln!(out).unwrap();
    }
    writeln!(out, "{}", "-".repeat(RULE_WIDTH)).unwrap();

    out
}

/// Outlier counts per ticker on the Close column
pub fn format_outlier_counts(stats: &[TickerStats]) -> String {
    let mut out = String::new();

    for s in stats {
        writeln!(out, "Number of outliers for {}: {}", s.ticker, s.outliers.len()).unwrap();
        if let Some(bounds) = &s.close_bounds {
            writeln!(
                out,
                "  Q1={:.4} Q3={:.4} IQR={:.4} bounds=[{:.4}, {:.4}]",
                bounds.q1, bounds.q3, bounds.iqr, bounds.lower, bounds.upper
            )
            .unwrap();
        }
    }

    out
}

/// Cross-ticker comparison table
pub fn format_stats_table(stats: &[TickerStats]) -> String {
    let mut out = String::new();

    writeln!(out, "{}", "=".repeat(76)).unwrap();
    writeln!(out, "ETF STATISTICS").unwrap();
    writeln!(out, "{}", "=".repeat(76)).unwrap();
    writeln!(
        out,
        "{:<8}{:>8}{:>18}{:>12}{:>14}{:>16}",
        "Ticker", "Rows", "Avg Volume", "ROI (%)", "Volatility", "Dividends"
    )
    .unwrap();

    for s in stats {
        writeln!(
            out,
            "{:<8}{:>8}{:>18}{:>12}{:>14}{:>16.4}",
            s.ticker,
            s.rows,
            fmt_opt(s.mean_volume, 0),
            fmt_opt(s.roi, 2),
            fmt_opt(s.volatility, 4),
            s.total_dividends
        )
        .unwrap();
    }
    writeln!(out).unwrap();

    out
}

/// Yearly mean close, years as rows and tickers as columns
pub fn format_yearly_table(stats: &[TickerStats]) -> String {
    let mut out = String::new();
    let years: BTreeSet<i32> = stats
        .iter()
        .flat_map(|s| s.yearly_close.keys().copied())
        .collect();

    writeln!(out, "Yearly Average Closing Prices:").unwrap();
    write!(out, "{:>6}", "Year").unwrap();
    for s in stats {
        write!(out, "{:>12}", s.ticker).unwrap();
    }
    writeln!(out).unwrap();

    for year in years {
        write!(out, "{:>6}", year).unwrap();
        for s in stats {
            write!(out, "{:>12}", fmt_opt(s.yearly_close.get(&year).copied(), 2)).unwrap();
        }
        writeln!(out).unwrap();
    }
    writeln!(out).unwrap();

    out
}

pub fn format_largest_drops(stats: &[TickerStats]) -> String {
    let mut out = String::new();

    writeln!(out, "Dates of Largest Single-Day Drops:").unwrap();
    for s in stats {
        match s.largest_drop {
            Some((date, drop)) => writeln!(out, "{}: {} ({:.2})", s.ticker, date, drop).unwrap(),
            None => writeln!(out, "{}: n/a", s.ticker).unwrap(),
        }
    }

    out
}

/// Generate a DataFrame summary report
pub fn generate_dataframe_summary(df: &DataFrame) -> Result<String> {
    let mut summary = String::new();

    writeln!(summary, "DataFrame Summary:").unwrap();
    writeln!(summary, "  Shape: {:?}", df.shape()).unwrap();
    writeln!(summary, "  Columns: {:?}", df.get_column_names()).unwrap();
    writeln!(summary).unwrap();

    writeln!(summary, "First 5 rows:").unwrap();
    writeln!(summary, "{}", df.head(Some(5))).unwrap();

    Ok(summary)
}

/// One row of the exported statistics table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRow {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Rows")]
    pub rows: usize,
    #[serde(rename = "Avg_Volume")]
    pub mean_volume: Option<f64>,
    #[serde(rename = "ROI_Pct")]
    pub roi: Option<f64>,
    #[serde(rename = "Volatility")]
    pub volatility: Option<f64>,
    #[serde(rename = "Total_Dividends")]
    pub total_dividends: f64,
    #[serde(rename = "Largest_Drop_Date")]
    pub largest_drop_date: Option<String>,
    #[serde(rename = "Largest_Drop")]
    pub largest_drop: Option<f64>,
    #[serde(rename = "Outliers")]
    pub outliers: usize,
}

impl From<&TickerStats> for StatsRow {
    fn from(s: &TickerStats) -> Self {
        StatsRow {
            ticker: s.ticker.clone(),
            rows: s.rows,
            mean_volume: s.mean_volume,
            roi: s.roi,
            volatility: s.volatility,
            total_dividends: s.total_dividends,
            largest_drop_date: s.largest_drop.map(|(d, _)| d.to_string()),
            largest_drop: s.largest_drop.map(|(_, v)| v),
            outliers: s.outliers.len(),
        }
    }
}

/// Write the cross-ticker table as CSV
pub fn write_stats_csv<P: AsRef<Path>>(path: P, stats: &[TickerStats]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for s in stats {
        writer.serialize(StatsRow::from(s))?;
    }
    writer.flush()?;

    Ok(())
}

/// The cross-ticker table as a frame, for CSV/Parquet export
pub fn stats_dataframe(stats: &[TickerStats]) -> Result<DataFrame> {
    let rows: Vec<StatsRow> = stats.iter().map(StatsRow::from).collect();

    let df = DataFrame::new(vec![
        Column::new("Ticker".into(), rows.iter().map(|r| r.ticker.clone()).collect::<Vec<_>>()),
        Column::new("Rows".into(), rows.iter().map(|r| r.rows as u64).collect::<Vec<_>>()),
        Column::new("Avg_Volume".into(), rows.iter().map(|r| r.mean_volume).collect::<Vec<_>>()),
        Column::new("ROI_Pct".into(), rows.iter().map(|r| r.roi).collect::<Vec<_>>()),
        Column::new("Volatility".into(), rows.iter().map(|r| r.volatility).collect::<Vec<_>>()),
        Column::new(
            "Total_Dividends".into(),
            rows.iter().map(|r| r.total_dividends).collect::<Vec<_>>(),
        ),
        Column::new(
            "Largest_Drop_Date".into(),
            rows.iter().map(|r| r.largest_drop_date.clone()).collect::<Vec<_>>(),
        ),
        Column::new("Largest_Drop".into(), rows.iter().map(|r| r.largest_drop).collect::<Vec<_>>()),
        Column::new("Outliers".into(), rows.iter().map(|r| r.outliers as u64).collect::<Vec<_>>()),
    ])?;

    Ok(df)
}
