use polars::prelude::*;
use tracing::warn;

use crate::Result;

/// Diagnostics for one reloaded sheet. Nothing is dropped or imputed.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningReport {
    pub ticker: String,
    pub rows: usize,
    pub null_counts: Vec<(String, usize)>,
    pub duplicates: usize,
}

impl CleaningReport {
    pub fn total_nulls(&self) -> usize {
        self.null_counts.iter().map(|(_, n)| n).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.duplicates == 0 && self.total_nulls() == 0
    }
}

/// Null count per column, in column order
pub fn null_counts(df: &DataFrame) -> Vec<(String, usize)> {
    df.get_columns()
        .iter()
        .map(|c| (c.name().to_string(), c.null_count()))
        .collect()
}

/// Rows identical to an earlier row across every column (nulls compare equal)
pub fn duplicate_rows(df: &DataFrame) -> Result<usize> {
    let unique = df
        .clone()
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;

    Ok(df.height() - unique.height())
}

pub fn inspect(ticker: &str, df: &DataFrame) -> Result<CleaningReport> {
    let report = CleaningReport {
        ticker: ticker.to_string(),
        rows: df.height(),
        null_counts: null_counts(df),
        duplicates: duplicate_rows(df)?,
    };

    if !report.is_clean() {
        warn!(
            ticker,
            nulls = report.total_nulls(),
            duplicates = report.duplicates,
            "sheet has missing or duplicated rows"
        );
    }

    Ok(report)
}
