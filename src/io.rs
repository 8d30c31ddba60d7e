use calamine::{open_workbook, Data, Reader, Xlsx};
use polars::prelude::*;
use rust_xlsxwriter::Workbook;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::series::{parse_date, InstrumentSeries, COLUMNS, DATE_FORMAT};
use crate::{Error, Result};

/// Write every series to its own sheet of a single workbook.
///
/// An existing file is only replaced when `force` is set.
pub fn write_workbook<P: AsRef<Path>>(
    path: P,
    series: &[InstrumentSeries],
    force: bool,
) -> Result<()> {
    let path = path.as_ref();
    if path.exists() && !force {
        return Err(Error::Other(format!(
            "Workbook already exists: {} (use --force to overwrite)",
            path.display()
        )));
    }

    let mut workbook = Workbook::new();

    for s in series {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(s.ticker.as_str())?;

        for (col, name) in COLUMNS.iter().enumerate() {
            worksheet.write_string(0, col as u16, *name)?;
        }

        for (i, bar) in s.bars.iter().enumerate() {
            let row = (i + 1) as u32;
            worksheet.write_string(row, 0, bar.date.format(DATE_FORMAT).to_string())?;
            worksheet.write_number(row, 1, bar.open)?;
            worksheet.write_number(row, 2, bar.high)?;
            worksheet.write_number(row, 3, bar.low)?;
            worksheet.write_number(row, 4, bar.close)?;
            worksheet.write_number(row, 5, bar.volume as f64)?;
            worksheet.write_number(row, 6, bar.dividends)?;
        }

        debug!(ticker = %s.ticker, rows = s.len(), "wrote sheet");
    }

    workbook.save(path)?;
    info!(path = %path.display(), sheets = series.len(), "saved workbook");

    Ok(())
}

/// Read one ticker's sheet back into a frame.
///
/// `Date` comes back as a nullable `YYYY-MM-DD` string column regardless of
/// how the cell was stored; every other column is a nullable Float64.
pub fn read_sheet<P: AsRef<Path>>(path: P, ticker: &str) -> Result<DataFrame> {
    let mut workbook: Xlsx<_> = open_workbook(path.as_ref())?;

    if !workbook.sheet_names().iter().any(|name| name == ticker) {
        return Err(Error::Workbook(format!(
            "Sheet '{}' not found in {}",
            ticker,
            path.as_ref().display()
        )));
    }

    let range = workbook.worksheet_range(ticker)?;
    let mut rows = range.rows();

    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(cell_header).collect(),
        None => return Ok(DataFrame::empty()),
    };

    let body: Vec<&[Data]> = rows.collect();
    let mut columns = Vec::with_capacity(headers.len());

    for (col, name) in headers.iter().enumerate() {
        let cells = body.iter().map(|row| row.get(col).unwrap_or(&Data::Empty));

        if name == "Date" {
            let values = cells
                .map(cell_date)
                .collect::<Result<Vec<Option<String>>>>()?;
            columns.push(Column::new(name.as_str().into(), values));
        } else {
            let values = cells
                .enumerate()
                .map(|(row, cell)| cell_number(cell, ticker, name, row))
                .collect::<Result<Vec<Option<f64>>>>()?;
            columns.push(Column::new(name.as_str().into(), values));
        }
    }

    let df = DataFrame::new(columns)?;
    debug!(ticker, rows = df.height(), "read sheet");

    Ok(df)
}

/// Read the requested sheets in order
pub fn read_workbook<P: AsRef<Path>>(
    path: P,
    tickers: &[String],
) -> Result<Vec<(String, DataFrame)>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::Other(format!(
            "Workbook does not exist: {}",
            path.display()
        )));
    }

    tickers
        .iter()
        .map(|ticker| Ok((ticker.clone(), read_sheet(path, ticker)?)))
        .collect()
}

fn cell_header(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_date(cell: &Data) -> Result<Option<String>> {
    let date = match cell {
        Data::Empty => return Ok(None),
        Data::String(s) | Data::DateTimeIso(s) => parse_date(s)?,
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.date())
            .ok_or_else(|| Error::Parse(format!("invalid Excel date: {:?}", dt)))?,
        other => return Err(Error::Parse(format!("unexpected Date cell: {}", other))),
    };

    Ok(Some(date.format(DATE_FORMAT).to_string()))
}

fn cell_number(cell: &Data, ticker: &str, column: &str, row: usize) -> Result<Option<f64>> {
    match cell {
        Data::Empty => Ok(None),
        Data::Float(f) => Ok(Some(*f)),
        Data::Int(i) => Ok(Some(*i as f64)),
        Data::Bool(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
        Data::String(s) if s.trim().is_empty() => Ok(None),
        Data::String(s) => match s.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            _ => Err(Error::Parse(format!(
                "{}: non-numeric {} value '{}' at row {}",
                ticker, column, s, row
            ))),
        },
        other => Err(Error::Parse(format!(
            "{}: unexpected {} cell '{}' at row {}",
            ticker, column, other, row
        ))),
    }
}

/// Save DataFrame to CSV file
pub fn save_csv<P: AsRef<Path>>(df: &DataFrame, path: P) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).finish(&mut df.clone())?;

    Ok(())
}

/// Save DataFrame to Parquet file
pub fn save_parquet<P: AsRef<Path>>(df: &DataFrame, path: P) -> Result<()> {
    let mut file = File::create(path)?;
    ParquetWriter::new(&mut file).finish(&mut df.clone())?;

    Ok(())
}

/// Export a frame as CSV or Parquet depending on the file extension.
///
/// Returns `false` without writing when the target exists and `force` is off.
pub fn export_dataframe<P: AsRef<Path>>(df: &DataFrame, path: P, force: bool) -> Result<bool> {
    let path = path.as_ref();
    if path.exists() && !force {
        eprintln!(
            "Output file already exists: {} (use --force to overwrite)",
            path.display()
        );
        return Ok(false);
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => save_parquet(df, path)?,
        Some("csv") | None => save_csv(df, path)?,
        Some(other) => {
            return Err(Error::Other(format!(
                "Unsupported export format: .{} (expected .csv or .parquet)",
                other
            )))
        }
    }

    info!(path = %path.display(), rows = df.height(), "exported frame");
    Ok(true)
}
