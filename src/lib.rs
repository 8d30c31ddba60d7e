pub mod analysis;
pub mod charts;
pub mod cleaning;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod io;
pub mod report;
pub mod series;

pub use error::{Error, Result};

use std::path::Path;

use polars::prelude::DataFrame;
use tracing::info;

use crate::analysis::TickerStats;
use crate::config::Settings;
use crate::fetch::YahooClient;
use crate::series::InstrumentSeries;

/// Download every configured ticker and persist it to the workbook
pub fn fetch_and_persist(settings: &Settings, force: bool) -> Result<Vec<InstrumentSeries>> {
    info!(
        tickers = settings.tickers.len(),
        years = settings.years,
        "fetching history"
    );

    let client = YahooClient::new(
        &settings.fetch.base_url,
        &settings.fetch.user_agent,
        settings.fetch.timeout,
        settings.fetch.auto_adjust,
    )?;
    let series = fetch::fetch_all(&client, &settings.tickers, settings.years)?;
    io::write_workbook(&settings.workbook, &series, force)?;

    println!(
        "Saved {} tickers to: {}",
        series.len(),
        settings.workbook.display()
    );

    Ok(series)
}

fn print_cleaning(frames: &[(String, DataFrame)]) -> Result<()> {
    for (ticker, df) in frames {
        let report = cleaning::inspect(ticker, df)?;
        print!("{}", report::format_cleaning_report(&report));
    }
    Ok(())
}

fn to_series(frames: &[(String, DataFrame)]) -> Result<Vec<InstrumentSeries>> {
    frames
        .iter()
        .map(|(ticker, df)| InstrumentSeries::from_frame(ticker, df))
        .collect()
}

fn print_describe(series: &[InstrumentSeries]) {
    for s in series {
        print!("{}", report::format_summary(&s.ticker, &analysis::describe_series(s)));
    }
}

fn print_outliers(
    settings: &Settings,
    frames: &[(String, DataFrame)],
    stats: &[TickerStats],
) -> Result<()> {
    print!("{}", report::format_outlier_counts(stats));

    if let Some((ticker, df)) = frames.iter().find(|(t, _)| *t == settings.outlier_ticker) {
        let rows = analysis::outlier_rows(df, "Close")?;
        println!("Outlier rows for {}:", ticker);
        println!("{}", rows);
    }

    Ok(())
}

fn print_analysis(settings: &Settings, series: &[InstrumentSeries], stats: &[TickerStats]) -> Result<()> {
    if settings.verbose {
        for s in series {
            println!("{}", report::generate_dataframe_summary(&s.to_enriched_dataframe()?)?);
        }
    }

    print!("{}", report::format_stats_table(stats));
    print!("{}", report::format_yearly_table(stats));
    print!("{}", report::format_largest_drops(stats));

    if let Some(output) = &settings.output {
        if export_stats(output, stats, settings.force)? {
            println!("Statistics saved to: {}", output.display());
        }
    }

    Ok(())
}

/// Write the statistics table as `.csv` (or no extension) or `.parquet`
pub fn export_stats(path: &Path, stats: &[TickerStats], force: bool) -> Result<bool> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => io::export_dataframe(&report::stats_dataframe(stats)?, path, force),
        Some("csv") | None => {
            if path.exists() && !force {
                eprintln!(
                    "Output file already exists: {} (use --force to overwrite)",
                    path.display()
                );
                return Ok(false);
            }

            report::write_stats_csv(path, stats)?;
            Ok(true)
        }
        Some(other) => Err(Error::Other(format!(
            "Unsupported export format: .{} (expected .csv or .parquet)",
            other
        ))),
    }
}

fn render_charts(settings: &Settings, series: &[InstrumentSeries], stats: &[TickerStats]) -> Result<()> {
    let written = charts::render_all(&settings.chart_dir, series, stats, &settings.outlier_ticker)?;
    println!(
        "Rendered {} charts to: {}",
        written.len(),
        settings.chart_dir.display()
    );
    Ok(())
}

/// Run the stage selected by `settings.function`
pub fn run(settings: &Settings) -> Result<()> {
    let function = settings.function.as_str();
    if !cli::FUNCTIONS.contains(&function) {
        return Err(Error::Other(format!(
            "Unknown function '{}' (expected one of: {})",
            function,
            cli::FUNCTIONS.join(", ")
        )));
    }

    match function {
        "fetch" => {
            fetch_and_persist(settings, settings.force)?;
            return Ok(());
        }
        // A full run refreshes the workbook in place
        "all" => {
            fetch_and_persist(settings, true)?;
        }
        _ => {}
    }

    info!(path = %settings.workbook.display(), "loading workbook");
    let frames = io::read_workbook(&settings.workbook, &settings.tickers)?;

    if matches!(function, "clean" | "all") {
        print_cleaning(&frames)?;
    }
    if function == "clean" {
        return Ok(());
    }

    let series = to_series(&frames)?;

    if matches!(function, "describe" | "all") {
        print_describe(&series);
    }
    if function == "describe" {
        return Ok(());
    }

    let stats = analysis::analyze_all(&series)?;

    if matches!(function, "outliers" | "all") {
        print_outliers(settings, &frames, &stats)?;
    }
    if matches!(function, "analyze" | "all") {
        print_analysis(settings, &series, &stats)?;
    }
    if matches!(function, "charts" | "all") {
        render_charts(settings, &series, &stats)?;
    }

    info!(function, "finished");
    Ok(())
}
