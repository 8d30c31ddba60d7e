use assert_cmd::Command;
use chrono::NaiveDate;
use etf_trends::io::write_workbook;
use etf_trends::series::{DailyBar, InstrumentSeries};
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Two calendar years of synthetic bars with one dividend and a sharp drop
fn synthetic_series(ticker: &str, base: f64) -> InstrumentSeries {
    let start = NaiveDate::from_ymd_opt(2022, 12, 20).unwrap();
    let bars = (0..30)
        .map(|i| {
            let mut close = base + i as f64;
            if i == 17 {
                close -= 12.0;
            }
            DailyBar {
                date: start + chrono::Days::new(i as u64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000_000 + 1_000 * i as u64,
                dividends: if i == 10 { 1.25 } else { 0.0 },
            }
        })
        .collect();
    InstrumentSeries::new(ticker, bars)
}

/// Temp workspace holding a workbook with SPY and EEM sheets
fn workspace() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let workbook = temp_dir.path().join("etfs.xlsx");
    write_workbook(
        &workbook,
        &[synthetic_series("SPY", 100.0), synthetic_series("EEM", 40.0)],
        false,
    )
    .unwrap();
    (temp_dir, workbook)
}

/// Binary isolated from any user config file
fn etf_trends(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("etf_trends").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env("XDG_CONFIG_HOME", temp_dir.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_flag() {
    let mut cmd = Command::cargo_bin("etf_trends").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_version_flag() {
    let mut cmd = Command::cargo_bin("etf_trends").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_unknown_function() {
    let (temp_dir, workbook) = workspace();
    etf_trends(&temp_dir)
        .arg("-w")
        .arg(&workbook)
        .arg("-f")
        .arg("plot")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown function 'plot'"));
}

#[test]
fn test_missing_workbook() {
    let temp_dir = TempDir::new().unwrap();
    etf_trends(&temp_dir)
        .arg("-w")
        .arg(temp_dir.path().join("missing.xlsx"))
        .arg("-f")
        .arg("analyze")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Workbook does not exist"));
}

#[test]
fn test_missing_sheet() {
    let (temp_dir, workbook) = workspace();
    etf_trends(&temp_dir)
        .arg("-w")
        .arg(&workbook)
        .arg("-t")
        .arg("SPY,GLD")
        .arg("-f")
        .arg("clean")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Sheet 'GLD' not found"));
}

#[test]
fn test_clean_function() {
    let (temp_dir, workbook) = workspace();
    etf_trends(&temp_dir)
        .arg("-w")
        .arg(&workbook)
        .arg("-t")
        .arg("spy,eem")
        .arg("-f")
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Missing values for SPY:"))
        .stdout(predicate::str::contains("Duplicates for EEM: 0"));
}

#[test]
fn test_describe_function() {
    let (temp_dir, workbook) = workspace();
    etf_trends(&temp_dir)
        .arg("-w")
        .arg(&workbook)
        .arg("-t")
        .arg("SPY")
        .arg("-f")
        .arg("describe")
        .assert()
        .success()
        .stdout(predicate::str::contains("Summary statistics for SPY:"))
        .stdout(predicate::str::contains("Dividends"));
}

#[test]
fn test_outliers_function() {
    let (temp_dir, workbook) = workspace();
    etf_trends(&temp_dir)
        .arg("-w")
        .arg(&workbook)
        .arg("-t")
        .arg("SPY,EEM")
        .arg("-f")
        .arg("outliers")
        .assert()
        .success()
        .stdout(predicate::str::contains("Number of outliers for SPY:"))
        .stdout(predicate::str::contains("Outlier rows for EEM:"));
}

#[test]
fn test_analyze_function() {
    let (temp_dir, workbook) = workspace();
    etf_trends(&temp_dir)
        .arg("-w")
        .arg(&workbook)
        .arg("-t")
        .arg("SPY,EEM")
        .arg("-f")
        .arg("analyze")
        .assert()
        .success()
        .stdout(predicate::str::contains("ETF STATISTICS"))
        .stdout(predicate::str::contains("Yearly Average Closing Prices:"))
        .stdout(predicate::str::contains("2023"))
        .stdout(predicate::str::contains("Dates of Largest Single-Day Drops:"))
        .stdout(predicate::str::contains("SPY: 2023-01-06"));
}

#[test]
fn test_analyze_function_with_output() {
    let (temp_dir, workbook) = workspace();
    let output_path = temp_dir.path().join("stats.csv");

    etf_trends(&temp_dir)
        .arg("-w")
        .arg(&workbook)
        .arg("-t")
        .arg("SPY,EEM")
        .arg("-f")
        .arg("analyze")
        .arg("-o")
        .arg(&output_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Statistics saved to:"));

    let content = fs::read_to_string(&output_path).unwrap();
    let mut lines = content.lines();
    assert!(lines.next().unwrap().starts_with("Ticker,Rows,Avg_Volume,ROI_Pct"));
    assert!(lines.next().unwrap().starts_with("SPY,30,"));
    assert!(lines.next().unwrap().starts_with("EEM,30,"));
}

#[test]
fn test_analyze_output_not_overwritten_without_force() {
    let (temp_dir, workbook) = workspace();
    let output_path = temp_dir.path().join("stats.csv");
    fs::write(&output_path, "keep me").unwrap();

    etf_trends(&temp_dir)
        .arg("-w")
        .arg(&workbook)
        .arg("-t")
        .arg("SPY")
        .arg("-f")
        .arg("analyze")
        .arg("-o")
        .arg(&output_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(fs::read_to_string(&output_path).unwrap(), "keep me");
}

#[test]
fn test_analyze_parquet_output() {
    let (temp_dir, workbook) = workspace();
    let output_path = temp_dir.path().join("stats.parquet");

    etf_trends(&temp_dir)
        .arg("-w")
        .arg(&workbook)
        .arg("-t")
        .arg("SPY,EEM")
        .arg("-f")
        .arg("analyze")
        .arg("-o")
        .arg(&output_path)
        .assert()
        .success();

    assert!(output_path.exists());
}

#[test]
fn test_analyze_rejects_unknown_output_format() {
    let (temp_dir, workbook) = workspace();
    let output_path = temp_dir.path().join("stats.json");

    etf_trends(&temp_dir)
        .arg("-w")
        .arg(&workbook)
        .arg("-t")
        .arg("SPY")
        .arg("-f")
        .arg("analyze")
        .arg("-o")
        .arg(&output_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported export format: .json"));

    assert!(!output_path.exists());
}

#[test]
fn test_charts_function() {
    let (temp_dir, workbook) = workspace();
    let chart_dir = temp_dir.path().join("charts");

    etf_trends(&temp_dir)
        .arg("-w")
        .arg(&workbook)
        .arg("-t")
        .arg("SPY,EEM")
        .arg("-f")
        .arg("charts")
        .arg("-c")
        .arg(&chart_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Rendered 8 charts"));

    for file in [
        "closing_trends.svg",
        "EEM_outliers.svg",
        "EEM_outliers_volume.svg",
        "average_volume.svg",
        "roi.svg",
        "volatility.svg",
        "dividends.svg",
        "yearly_average_close.svg",
    ] {
        assert!(chart_dir.join(file).exists(), "missing {}", file);
    }
}

#[test]
fn test_config_file_supplies_tickers() {
    let (temp_dir, workbook) = workspace();
    let config_path = temp_dir.path().join("etf.toml");
    fs::write(
        &config_path,
        format!(
            "tickers = [\"EEM\"]\nworkbook = {:?}\n",
            workbook.to_str().unwrap()
        ),
    )
    .unwrap();

    etf_trends(&temp_dir)
        .arg("--config")
        .arg(&config_path)
        .arg("-f")
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Missing values for EEM:"))
        .stdout(predicate::str::contains("SPY").not());
}

#[test]
fn test_invalid_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("etf.toml");
    fs::write(&config_path, "years = \"ten\"").unwrap();

    etf_trends(&temp_dir)
        .arg("--config")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config file"));
}
