use clap::Parser;

/// Stages that `--function` can select
pub const FUNCTIONS: [&str; 7] = ["all", "fetch", "clean", "describe", "outliers", "analyze", "charts"];

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Function/operation to perform (all, fetch, clean, describe, outliers, analyze, charts)
    #[arg(short = 'f', long, default_value = "all")]
    pub function: String,

    /// Workbook holding one sheet per ticker
    #[arg(short = 'w', long)]
    pub workbook: Option<String>,

    /// Comma-separated ticker list (e.g. SPY,QQQ,IWM)
    #[arg(short = 't', long, value_delimiter = ',')]
    pub tickers: Option<Vec<String>>,

    /// Lookback window in years
    #[arg(short = 'y', long)]
    pub years: Option<u32>,

    /// Directory for rendered charts
    #[arg(short = 'c', long)]
    pub chart_dir: Option<String>,

    /// Ticker used for the outlier charts
    #[arg(long)]
    pub outlier_ticker: Option<String>,

    /// Export the statistics table (.csv or .parquet)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Explicit configuration file (TOML)
    #[arg(long)]
    pub config: Option<String>,

    /// Force overwrite of existing output files without prompting
    #[arg(long)]
    pub force: bool,

    /// Verbose mode
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn parse_args() -> Args {
    Args::parse()
}
