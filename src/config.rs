use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::cli::Args;
use crate::fetch::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::Result;

pub const DEFAULT_TICKERS: [&str; 5] = ["SPY", "QQQ", "IWM", "GLD", "EEM"];
pub const DEFAULT_YEARS: u32 = 10;
pub const DEFAULT_WORKBOOK: &str = "ETFs_Historical_Data.xlsx";
pub const DEFAULT_CHART_DIR: &str = "charts";
pub const DEFAULT_OUTLIER_TICKER: &str = "EEM";

/// Configuration for ETF Trends
/// Can be loaded from a TOML file to set default values for CLI parameters
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default ticker list
    pub tickers: Option<Vec<String>>,

    /// Default lookback window in years
    pub years: Option<u32>,

    /// Default workbook path
    pub workbook: Option<String>,

    /// Default chart directory
    pub chart_dir: Option<String>,

    /// Default ticker for the outlier charts
    pub outlier_ticker: Option<String>,

    /// Default statistics export path
    pub output: Option<String>,

    /// Force overwrite without prompting
    pub force: Option<bool>,

    /// Verbose mode
    pub verbose: Option<bool>,

    /// Scale prices by the adjusted close (defaults to true)
    pub auto_adjust: Option<bool>,

    /// Download settings
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Chart endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FetchConfig {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Other(format!("Failed to parse config file: {}", e)))?;
        Ok(config)
    }

    /// Load configuration from default locations
    /// Checks in order:
    /// 1. ./.etf_trends.toml (current directory)
    /// 2. ~/.config/etf_trends/config.toml (user config directory)
    /// 3. ~/.etf_trends.toml (home directory)
    pub fn load_default() -> Result<Option<Self>> {
        let current_dir_config = PathBuf::from(".etf_trends.toml");
        if current_dir_config.exists() {
            debug!(path = %current_dir_config.display(), "using config");
            return Ok(Some(Self::from_file(current_dir_config)?));
        }

        if let Some(config_dir) = Self::get_config_dir() {
            let config_path = config_dir.join("etf_trends").join("config.toml");
            if config_path.exists() {
                debug!(path = %config_path.display(), "using config");
                return Ok(Some(Self::from_file(config_path)?));
            }
        }

        if let Some(home_dir) = Self::get_home_dir() {
            let home_config = home_dir.join(".etf_trends.toml");
            if home_config.exists() {
                debug!(path = %home_config.display(), "using config");
                return Ok(Some(Self::from_file(home_config)?));
            }
        }

        Ok(None)
    }

    /// Explicit path wins; otherwise search the default locations
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => Ok(Self::load_default()?.unwrap_or_default()),
        }
    }

    /// Get the user's config directory
    fn get_config_dir() -> Option<PathBuf> {
        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            Some(PathBuf::from(config_dir))
        } else {
            Self::get_home_dir().map(|home_dir| home_dir.join(".config"))
        }
    }

    /// Get the user's home directory
    fn get_home_dir() -> Option<PathBuf> {
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()
            .map(PathBuf::from)
    }

    /// Merge config with CLI arguments, giving CLI arguments priority
    pub fn merge_with_cli(&self, cli_args: &mut Args) {
        if cli_args.workbook.is_none() {
            cli_args.workbook = self.workbook.clone();
        }

        if cli_args.tickers.is_none() {
            cli_args.tickers = self.tickers.clone();
        }

        if cli_args.years.is_none() {
            cli_args.years = self.years;
        }

        if cli_args.chart_dir.is_none() {
            cli_args.chart_dir = self.chart_dir.clone();
        }

        if cli_args.outlier_ticker.is_none() {
            cli_args.outlier_ticker = self.outlier_ticker.clone();
        }

        if cli_args.output.is_none() {
            cli_args.output = self.output.clone();
        }

        // Booleans: only set from config if CLI flag wasn't explicitly set
        if !cli_args.force && self.force == Some(true) {
            cli_args.force = true;
        }

        if !cli_args.verbose && self.verbose == Some(true) {
            cli_args.verbose = true;
        }
    }
}

/// Fully resolved download settings
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub auto_adjust: bool,
}

/// Fully resolved run settings: CLI over config over built-in defaults
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub function: String,
    pub tickers: Vec<String>,
    pub years: u32,
    pub workbook: PathBuf,
    pub chart_dir: PathBuf,
    pub outlier_ticker: String,
    pub output: Option<PathBuf>,
    pub force: bool,
    pub verbose: bool,
    pub fetch: FetchSettings,
}

impl Settings {
    pub fn resolve(mut args: Args, config: &Config) -> Self {
        config.merge_with_cli(&mut args);

        let tickers = args
            .tickers
            .unwrap_or_else(|| DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect());

        Settings {
            function: args.function.to_lowercase(),
            tickers: normalize_tickers(tickers),
            years: args.years.unwrap_or(DEFAULT_YEARS),
            workbook: PathBuf::from(args.workbook.unwrap_or_else(|| DEFAULT_WORKBOOK.to_string())),
            chart_dir: PathBuf::from(args.chart_dir.unwrap_or_else(|| DEFAULT_CHART_DIR.to_string())),
            outlier_ticker: args
                .outlier_ticker
                .unwrap_or_else(|| DEFAULT_OUTLIER_TICKER.to_string())
                .to_uppercase(),
            output: args.output.map(PathBuf::from),
            force: args.force,
            verbose: args.verbose,
            fetch: FetchSettings {
                base_url: config
                    .fetch
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                user_agent: config
                    .fetch
                    .user_agent
                    .clone()
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                timeout: Duration::from_secs(config.fetch.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
                auto_adjust: config.auto_adjust.unwrap_or(true),
            },
        }
    }
}

/// Trim, uppercase and de-duplicate tickers, keeping first-seen order
pub fn normalize_tickers(tickers: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        let ticker = ticker.trim().to_uppercase();
        if !ticker.is_empty() && !normalized.contains(&ticker) {
            normalized.push(ticker);
        }
    }
    normalized
}
