use anyhow::Context;
use etf_trends::cli;
use etf_trends::config::{Config, Settings};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "etf_trends=debug" } else { "etf_trends=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = cli::parse_args();

    let config = Config::load(args.config.as_deref()).with_context(|| match &args.config {
        Some(path) => format!("Failed to load config file: {}", path),
        None => "Failed to load default config".to_string(),
    })?;
    let settings = Settings::resolve(args, &config);

    init_tracing(settings.verbose);
    debug!(?settings, "resolved settings");

    etf_trends::run(&settings)
        .with_context(|| format!("Function '{}' failed", settings.function))?;

    Ok(())
}
