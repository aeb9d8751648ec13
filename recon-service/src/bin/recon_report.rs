//! Reconciliation Report Binary
//!
//! Runs one reconciliation for the configured merchant window and prints the
//! accounting report as JSON.
//!
//! Usage: `recon-report [config.toml]` (falls back to `RECON_CONFIG`, then to
//! `RECON_*` environment variables).

use anyhow::Context;
use recon_service::{Config, Metrics, ReconciliationService};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RECON_CONFIG").ok());

    let config = match &config_path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::from_env().context("Failed to load config from environment")?,
    };

    init_tracing(&config);

    info!(
        "Starting {} v{}",
        config.service_name, config.service_version
    );
    match &config_path {
        Some(path) => info!("Loaded config from: {}", path),
        None => info!("Loaded config from environment variables"),
    }

    if config.sources.summary_path.is_none() {
        warn!("No summary source configured, report will be entries-only");
    }

    let service = ReconciliationService::from_config(&config).with_metrics(Metrics::new()?);
    let window = config.window_params(config.fetch.display_limit);

    let report = service
        .run(&window)
        .await
        .context("Reconciliation run failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(metrics) = service.metrics() {
        tracing::debug!("Metrics:\n{}", metrics.render()?);
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    // Logs go to stderr so stdout stays valid JSON
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
