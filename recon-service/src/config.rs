//! Configuration for the reconciliation service

use recon_core::WindowParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Source locations
    pub sources: SourcesConfig,

    /// Fetch bounds and timeouts
    pub fetch: FetchConfig,

    /// Default merchant window
    pub window: WindowConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "recon-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            sources: SourcesConfig::default(),
            fetch: FetchConfig::default(),
            window: WindowConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Source locations (JSON files exported by the upstream adapters)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Ledger events file
    pub ledger_path: PathBuf,

    /// Pipeline (invoice snapshot) events file
    pub pipeline_path: PathBuf,

    /// External summary file (none = entries-only mode)
    pub summary_path: Option<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("./data/recon/ledger.json"),
            pipeline_path: PathBuf::from("./data/recon/pipeline.json"),
            summary_path: Some(PathBuf::from("./data/recon/summary.json")),
        }
    }
}

/// Fetch bounds and per-source timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Rows per source for the display window
    pub display_limit: usize,

    /// Rows per source for the totals window
    /// Kept well above `display_limit` so paging never looks like a mismatch
    pub totals_limit: usize,

    /// Ledger fetch timeout (milliseconds)
    pub ledger_timeout_ms: u64,

    /// Pipeline fetch timeout (milliseconds)
    pub pipeline_timeout_ms: u64,

    /// Summary fetch timeout (milliseconds)
    pub summary_timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            display_limit: 100,
            totals_limit: 1000,
            ledger_timeout_ms: 5000,
            pipeline_timeout_ms: 3000,
            summary_timeout_ms: 3000,
        }
    }
}

/// Default merchant window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Merchant id (empty = any)
    pub merchant_id: String,

    /// Lower bound (ISO date or datetime)
    pub from: String,

    /// Upper bound (ISO date or datetime)
    pub to: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(path) = std::env::var("RECON_LEDGER_PATH") {
            config.sources.ledger_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("RECON_PIPELINE_PATH") {
            config.sources.pipeline_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("RECON_SUMMARY_PATH") {
            config.sources.summary_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        if let Ok(merchant) = std::env::var("RECON_MERCHANT_ID") {
            config.window.merchant_id = merchant;
        }

        if let Ok(from) = std::env::var("RECON_FROM") {
            config.window.from = from;
        }

        if let Ok(to) = std::env::var("RECON_TO") {
            config.window.to = to;
        }

        if let Ok(limit) = std::env::var("RECON_DISPLAY_LIMIT") {
            config.fetch.display_limit = parse_env("RECON_DISPLAY_LIMIT", &limit)?;
        }

        if let Ok(limit) = std::env::var("RECON_TOTALS_LIMIT") {
            config.fetch.totals_limit = parse_env("RECON_TOTALS_LIMIT", &limit)?;
        }

        if let Ok(json) = std::env::var("RECON_LOG_JSON") {
            config.logging.json = matches!(json.as_str(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    /// Window parameters for a run
    pub fn window_params(&self, limit: usize) -> WindowParams {
        WindowParams {
            merchant_id: self.window.merchant_id.clone(),
            from: self.window.from.clone(),
            to: self.window.to.clone(),
            limit: Some(limit),
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> crate::Result<()> {
        if self.fetch.display_limit == 0 {
            return Err(crate::Error::Config(
                "display_limit must be positive".to_string(),
            ));
        }

        if self.fetch.totals_limit < self.fetch.display_limit {
            return Err(crate::Error::Config(format!(
                "totals_limit ({}) must not be below display_limit ({})",
                self.fetch.totals_limit, self.fetch.display_limit
            )));
        }

        Ok(())
    }
}

fn parse_env(name: &str, raw: &str) -> crate::Result<usize> {
    raw.trim()
        .parse()
        .map_err(|e| crate::Error::Config(format!("Invalid {}: {}", name, e)))
}
