//! Configuration loading and constants.
//!
//! Loads application configuration from a TOML file. `AppConfig` is the root
//! configuration struct; `[http]` holds the listener settings consumed by the
//! server, `[acme]` the certificate-management settings used when a TLS
//! domain is configured, and `[jobs]` the background job runner settings.

use serde::Deserialize;
use std::path::Path;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "workshop.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "workshop=debug";

/// Default ACME certificate cache directory
pub const DEFAULT_ACME_CACHE_DIR: &str = ".workshop/acme";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpConfig,
    /// ACME certificate management (used only when http.domain is set)
    #[serde(default)]
    pub acme: AcmeSettings,
    /// Background job runner configuration
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// HTTP server configuration.
///
/// `domain` selects the listener mode: empty means plain HTTP on `addr`,
/// non-empty means HTTPS on port 443 with automatic certificates for that
/// domain (`addr` is ignored in that mode).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    /// Bind address, e.g. "127.0.0.1:8080" or ":8080". Empty binds an
    /// ephemeral port.
    #[serde(default)]
    pub addr: String,
    /// TLS domain for automatic certificate management. Empty disables TLS.
    #[serde(default)]
    pub domain: String,
    /// Reserved for cookie signing (not used by the core).
    #[serde(default)]
    pub hash_key: String,
    /// Reserved for cookie encryption (not used by the core).
    #[serde(default)]
    pub block_key: String,
}

/// ACME settings for automatic certificate provisioning.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AcmeSettings {
    /// Contact email for the ACME account
    #[serde(default)]
    pub contact: Option<String>,
    /// Directory where issued certificates are cached across restarts
    #[serde(default = "AcmeSettings::default_cache_dir")]
    pub cache_dir: String,
    /// Use the production ACME directory (default: true)
    #[serde(default = "AcmeSettings::default_production")]
    pub production: bool,
}

impl AcmeSettings {
    fn default_cache_dir() -> String {
        DEFAULT_ACME_CACHE_DIR.to_string()
    }

    fn default_production() -> bool {
        true
    }
}

impl Default for AcmeSettings {
    fn default() -> Self {
        Self {
            contact: None,
            cache_dir: Self::default_cache_dir(),
            production: Self::default_production(),
        }
    }
}

/// Background job runner configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobsConfig {
    /// Maximum number of jobs executed concurrently (default: 2)
    #[serde(default = "JobsConfig::default_workers")]
    pub workers: usize,
    /// Seconds between polls of the job source (default: 30)
    #[serde(default = "JobsConfig::default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl JobsConfig {
    fn default_workers() -> usize {
        2
    }

    fn default_poll_interval() -> u64 {
        30
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
            poll_interval_seconds: Self::default_poll_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
