use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::error::HarvestError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Persistence
    pub data_dir: PathBuf,
    pub database_url: Option<String>,

    // Downloads
    pub download_dir: PathBuf,
    pub download_timeout: Duration,

    // Identity
    pub viewer_name_override: Option<String>,
}

impl Config {
    /// Load configuration from environment variables. Every value has a default;
    /// a present but malformed value is a configuration error.
    pub fn from_env() -> Result<Self, HarvestError> {
        let data_dir = env::var("POSTHARVEST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./postharvest-data"));
        let download_dir = env::var("POSTHARVEST_DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("downloads"));
        let timeout_secs: u64 = parse_env("POSTHARVEST_DOWNLOAD_TIMEOUT_SECS", 60)?;

        let config = Self {
            data_dir,
            database_url: optional_env("DATABASE_URL"),
            download_dir,
            download_timeout: Duration::from_secs(timeout_secs),
            viewer_name_override: optional_env("POSTHARVEST_VIEWER_NAME"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.download_timeout.is_zero() {
            return Err(HarvestError::Validation(
                "POSTHARVEST_DOWNLOAD_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }
        if self.download_dir.as_os_str().is_empty() || self.data_dir.as_os_str().is_empty() {
            return Err(HarvestError::Validation("data and download directories must be set".into()));
        }
        Ok(())
    }

    /// Log the resolved configuration without credentials.
    pub fn log_redacted(&self) {
        info!(
            data_dir = %self.data_dir.display(),
            download_dir = %self.download_dir.display(),
            download_timeout_secs = self.download_timeout.as_secs(),
            database = self.database_url.is_some(),
            viewer_override = self.viewer_name_override.is_some(),
            "Configuration loaded"
        );
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, HarvestError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| HarvestError::Config(format!("{key} must be a number, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}
