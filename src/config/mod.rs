use std::time::Duration;

use anyhow::{Result, ensure};
use dotenvy::dotenv;
use serde::Deserialize;

/// Configuration for the application
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Local cache connection URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Base URL of the Comprei backend
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token sent with every API request
    #[serde(default)]
    pub api_token: Option<String>,

    /// Owner recorded on invoices created on this device
    #[serde(default = "default_user_id")]
    pub user_id: String,

    #[serde(default = "default_sync_delay_ms")]
    pub sync_delay_ms: u64,

    #[serde(default = "default_sync_max_retries")]
    pub sync_max_retries: i64,

    #[serde(default = "default_connectivity_interval_secs")]
    pub connectivity_interval_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_database_url() -> String {
    "sqlite://comprei.db".to_string()
}

fn default_api_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_user_id() -> String {
    "local".to_string()
}

fn default_sync_delay_ms() -> u64 {
    500
}

fn default_sync_max_retries() -> i64 {
    3
}

fn default_connectivity_interval_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// This function will:
    /// 1. Load variables from .env file if it exists
    /// 2. Deserialize environment variables into Config struct
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;

        Ok(config)
    }

    /// Reject values the monitor and HTTP client cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.connectivity_interval_secs > 0,
            "CONNECTIVITY_INTERVAL_SECS must be at least 1"
        );
        ensure!(
            self.request_timeout_secs > 0,
            "REQUEST_TIMEOUT_SECS must be at least 1"
        );
        ensure!(
            self.sync_max_retries > 0,
            "SYNC_MAX_RETRIES must be at least 1"
        );

        Ok(())
    }

    /// Get a direct reference to the database URL
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn sync_delay(&self) -> Duration {
        Duration::from_millis(self.sync_delay_ms)
    }

    pub fn connectivity_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Initialize environment variables and load configuration
pub fn init() -> Result<Config> {
    Config::load()
}
