//! Service configuration from environment variables.

use crate::oauth::ProviderConfig;
use anyhow::{Context, Result};
use std::time::Duration;

/// Complete service configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the HTTP API binds to.
    pub listen_addr: String,
    /// Path to the SQLite credential database.
    pub db_path: String,
    /// Base64-encoded 32-byte master key for at-rest encryption.
    pub encryption_key: String,
    /// Provider endpoint bases.
    pub provider: ProviderConfig,
    /// When false, requests without a bearer token fall back to a fixed
    /// default owner (single-user deployments).
    pub auth_enabled: bool,
    /// Timeout for outbound provider calls.
    pub http_timeout: Duration,
    /// Seconds between refresh sweep passes; 0 disables the sweep task.
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Reads configuration from `QCTOKEN_*` environment variables.
    ///
    /// Only the encryption key is required; everything else defaults to
    /// the production Qianchuan endpoints and local paths.
    pub fn from_env() -> Result<Self> {
        let encryption_key = std::env::var("QCTOKEN_ENCRYPTION_KEY")
            .context("QCTOKEN_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

        let db_path =
            std::env::var("QCTOKEN_DB").unwrap_or_else(|_| "credentials.db".to_string());

        let listen_addr =
            std::env::var("QCTOKEN_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let mut provider = ProviderConfig::default();
        if let Ok(base) = std::env::var("QCTOKEN_API_BASE_URL") {
            provider.api_base_url = base;
        }
        if let Ok(base) = std::env::var("QCTOKEN_AUTHORIZE_BASE_URL") {
            provider.authorize_base_url = base;
        }

        let auth_enabled = std::env::var("QCTOKEN_AUTH_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let http_timeout_secs: u64 = std::env::var("QCTOKEN_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("QCTOKEN_HTTP_TIMEOUT_SECS must be a number of seconds")?;

        let sweep_interval_secs: u64 = std::env::var("QCTOKEN_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .context("QCTOKEN_SWEEP_INTERVAL_SECS must be a number of seconds (0 disables)")?;

        Ok(Self {
            listen_addr,
            db_path,
            encryption_key,
            provider,
            auth_enabled,
            http_timeout: Duration::from_secs(http_timeout_secs),
            sweep_interval_secs,
        })
    }
}
