//! Tap configuration as read from the Singer-style JSON config file.

use crate::retry::RetryPolicy;
use eyre::Context;
use jiff::Timestamp;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Base URL for all business resource endpoints.
pub const DEFAULT_API_URL: &str = "https://business-api.tiktok.com/open_api/v1.2/business";

/// Endpoint that exchanges a refresh token for a new access token.
pub const DEFAULT_AUTH_ENDPOINT: &str =
    "https://business-api.tiktok.com/open_api/oauth2/token/?business=tt_user";

#[derive(Clone, Deserialize)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    /// Seed access token. It is refreshed before first use since its age is unknown.
    pub access_token: String,
    pub refresh_token: String,
    /// Business accounts to extract; each one becomes an account partition.
    pub business_ids: Vec<String>,
    /// The earliest record date to sync.
    #[serde(default)]
    pub start_date: Option<Timestamp>,
    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_auth_endpoint")]
    pub auth_endpoint: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_auth_endpoint() -> String {
    DEFAULT_AUTH_ENDPOINT.to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

impl Config {
    /// Reads and parses a JSON config file.
    pub async fn from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("read config file {}", path.display()))?;
        Self::from_json(&raw).wrap_err_with(|| format!("parse config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> eyre::Result<Self> {
        let config: Config = serde_json::from_str(raw).context("deserialize tap config")?;
        if config.max_attempts == 0 {
            eyre::bail!("max_attempts must be at least 1");
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
            2.0,
        )
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("business_ids", &self.business_ids)
            .field("start_date", &self.start_date)
            .field("user_agent", &self.user_agent)
            .field("api_url", &self.api_url)
            .field("auth_endpoint", &self.auth_endpoint)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
