//! Cart client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CART_API_BASE_URL` - Backend origin (e.g., <https://api.ruoulang.vn>)
//!
//! ## Optional
//! - `CART_SYNC_DEBOUNCE_MS` - Quiet period before a quantity edit is synced
//!   (default: 600)
//! - `CART_INPUT_DEBOUNCE_MS` - Quiet period for manual text entry before it
//!   is validated and committed (default: 1000)
//! - `CART_REQUEST_TIMEOUT_SECS` - Per-request HTTP timeout (default: 10)

use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_SYNC_DEBOUNCE_MS: u64 = 600;
const DEFAULT_INPUT_DEBOUNCE_MS: u64 = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart subsystem configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Backend API origin; endpoint paths are joined onto this.
    pub api_base_url: Url,
    /// Quiet period before a local quantity edit is synced to the server.
    pub sync_debounce: Duration,
    /// Quiet period for raw text-entry before validation and commit.
    pub input_debounce: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = parse_base_url(&get_required_env("CART_API_BASE_URL")?)?;
        let sync_debounce = Duration::from_millis(get_u64_or_default(
            "CART_SYNC_DEBOUNCE_MS",
            DEFAULT_SYNC_DEBOUNCE_MS,
        )?);
        let input_debounce = Duration::from_millis(get_u64_or_default(
            "CART_INPUT_DEBOUNCE_MS",
            DEFAULT_INPUT_DEBOUNCE_MS,
        )?);
        let request_timeout = Duration::from_secs(get_u64_or_default(
            "CART_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        Ok(Self {
            api_base_url,
            sync_debounce,
            input_debounce,
            request_timeout,
        })
    }

    /// Programmatic constructor with default timings. Used by tests and
    /// embedders that already know the backend origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `base_url` is not a valid absolute URL.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: parse_base_url(base_url)?,
            sync_debounce: Duration::from_millis(DEFAULT_SYNC_DEBOUNCE_MS),
            input_debounce: Duration::from_millis(DEFAULT_INPUT_DEBOUNCE_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    /// Override the sync quiet period (builder-style, mostly for tests).
    #[must_use]
    pub const fn with_sync_debounce(mut self, delay: Duration) -> Self {
        self.sync_debounce = delay;
        self
    }

    /// Override the input quiet period (builder-style, mostly for tests).
    #[must_use]
    pub const fn with_input_debounce(mut self, delay: Duration) -> Self {
        self.input_debounce = delay;
        self
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a numeric environment variable with a default value.
fn get_u64_or_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Parse and validate the backend origin.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidEnvVar("CART_API_BASE_URL".to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEnvVar(
            "CART_API_BASE_URL".to_string(),
            "must be an absolute http(s) URL".to_string(),
        ));
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_with_valid_url() {
        let config = CartConfig::new("http://localhost:4000").unwrap();
        assert_eq!(config.api_base_url.as_str(), "http://localhost:4000/");
        assert_eq!(config.sync_debounce, Duration::from_millis(600));
        assert_eq!(config.input_debounce, Duration::from_millis(1000));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        assert!(CartConfig::new("not a url").is_err());
        assert!(CartConfig::new("mailto:cart@ruoulang.vn").is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let config = CartConfig::new("http://localhost:4000")
            .unwrap()
            .with_sync_debounce(Duration::from_millis(50))
            .with_input_debounce(Duration::from_millis(80));
        assert_eq!(config.sync_debounce, Duration::from_millis(50));
        assert_eq!(config.input_debounce, Duration::from_millis(80));
    }

    #[test]
    fn test_millis_parse_error_message() {
        let err = ConfigError::InvalidEnvVar(
            "CART_SYNC_DEBOUNCE_MS".to_string(),
            "invalid digit".to_string(),
        );
        assert!(err.to_string().contains("CART_SYNC_DEBOUNCE_MS"));
    }
}
