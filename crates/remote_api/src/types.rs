use std::env;
use std::time::Duration;

use serde::Deserialize;
use validator::Validate;

/// Default base URL of the park API.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8001/api/v1";

/// Errors surfaced by remote gateway calls.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// The remote resource does not exist.
    #[error("Remote resource not found")]
    NotFound,

    /// The server answered with a non-success status.
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Data format error: {0}")]
    Decode(String),

    /// The client is misconfigured.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Network(_) | GatewayError::Timeout => true,
            GatewayError::Server { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            GatewayError::Server {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            GatewayError::Network(e.to_string())
        }
    }
}

/// Configuration of the park API client.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ApiConfig {
    /// Base URL all paths are appended to (default: `http://localhost:8001/api/v1`)
    #[validate(url(message = "base_url must be an absolute URL"))]
    pub base_url: String,

    /// Per-request timeout in seconds (default: 30)
    #[validate(range(min = 1, max = 600, message = "timeout must be between 1 and 600 seconds"))]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    /// Reads `PARK_API_URL` and `PARK_API_TIMEOUT_SECS`, using defaults when unset.
    pub fn from_env() -> Result<Self, GatewayError> {
        let mut config = Self::default();

        if let Ok(url) = env::var("PARK_API_URL") {
            config.base_url = url;
        }
        if let Ok(raw) = env::var("PARK_API_TIMEOUT_SECS") {
            config.timeout_secs = raw.trim().parse().map_err(|e| {
                GatewayError::Config(format!("Invalid PARK_API_TIMEOUT_SECS {:?}: {}", raw, e))
            })?;
        }

        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ApiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ApiConfig {
            base_url: "not a url".to_string(),
            timeout_secs: 0,
        };
        let errors = config.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("base_url"));
        assert!(fields.contains_key("timeout_secs"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GatewayError::Timeout.is_retryable());
        assert!(GatewayError::Network("reset".into()).is_retryable());
        assert!(
            GatewayError::Server {
                status: 503,
                message: "down".into()
            }
            .is_retryable()
        );
        assert!(
            !GatewayError::Server {
                status: 422,
                message: "bad".into()
            }
            .is_retryable()
        );
        assert!(!GatewayError::NotFound.is_retryable());
    }
}
