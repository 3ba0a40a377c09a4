use std::time::Duration;

use super::error::{HttpApiError, HttpResult};

/// Runtime configuration describing how to reach the match API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API root; a trailing slash is ignored.
    pub base_url: String,
    /// Bearer token, if the deployment requires one.
    pub token: Option<String>,
    /// Connection timeout handed to the HTTP client.
    pub connect_timeout: Option<Duration>,
}

impl ApiConfig {
    /// Construct a configuration from an explicit base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            connect_timeout: None,
        }
    }

    /// Attach a bearer token sent with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Bound the time spent establishing connections.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Build a configuration by reading the expected environment variables.
    pub fn from_env() -> HttpResult<Self> {
        let base_url = std::env::var("OCHE_API_BASE_URL").map_err(|_| {
            HttpApiError::MissingEnvVar {
                var: "OCHE_API_BASE_URL",
            }
        })?;

        let mut config = Self::new(base_url);
        if let Some(token) = std::env::var("OCHE_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())
        {
            config = config.with_token(token);
        }

        Ok(config)
    }
}
