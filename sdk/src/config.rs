//! Client configuration

use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the workspace server (without the `/api/v1` prefix)
    pub api_url: String,

    /// Optional API key sent as a bearer token
    pub api_key: Option<String>,

    /// Timeout applied to plain request/response calls
    pub request_timeout: Duration,

    /// Timeout for establishing connections, streams and terminal sockets included
    pub connect_timeout: Duration,

    /// Extra time granted to the server to report its own process timeout
    /// before the client gives up on a `run` call
    pub timeout_grace: Duration,

    /// Terminal output kept while no data observer is registered
    pub pty_backlog_bytes: usize,
}

fn default_api_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout_grace() -> Duration {
    Duration::from_secs(2)
}

fn default_pty_backlog_bytes() -> usize {
    64 * 1024
}

impl ClientConfig {
    /// Create a configuration for the given server URL
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn load() -> Self {
        let mut config = ClientConfig::default();

        if let Ok(val) = std::env::var("WORKSPACE_API_URL") {
            config.api_url = val;
        }
        if let Ok(val) = std::env::var("WORKSPACE_API_KEY") {
            if !val.is_empty() {
                config.api_key = Some(val);
            }
        }
        if let Ok(val) = std::env::var("WORKSPACE_REQUEST_TIMEOUT") {
            if let Ok(secs) = val.parse() {
                config.request_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(val) = std::env::var("WORKSPACE_CONNECT_TIMEOUT") {
            if let Ok(secs) = val.parse() {
                config.connect_timeout = Duration::from_secs(secs);
            }
        }

        config
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_timeout_grace(mut self, grace: Duration) -> Self {
        self.timeout_grace = grace;
        self
    }

    pub fn with_pty_backlog_bytes(mut self, bytes: usize) -> Self {
        self.pty_backlog_bytes = bytes;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            timeout_grace: default_timeout_grace(),
            pty_backlog_bytes: default_pty_backlog_bytes(),
        }
    }
}
