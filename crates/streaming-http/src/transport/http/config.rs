use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{env_secs, env_value};
use crate::errors::StreamingError;

/// Configuration for [`HttpTransport`](super::HttpTransport).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Time allowed to establish the connection.
    pub connect_timeout: Duration,
    /// Whole-request deadline. `None` lets streams run as long as the server sends.
    pub timeout: Option<Duration>,
    /// Longest silence tolerated between two chunks of a stream.
    pub idle_timeout: Option<Duration>,
    /// `User-Agent` header value.
    pub user_agent: Option<String>,
    /// Headers sent with every request; per-request headers win.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: None,
            idle_timeout: None,
            user_agent: Some(concat!("streaming-http/", env!("CARGO_PKG_VERSION")).to_string()),
            default_headers: BTreeMap::new(),
        }
    }
}

impl HttpTransportConfig {
    /// Builds a config from the environment:
    ///
    /// - `STREAMING_HTTP_CONNECT_TIMEOUT_SECS`
    /// - `STREAMING_HTTP_TIMEOUT_SECS`
    /// - `STREAMING_HTTP_IDLE_TIMEOUT_SECS`
    /// - `STREAMING_HTTP_USER_AGENT`
    pub fn from_env() -> Result<Self, StreamingError> {
        let mut config = Self::default();
        if let Some(connect) = env_secs("STREAMING_HTTP_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = connect;
        }
        config.timeout = env_secs("STREAMING_HTTP_TIMEOUT_SECS")?;
        config.idle_timeout = env_secs("STREAMING_HTTP_IDLE_TIMEOUT_SECS")?;
        if let Some(user_agent) = env_value("STREAMING_HTTP_USER_AGENT") {
            config.user_agent = Some(user_agent);
        }
        Ok(config)
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }
}
