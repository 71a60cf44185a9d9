use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, VvpError};
use crate::http::ReqwestSession;
use crate::poll::PollPolicy;
use crate::session::{Headers, VvpSession};

pub const DEFAULT_NAMESPACE: &str = "default";

/// Connection and polling settings, normally read from `VVP_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct VvpConfig {
    pub base_url: String,
    pub namespace: String,
    pub api_token: Option<String>,
    pub http_timeout: Duration,
    pub poll: PollPolicy,
}

impl VvpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            api_token: None,
            http_timeout: Duration::from_secs(30),
            poll: PollPolicy::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable lookup; used by `from_env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("VVP_BASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| VvpError::configuration("VVP_BASE_URL must be set"))?;

        let mut config = Self::new(base_url);
        if let Some(namespace) = lookup("VVP_NAMESPACE").filter(|ns| !ns.is_empty()) {
            config.namespace = namespace;
        }
        config.api_token = lookup("VVP_API_TOKEN").filter(|token| !token.is_empty());

        if let Some(secs) = parse_var::<u64, _>(&lookup, "VVP_HTTP_TIMEOUT_SECS")? {
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(millis) = parse_var::<u64, _>(&lookup, "VVP_POLL_INTERVAL_MS")? {
            config.poll.interval = Duration::from_millis(millis);
        }
        if let Some(attempts) = parse_var::<u32, _>(&lookup, "VVP_POLL_MAX_ATTEMPTS")? {
            config.poll.max_attempts = attempts;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "VVP_POLL_TIMEOUT_SECS")? {
            config.poll.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn default_headers(&self) -> Headers {
        let mut headers = Headers::new();
        if let Some(token) = &self.api_token {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        headers
    }

    pub fn transport(&self) -> Result<ReqwestSession> {
        Ok(ReqwestSession::new(
            self.base_url.clone(),
            self.default_headers(),
            self.http_timeout,
        )?)
    }

    /// Opens a session on the configured namespace, checking that it exists.
    pub async fn connect(&self) -> Result<VvpSession> {
        VvpSession::connect(Arc::new(self.transport()?), self.namespace.clone()).await
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| VvpError::configuration(format!("{key} must be a number, got '{raw}'"))),
    }
}
