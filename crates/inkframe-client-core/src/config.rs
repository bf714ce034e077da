//! Session configuration.

use std::time::Duration;

use url::Url;

use crate::error::{CoreError, Result};

pub const ENV_API_BASE_URL: &str = "INKFRAME_API_BASE_URL";
pub const ENV_WS_URL: &str = "INKFRAME_WS_URL";

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HISTORY_LIMIT: usize = 3;
pub const DEFAULT_GALLERY_LIMIT: usize = 50;

/// Configuration for a [`crate::Session`].
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// HTTP API base URL, e.g. `http://frame.local:8000`.
    pub api_base_url: String,
    /// Realtime channel endpoint, derived from the base URL unless overridden.
    pub ws_url: String,
    /// Fixed backoff between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Job status poll period while a job is running.
    pub poll_interval: Duration,
    /// WebSocket connect timeout.
    pub connect_timeout: Duration,
    /// Prompt history entries to keep.
    pub history_limit: usize,
    /// Gallery entries to fetch by default.
    pub gallery_limit: usize,
}

impl CoreConfig {
    pub fn new(api_base_url: impl Into<String>) -> Result<Self> {
        let api_base_url = api_base_url.into();
        let ws_url = derive_ws_url(&api_base_url)?;
        Ok(Self {
            api_base_url,
            ws_url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            gallery_limit: DEFAULT_GALLERY_LIMIT,
        })
    }

    /// Build a config from `INKFRAME_API_BASE_URL` / `INKFRAME_WS_URL`,
    /// falling back to the local default server.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(ENV_API_BASE_URL)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let mut config = Self::new(base_url)?;
        if let Some(ws_url) = std::env::var(ENV_WS_URL)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            config.ws_url = ws_url;
        }
        Ok(config)
    }
}

/// Map the HTTP base URL onto the realtime endpoint: `http` becomes `ws`,
/// `https` becomes `wss`, path fixed at `/api/v1/ws`.
pub fn derive_ws_url(api_base_url: &str) -> Result<String> {
    let mut url = Url::parse(api_base_url.trim())?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(CoreError::InvalidUrl(format!(
                "expected http:// or https:// base URL, got: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| CoreError::InvalidUrl(api_base_url.trim().to_string()))?;
    url.set_path("/api/v1/ws");
    url.set_query(None);
    Ok(url.to_string())
}
