//! Session tunables and endpoint resolution.
//!
//! DESIGN
//! ======
//! Tunables are constants with environment overrides, read once when a
//! session is created. The realtime endpoint is derived from the HTTP API base
//! by swapping `http`/`https` for `ws`/`wss`; production deployments always
//! resolve to the secure scheme.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use reqwest::Url;

pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 500;
pub const DEFAULT_MESSAGE_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Path of the realtime endpoint, relative to the WS base.
const WS_PATH: &str = "ws";
/// Query parameter carrying the identity.
const IDENTITY_PARAM: &str = "username";

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported scheme `{scheme}` in `{url}`")]
    UnsupportedScheme { scheme: String, url: String },
}

// =============================================================================
// SESSION CONFIG
// =============================================================================

/// Reconnection and message-window tunables for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Retry budget: consecutive abnormal closures tolerated before `Failed`.
    pub reconnect_attempts: u32,
    /// Fixed delay before each automatic reconnection attempt.
    pub reconnect_delay: Duration,
    /// Longest draft (in characters) the form layer lets through.
    pub max_message_length: usize,
    /// Number of most recent messages kept visible.
    pub message_history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            message_history_limit: DEFAULT_MESSAGE_HISTORY_LIMIT,
        }
    }
}

impl SessionConfig {
    /// Defaults, overridden by `QUARTET_*` environment variables when they
    /// parse. Unparseable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            reconnect_attempts: env_parse("QUARTET_RECONNECT_ATTEMPTS", DEFAULT_RECONNECT_ATTEMPTS),
            reconnect_delay: Duration::from_millis(env_parse(
                "QUARTET_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY_MS,
            )),
            max_message_length: env_parse("QUARTET_MAX_MESSAGE_LENGTH", DEFAULT_MAX_MESSAGE_LENGTH),
            message_history_limit: env_parse("QUARTET_MESSAGE_HISTORY_LIMIT", DEFAULT_MESSAGE_HISTORY_LIMIT)
                .max(1),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// DEPLOYMENT
// =============================================================================

/// Which scheme family the client talks to the backend with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Deployment {
    /// Local development: plain `ws://` unless the base is already secure.
    #[default]
    Development,
    /// Hosted deployment: always `wss://`.
    Production,
}

impl Deployment {
    /// `"production"` (any case) selects [`Deployment::Production`]; anything
    /// else is development.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }
}

// =============================================================================
// ENDPOINT
// =============================================================================

/// Base address of the realtime endpoint (`ws://` or `wss://`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
}

impl Endpoint {
    /// Wrap a WS base as-is. Scheme problems surface from [`Endpoint::url_for`].
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Resolve the WS base from an explicit WS URL, or derive it from the HTTP
    /// API base when none is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the chosen URL has no scheme or a scheme
    /// other than `http`, `https`, `ws`, `wss`.
    pub fn resolve(ws_url: Option<&str>, api_url: &str, deployment: Deployment) -> Result<Self, ConfigError> {
        let source = ws_url.unwrap_or(api_url);
        let Some((scheme, rest)) = source.split_once("://") else {
            return Err(ConfigError::InvalidUrl {
                url: source.to_owned(),
                reason: "missing scheme".to_owned(),
            });
        };

        let scheme = match (scheme.to_ascii_lowercase().as_str(), deployment) {
            ("https" | "wss", _) | ("http" | "ws", Deployment::Production) => "wss",
            ("http" | "ws", Deployment::Development) => "ws",
            (other, _) => {
                return Err(ConfigError::UnsupportedScheme {
                    scheme: other.to_owned(),
                    url: source.to_owned(),
                });
            }
        };

        Ok(Self::new(format!("{scheme}://{rest}")))
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Full connection URL for `identity`, URL-encoded into the query string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the base does not parse or is not `ws`/`wss`.
    pub fn url_for(&self, identity: &str) -> Result<String, ConfigError> {
        let raw = format!("{}/{WS_PATH}", self.base.trim_end_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::UnsupportedScheme {
                scheme: url.scheme().to_owned(),
                url: raw,
            });
        }

        url.query_pairs_mut().append_pair(IDENTITY_PARAM, identity);
        Ok(url.to_string())
    }
}
