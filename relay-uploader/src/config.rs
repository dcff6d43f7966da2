//! Process configuration loaded from environment variables.
//!
//! A `.env` file is honoured when present (see `main`). Unset or invalid
//! values fall back to defaults; invalid ones are logged.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use relay_engine::RelayConfig;
use tracing::warn;

use crate::api::server::ApiServerConfig;

/// Placeholder replaced by the destination resource id in
/// [`TransferConfig::public_url_template`].
pub const RESOURCE_ID_PLACEHOLDER: &str = "{id}";

/// Default shareable URL for an uploaded resource.
pub const DEFAULT_PUBLIC_URL_TEMPLATE: &str = "https://youtube.com/watch?v={id}";

/// Transfer settings.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Relay engine options.
    pub relay: RelayConfig,
    /// Template for the human-shareable URL of an uploaded resource.
    pub public_url_template: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            public_url_template: DEFAULT_PUBLIC_URL_TEMPLATE.to_string(),
        }
    }
}

impl TransferConfig {
    /// Load transfer config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `RELAY_MAX_REDIRECTS` (e.g. "10")
    /// - `RELAY_CONNECT_TIMEOUT_SECS` (e.g. "30", "0" disables)
    /// - `RELAY_CONTENT_TYPE` (e.g. "video/mp4")
    /// - `RELAY_MAX_RESPONSE_BYTES` (e.g. "1048576")
    /// - `RELAY_USER_AGENT`
    /// - `PUBLIC_URL_TEMPLATE` (e.g. "https://youtube.com/watch?v={id}")
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Some(max_redirects) = env_parse::<usize>("RELAY_MAX_REDIRECTS") {
            config.relay.max_redirects = max_redirects;
        }
        if let Some(secs) = env_parse::<u64>("RELAY_CONNECT_TIMEOUT_SECS") {
            config.relay.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(content_type) = env_string("RELAY_CONTENT_TYPE") {
            config.relay.content_type = content_type;
        }
        if let Some(max_bytes) = env_parse::<usize>("RELAY_MAX_RESPONSE_BYTES") {
            config.relay.max_response_bytes = max_bytes;
        }
        if let Some(user_agent) = env_string("RELAY_USER_AGENT") {
            config.relay.user_agent = user_agent;
        }
        if let Some(template) = env_string("PUBLIC_URL_TEMPLATE") {
            if template.contains(RESOURCE_ID_PLACEHOLDER) {
                config.public_url_template = template;
            } else {
                warn!(
                    template = %template,
                    "PUBLIC_URL_TEMPLATE has no {{id}} placeholder; using default"
                );
            }
        }

        config
    }

    /// Shareable URL for the resource the destination created.
    pub fn resource_url(&self, resource_id: &str) -> String {
        self.public_url_template
            .replace(RESOURCE_ID_PLACEHOLDER, resource_id)
    }
}

/// Complete process configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ApiServerConfig,
    pub transfer: TransferConfig,
}

impl AppConfig {
    /// Load the whole configuration. Call after logging is initialised so
    /// that rejected values are reported.
    pub fn from_env_or_default() -> Self {
        Self {
            server: ApiServerConfig::from_env_or_default(),
            transfer: TransferConfig::from_env_or_default(),
        }
    }
}

/// Non-empty, trimmed value of an environment variable.
pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parsed value of an environment variable; invalid values are logged and ignored.
pub(crate) fn env_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env_string(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, value = %raw, error = %e, "Ignoring invalid environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_url_uses_template() {
        let config = TransferConfig::default();
        assert_eq!(
            config.resource_url("abc123"),
            "https://youtube.com/watch?v=abc123"
        );

        let config = TransferConfig {
            public_url_template: "https://media.example/v/{id}/watch".to_string(),
            ..TransferConfig::default()
        };
        assert_eq!(
            config.resource_url("xyz"),
            "https://media.example/v/xyz/watch"
        );
    }

    #[test]
    fn defaults_match_relay_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.transfer.relay.max_redirects, 10);
        assert_eq!(config.transfer.relay.content_type, "video/mp4");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn unset_variables_are_none() {
        assert_eq!(env_string("RELAY_UPLOADER_TEST_SURELY_UNSET"), None);
        assert_eq!(env_parse::<u16>("RELAY_UPLOADER_TEST_SURELY_UNSET"), None);
    }
}
