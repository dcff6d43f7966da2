use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::RelayError;

pub const DEFAULT_USER_AGENT: &str = concat!("relay-engine/", env!("CARGO_PKG_VERSION"));

/// Content type announced to the destination when none is configured.
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Configurable options for the relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum number of source redirects followed before giving up
    pub max_redirects: usize,

    /// Connection timeout (time to establish initial connection).
    /// Zero disables the timeout.
    pub connect_timeout: Duration,

    /// Content type sent with the upload request
    pub content_type: String,

    /// User agent string
    pub user_agent: String,

    /// Upper bound on the destination response body kept in memory
    pub max_response_bytes: usize,

    /// Number of source chunks buffered between the source and the upload body
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            connect_timeout: Duration::from_secs(30),
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_response_bytes: 1024 * 1024,
            channel_capacity: 16,
        }
    }
}

/// Create the reqwest client used for both legs of a relay.
///
/// Redirects are never followed by the client itself: the source leg follows
/// them explicitly so each hop can be checked, and the destination leg must
/// not be redirected at all.
pub fn create_client(config: &RelayConfig) -> Result<Client, RelayError> {
    let mut client_builder = Client::builder()
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::none())
        .tcp_nodelay(true);

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    debug!(
        max_redirects = config.max_redirects,
        connect_timeout_ms = config.connect_timeout.as_millis() as u64,
        "Building relay HTTP client"
    );

    client_builder
        .build()
        .map_err(|source| RelayError::Client { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.content_type, "video/mp4");
        assert!(config.user_agent.starts_with("relay-engine/"));
        assert!(config.channel_capacity > 0);
    }

    #[test]
    fn client_builds_without_timeouts() {
        let config = RelayConfig {
            connect_timeout: Duration::ZERO,
            ..RelayConfig::default()
        };
        assert!(create_client(&config).is_ok());
    }
}
