//! Source leg of a relay: fetching the resource and following redirects.

use std::collections::HashSet;

use reqwest::header::{HeaderValue, LOCATION};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::error::RelayError;

/// An opened source: the final URL after redirects and the `200` response
/// whose body has not been read yet.
#[derive(Debug)]
pub struct SourceResponse {
    pub url: Url,
    pub redirects: usize,
    pub response: Response,
}

impl SourceResponse {
    /// Length advertised by the source, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }
}

/// Issue `GET` against `url`, following up to `max_redirects` redirects.
///
/// Every hop replaces the previous response. A URL that was already visited
/// ends the fetch with [`RelayError::RedirectLoop`].
pub async fn open_source(
    client: &Client,
    url: &Url,
    max_redirects: usize,
) -> Result<SourceResponse, RelayError> {
    let mut current = url.clone();
    let mut seen = HashSet::new();
    seen.insert(current.as_str().to_owned());

    for hop in 0..=max_redirects {
        let response = client
            .get(current.clone())
            .send()
            .await
            .map_err(|source| RelayError::SourceTransport { source })?;

        let status = response.status();
        if status == StatusCode::OK {
            if let Some(length) = response.content_length() {
                info!(url = %current, redirects = hop, bytes = length, "Source stream opened");
            } else {
                info!(url = %current, redirects = hop, "Source stream opened (length unknown)");
            }
            return Ok(SourceResponse {
                url: current,
                redirects: hop,
                response,
            });
        }

        if status.is_redirection()
            && let Some(location) = response.headers().get(LOCATION)
        {
            let next = resolve_location(&current, location)?;
            if !seen.insert(next.as_str().to_owned()) {
                return Err(RelayError::RedirectLoop {
                    url: next.to_string(),
                });
            }
            debug!(from = %current, to = %next, status = %status, "Following source redirect");
            current = next;
            continue;
        }

        return Err(RelayError::source_status(status, current.as_str()));
    }

    Err(RelayError::TooManyRedirects {
        limit: max_redirects,
        url: current.to_string(),
    })
}

/// Resolve a `Location` header against the URL that produced it.
fn resolve_location(base: &Url, location: &HeaderValue) -> Result<Url, RelayError> {
    let raw = location.to_str().map_err(|_| {
        RelayError::invalid_redirect(
            String::from_utf8_lossy(location.as_bytes()),
            "not valid UTF-8",
        )
    })?;

    let next = base
        .join(raw.trim())
        .map_err(|e| RelayError::invalid_redirect(raw, e.to_string()))?;

    match next.scheme() {
        "http" | "https" => Ok(next),
        other => Err(RelayError::invalid_redirect(
            raw,
            format!("unsupported scheme `{other}`"),
        )),
    }
}
