//! Streaming relay from an opened source into a destination `PUT`.

use std::io;

use futures::StreamExt;
use reqwest::{Client, Response};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{RelayConfig, create_client};
use crate::destination::{DestinationConnector, UploadChunk, upload_body};
use crate::error::RelayError;
use crate::response::{UploadReceipt, finish_exchange};
use crate::source::{SourceResponse, open_source};

/// Result of a completed relay.
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub receipt: UploadReceipt,
    /// Bytes forwarded from the source to the destination.
    pub bytes: u64,
    /// Source URL the bytes were actually read from.
    pub source_url: Url,
    pub redirects: usize,
}

/// Moves a resource from a source URL into a resumable upload endpoint.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    destination: DestinationConnector,
    config: RelayConfig,
}

impl RelayClient {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let client = create_client(&config)?;
        let destination = DestinationConnector::new(&config)?;
        Ok(Self {
            client,
            destination,
            config,
        })
    }

    /// Open the source, following redirects within the configured limit.
    pub async fn open_source(&self, url: &Url) -> Result<SourceResponse, RelayError> {
        open_source(&self.client, url, self.config.max_redirects).await
    }

    /// Stream an opened source into `destination` and parse the destination's
    /// answer.
    ///
    /// `on_progress` is called with the length of every source chunk once the
    /// chunk has been handed to the upload body.
    ///
    /// A source failure is reported even when it also broke the upload. An
    /// answer the destination sends before the body is complete ends the relay
    /// without reading the rest of the source.
    #[instrument(skip(self, source, on_progress), fields(source = %source.url), level = "debug")]
    pub async fn upload<F>(
        &self,
        source: SourceResponse,
        destination: &Url,
        on_progress: F,
    ) -> Result<RelayOutcome, RelayError>
    where
        F: Fn(u64) + Send + Sync,
    {
        let SourceResponse {
            url: source_url,
            redirects,
            response,
        } = source;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let content_length = response.content_length();

        let exchange = async {
            let response = self
                .destination
                .send(
                    destination,
                    &self.config.content_type,
                    content_length,
                    upload_body(rx),
                )
                .await?;
            finish_exchange(response, self.config.max_response_bytes).await
        };
        let pumping = pump(response, tx, &on_progress);
        tokio::pin!(exchange);
        tokio::pin!(pumping);

        let (bytes, receipt) = tokio::select! {
            biased;
            pumped = &mut pumping => {
                let bytes = pumped?;
                (bytes, exchange.await?)
            }
            exchanged = &mut exchange => {
                let receipt = exchanged?;
                (pumping.await?, receipt)
            }
        };

        info!(
            destination = %destination.host_str().unwrap_or_default(),
            bytes,
            id = %receipt.id,
            "Relay completed"
        );

        Ok(RelayOutcome {
            receipt,
            bytes,
            source_url,
            redirects,
        })
    }

    /// Open `source` and relay it into `destination` in one step.
    pub async fn relay<F>(
        &self,
        source: &Url,
        destination: &Url,
        on_progress: F,
    ) -> Result<RelayOutcome, RelayError>
    where
        F: Fn(u64) + Send + Sync,
    {
        let opened = self.open_source(source).await?;
        self.upload(opened, destination, on_progress).await
    }
}

/// Forward every source chunk into the upload body channel.
async fn pump<F>(
    response: Response,
    tx: mpsc::Sender<UploadChunk>,
    on_progress: &F,
) -> Result<u64, RelayError>
where
    F: Fn(u64) + Send + Sync,
{
    let mut stream = response.bytes_stream();
    let mut total = 0u64;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                let len = chunk.len() as u64;
                if tx.send(Ok(chunk)).await.is_err() {
                    debug!(bytes = total, "Destination stopped consuming the upload body");
                    break;
                }
                total += len;
                on_progress(len);
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(bytes = total, error = %reason, "Source stream failed mid-relay");
                // Abort the upload instead of letting it end as if complete.
                let _ = tx.send(Err(io::Error::other(reason.clone()))).await;
                return Err(RelayError::SourceRead { reason });
            }
        }
    }

    debug!(bytes = total, "Source stream drained");
    Ok(total)
}
