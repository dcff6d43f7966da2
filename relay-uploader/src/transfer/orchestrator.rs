//! Transfer orchestrator: drives one job from `queued` to a terminal state.

use std::sync::Arc;

use relay_engine::{RelayClient, RelayOutcome};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};
use url::Url;

use crate::config::TransferConfig;
use crate::jobs::{JobRegistry, JobTransition};
use crate::{Error, Result};

/// Source and destination of one transfer, already validated as http(s) URLs.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source_url: Url,
    pub destination_url: Url,
}

/// Runs transfers in the background and records their outcome in the registry.
pub struct TransferOrchestrator {
    registry: Arc<dyn JobRegistry>,
    relay: RelayClient,
    config: TransferConfig,
}

impl TransferOrchestrator {
    pub fn new(registry: Arc<dyn JobRegistry>, config: TransferConfig) -> Result<Self> {
        let relay = RelayClient::new(config.relay.clone())
            .map_err(|e| Error::config(format!("Failed to build relay client: {e}")))?;
        Ok(Self {
            registry,
            relay,
            config,
        })
    }

    pub fn registry(&self) -> &Arc<dyn JobRegistry> {
        &self.registry
    }

    /// Hand the transfer for `job_id` to the runtime and return immediately.
    pub fn spawn(self: &Arc<Self>, job_id: String, request: TransferRequest) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let span = info_span!("transfer", job_id = %job_id);
        tokio::spawn(async move { this.run(&job_id, request).await }.instrument(span))
    }

    /// Drive the job to `done` or `error`.
    ///
    /// Transfer failures end up in the job record and are never returned.
    pub async fn run(&self, job_id: &str, request: TransferRequest) {
        if let Err(e) = self.registry.update_job(job_id, JobTransition::Start) {
            warn!(error = %e, "Job cannot be started");
            return;
        }

        info!(
            source = %request.source_url,
            destination = %request.destination_url.host_str().unwrap_or_default(),
            "Starting background upload"
        );

        let transition = match self.transfer(job_id, &request).await {
            Ok(outcome) => {
                let resource_url = self.config.resource_url(&outcome.receipt.id);
                info!(
                    resource_id = %outcome.receipt.id,
                    bytes = outcome.bytes,
                    redirects = outcome.redirects,
                    source = %outcome.source_url,
                    "Upload completed"
                );
                JobTransition::Complete {
                    resource_id: outcome.receipt.id,
                    resource_url,
                }
            }
            Err(Error::Relay(e)) => {
                error!(
                    kind = %e.kind(),
                    status = e.status().map(|s| s.as_u16()),
                    error = %e,
                    "Upload failed"
                );
                JobTransition::Fail(e.to_string())
            }
            Err(e) => {
                error!(error = %e, "Upload failed");
                JobTransition::Fail(e.to_string())
            }
        };

        if let Err(e) = self.registry.update_job(job_id, transition) {
            error!(error = %e, "Failed to record transfer outcome");
        }
    }

    async fn transfer(&self, job_id: &str, request: &TransferRequest) -> Result<RelayOutcome> {
        let source = self.relay.open_source(&request.source_url).await?;
        if source.redirects > 0 {
            info!(
                redirects = source.redirects,
                final_source = %source.url,
                "Source redirected"
            );
        }

        let registry = &self.registry;
        let outcome = self
            .relay
            .upload(source, &request.destination_url, |bytes| {
                if let Err(e) = registry.update_job(job_id, JobTransition::Progress(bytes)) {
                    warn!(error = %e, "Failed to record progress");
                }
            })
            .await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use relay_engine::RelayErrorKind;

    use crate::jobs::{InMemoryJobRegistry, JobStatus};

    fn orchestrator() -> Arc<TransferOrchestrator> {
        let registry: Arc<dyn JobRegistry> = Arc::new(InMemoryJobRegistry::new());
        Arc::new(TransferOrchestrator::new(registry, TransferConfig::default()).unwrap())
    }

    fn unreachable_request() -> TransferRequest {
        // Nothing listens on the loopback discard port.
        TransferRequest {
            source_url: Url::parse("http://127.0.0.1:9/video.mp4").unwrap(),
            destination_url: Url::parse("http://127.0.0.1:9/upload").unwrap(),
        }
    }

    #[tokio::test]
    async fn unreachable_source_ends_in_error() {
        let orchestrator = orchestrator();
        let job = orchestrator.registry().create_job().unwrap();

        orchestrator
            .spawn(job.id.clone(), unreachable_request())
            .await
            .unwrap();

        let job = orchestrator.registry().get_job(&job.id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.as_deref().unwrap().starts_with("Source request failed"));
        assert!(job.finished_at.is_some());
        assert!(job.destination_resource_id.is_none());
    }

    #[tokio::test]
    async fn relay_failures_surface_as_relay_errors() {
        let orchestrator = orchestrator();

        let err = orchestrator
            .transfer("unused", &unreachable_request())
            .await
            .unwrap_err();

        match err {
            Error::Relay(relay) => {
                assert_eq!(relay.kind(), RelayErrorKind::SourceFetch);
                assert!(relay.status().is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_job_is_left_alone() {
        let orchestrator = orchestrator();
        orchestrator.run("missing", unreachable_request()).await;
        assert!(orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn already_started_job_is_not_rerun() {
        let orchestrator = orchestrator();
        let registry = orchestrator.registry().clone();
        let id = registry.create_job().unwrap().id;
        registry.update_job(&id, JobTransition::Start).unwrap();
        registry
            .update_job(&id, JobTransition::Fail("first run".into()))
            .unwrap();

        orchestrator.run(&id, unreachable_request()).await;

        let job = registry.get_job(&id).unwrap();
        assert_eq!(job.error.as_deref(), Some("first run"));
    }
}
