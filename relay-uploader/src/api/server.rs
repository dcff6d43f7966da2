//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::response::Response;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, MakeSpan, OnFailure,
    OnRequest, OnResponse, TraceLayer,
};
use tracing::{Level, Span};

use crate::api::routes;
use crate::config::{TransferConfig, env_parse, env_string};
use crate::error::Result;
use crate::jobs::{InMemoryJobRegistry, JobRegistry};
use crate::transfer::TransferOrchestrator;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Request body size limit in bytes
    pub body_limit: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            enable_cors: true,
            body_limit: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl ApiServerConfig {
    /// Load API server config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `API_PORT` (e.g. "8080")
    /// - `API_BODY_LIMIT` in bytes
    /// - `API_ENABLE_CORS` ("true" / "false")
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Some(bind_address) = env_string("API_BIND_ADDRESS") {
            config.bind_address = bind_address;
        }
        if let Some(port) = env_parse::<u16>("API_PORT") {
            config.port = port;
        }
        if let Some(body_limit) = env_parse::<usize>("API_BODY_LIMIT") {
            config.body_limit = body_limit;
        }
        if let Some(enable_cors) = env_parse::<bool>("API_ENABLE_CORS") {
            config.enable_cors = enable_cors;
        }

        config
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Job registry shared with the running transfers
    pub registry: Arc<dyn JobRegistry>,
    /// Starts background transfers
    pub orchestrator: Arc<TransferOrchestrator>,
}

impl AppState {
    /// Create application state with an in-memory job registry.
    pub fn new(transfer_config: TransferConfig) -> Result<Self> {
        Self::with_registry(Arc::new(InMemoryJobRegistry::new()), transfer_config)
    }

    /// Create application state around an existing registry.
    pub fn with_registry(
        registry: Arc<dyn JobRegistry>,
        transfer_config: TransferConfig,
    ) -> Result<Self> {
        let orchestrator = Arc::new(TransferOrchestrator::new(
            registry.clone(),
            transfer_config,
        )?);
        Ok(Self {
            start_time: Instant::now(),
            registry,
            orchestrator,
        })
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    /// Create with custom state.
    pub fn with_state(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.body_limit));

        // Add CORS if enabled
        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        // Health checks get no span; status polls log at debug.
        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path().starts_with("/health") {
                        Span::none()
                    } else {
                        DefaultMakeSpan::new().level(Level::INFO).make_span(req)
                    }
                })
                .on_request(|req: &Request, span: &Span| {
                    if span.is_disabled() {
                        return;
                    }
                    let level = if req.uri().path().starts_with("/upload-status") {
                        Level::DEBUG
                    } else {
                        Level::INFO
                    };
                    DefaultOnRequest::new().level(level).on_request(req, span);
                })
                .on_response(|res: &Response, latency: Duration, span: &Span| {
                    if !span.is_disabled() {
                        DefaultOnResponse::new()
                            .level(Level::DEBUG)
                            .on_response(res, latency, span);
                    }
                })
                .on_failure(
                    |class: ServerErrorsFailureClass, latency: Duration, span: &Span| {
                        if !span.is_disabled() {
                            DefaultOnFailure::new()
                                .level(Level::ERROR)
                                .on_failure(class, latency, span);
                        }
                    },
                ),
        )
    }

    /// Start the server.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| crate::error::Error::ApiError(format!("Invalid address: {}", e)))?;

        let router = self.router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Async uploader listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| crate::error::Error::ApiError(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
