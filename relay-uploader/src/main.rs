use relay_uploader::api::{ApiServer, AppState};
use relay_uploader::config::AppConfig;
use relay_uploader::logging::init_logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let log_dir = std::env::var("LOG_DIR")
        .ok()
        .filter(|dir| !dir.trim().is_empty());
    let _log_guard = init_logging(log_dir.as_deref())?;

    let config = AppConfig::from_env_or_default();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        max_redirects = config.transfer.relay.max_redirects,
        content_type = %config.transfer.relay.content_type,
        "Starting relay-uploader"
    );

    let state = AppState::new(config.transfer)?;
    let server = ApiServer::with_state(config.server, state);

    let cancel_token = server.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                cancel_token.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    server.run().await?;

    info!("relay-uploader stopped");
    Ok(())
}
