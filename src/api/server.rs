use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{health, run_job},
    state::AppState,
};
use crate::config::Config;
use crate::fetcher::{AssetFetcher, HttpClient, HttpConfig};
use crate::generation::SynexaClient;
use crate::observability::Metrics;
use crate::pipeline::{PipelineOptions, PipelineOrchestrator};
use crate::storage::StorageGateway;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Wire storage, generation and fetching into an orchestrator for `config`
pub fn build_state(config: Config) -> Result<AppState, AnyError> {
    let metrics = Arc::new(Metrics::new());

    info!(
        provider = ?config.storage.provider,
        bucket = %config.storage.bucket_name(),
        "Initializing storage"
    );
    let storage = StorageGateway::from_config(&config.storage)
        .map_err(|e| format!("Failed to initialize storage: {e}"))?
        .with_upload_timeout(Duration::from_secs(config.pipeline.upload_timeout_secs));

    let generator = SynexaClient::new(&config.generation)
        .map_err(|e| format!("Failed to initialize generation client: {e}"))?;

    let http = HttpClient::new(HttpConfig {
        request_timeout: Duration::from_secs(config.pipeline.fetch_timeout_secs),
        max_body_bytes: config.pipeline.max_container_bytes.as_u64(),
        ..HttpConfig::default()
    })
    .map_err(|e| format!("Failed to initialize HTTP client: {e}"))?;

    info!(path = %config.pipeline.workspace_root.display(), "Using workspace root");
    let fetcher = AssetFetcher::new(http, config.pipeline.workspace_root.clone());

    let orchestrator = PipelineOrchestrator::new(
        Arc::new(storage),
        Arc::new(generator),
        fetcher,
        PipelineOptions::from_config(&config),
        metrics.clone(),
    );

    Ok(AppState::new(config, Arc::new(orchestrator), metrics))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/run", post(run_job))
        .route("/health", get(health))
        .with_state(state)
        .layer(RequestDecompressionLayer::new())
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    let app = router(build_state(config)?);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "TexBox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
