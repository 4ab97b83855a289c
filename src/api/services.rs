use std::time::Duration;

use axum::{Json, extract::State, extract::rejection::JsonRejection, response::IntoResponse};

use super::{
    dispatch::dispatch,
    error::ApiError,
    models::{HealthResponse, RunRequest, RunResponse},
    state::AppState,
};

/// Job endpoint (POST /run)
///
/// Runs the job synchronously and returns its output. Job failures are part
/// of the output (`{"error": ...}`); only an unreadable envelope is an HTTP error.
pub async fn run_job(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    let output = dispatch(state.orchestrator.clone(), request.input).await;

    Ok(Json(RunResponse { output }))
}

/// Key looked up to confirm the storage backend answers; it need not exist
const HEALTH_CHECK_KEY: &str = "texbox-health-check";
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Health check endpoint (GET /health)
///
/// Reports per-component status and the pipeline counters. Storage is
/// unhealthy when a metadata lookup fails or does not answer in time. The
/// generation component reads `unconfigured` without an API key; `create`
/// jobs will fail but links and deletes still work, so the service stays healthy.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let storage = match tokio::time::timeout(
        HEALTH_CHECK_TIMEOUT,
        state.orchestrator.storage().exists(HEALTH_CHECK_KEY),
    )
    .await
    {
        Ok(Ok(_)) => "healthy",
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Storage health check failed");
            "unhealthy"
        }
        Err(_) => {
            tracing::warn!("Storage health check timed out");
            "unhealthy"
        }
    };
    components.insert("storage".to_string(), storage.to_string());

    let generation = if state.config.generation.api_key.is_some() {
        "healthy"
    } else {
        "unconfigured"
    };
    components.insert("generation".to_string(), generation.to_string());

    let all_healthy = components.values().all(|status| status != "unhealthy");
    let (overall_status, status_code) = if all_healthy {
        ("healthy", axum::http::StatusCode::OK)
    } else {
        ("unhealthy", axum::http::StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}
