use crate::config::ApiConfig;
use crate::dispatch::Dispatcher;
use crate::events::S3Notification;
use crate::jobs::TranscodeRequest;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Jobs accepted for submission
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: Vec<TranscodeRequest>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", post(object_created))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "livecast-transcoder"
    }))
}

/// Accept an S3 notification and submit its jobs in the background
async fn object_created(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<AcceptedResponse>), (StatusCode, Json<ErrorResponse>)> {
    let keys = S3Notification::from_slice(&body)
        .and_then(|notification| notification.object_keys())
        .map_err(|e| {
            warn!(error = %e, "Rejected notification");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                    code: "INVALID_NOTIFICATION".to_string(),
                }),
            )
        })?;

    let requests = state.dispatcher.plan(keys);
    // Submissions outlive the request
    drop(state.dispatcher.dispatch(requests.clone()));

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse { accepted: requests }),
    ))
}

pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting transcoder API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
