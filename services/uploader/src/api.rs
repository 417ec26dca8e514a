use crate::backend::MultipartBackend;
use crate::chunk_source::CaptureError;
use crate::config::ApiConfig;
use crate::controller::RecordingController;
use crate::recording::{RecordingError, RecordingInfo, UploadOutcome};
use crate::upload_session::UploadError;
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Form field carrying the uploaded file
const UPLOAD_FIELD: &str = "upl";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RecordingController>,
    pub backend: Arc<dyn MultipartBackend>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Progress counters and recording state for the recorder page
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub bytes_produced: u64,
    pub bytes_uploaded: u64,
    pub recording: Option<RecordingInfo>,
    pub locations: Vec<String>,
}

/// Terminal outcome of a stopped recording
#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub status: &'static str,
    pub object_key: String,
    pub location: Option<String>,
    pub parts: Option<usize>,
    pub session_id: Option<String>,
    pub error: Option<String>,
}

impl From<UploadOutcome> for OutcomeResponse {
    fn from(outcome: UploadOutcome) -> Self {
        match outcome {
            UploadOutcome::Completed {
                object_key,
                location,
                parts,
            } => Self {
                status: "completed",
                object_key,
                location: Some(location),
                parts: Some(parts),
                session_id: None,
                error: None,
            },
            UploadOutcome::Failed {
                object_key,
                session_id,
                error,
            } => Self {
                status: "failed",
                object_key,
                location: None,
                parts: None,
                session_id,
                error: Some(error.to_string()),
            },
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn recording_error(e: RecordingError) -> ApiError {
    let (status, code) = match &e {
        RecordingError::AlreadyRecording => (StatusCode::CONFLICT, "ALREADY_RECORDING"),
        RecordingError::NotRecording => (StatusCode::CONFLICT, "NOT_RECORDING"),
        RecordingError::Capture(CaptureError::NoSupportedEncoding { .. }) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
        }
        RecordingError::Capture(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CAPTURE_ERROR"),
        RecordingError::Upload(UploadError::BackendUnavailable(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE")
        }
        RecordingError::Upload(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UPLOAD_ERROR"),
    };

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: code.to_string(),
        }),
    )
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/upload", post(upload_file))
        .route("/api/v1/progress", get(progress))
        .route("/api/v1/recordings/start", post(start_recording))
        .route("/api/v1/recordings/stop", post(stop_recording))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "livecast-uploader"
    }))
}

/// Store one uploaded file under its original name
#[instrument(skip(state, multipart))]
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<&'static str, (StatusCode, String)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let key = field
            .file_name()
            .and_then(object_key_from_file_name)
            .ok_or_else(|| (StatusCode::BAD_REQUEST, "Missing file name".to_string()))?;
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

        let location = state
            .backend
            .put_object(&key, body, &content_type)
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "Failed to store uploaded file");
                (StatusCode::BAD_GATEWAY, "Upload failed".to_string())
            })?;

        info!(key = %key, location = %location, "File uploaded");
        return Ok("Uploaded!");
    }

    Err((StatusCode::BAD_REQUEST, format!("Missing file field {UPLOAD_FIELD}")))
}

/// Last path segment of a client supplied file name
fn object_key_from_file_name(file_name: &str) -> Option<String> {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
}

async fn progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    let snapshot = state.controller.progress();
    Json(ProgressResponse {
        bytes_produced: snapshot.bytes_produced,
        bytes_uploaded: snapshot.bytes_uploaded,
        recording: state.controller.current().await,
        locations: state.controller.locations(),
    })
}

#[instrument(skip(state))]
async fn start_recording(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RecordingInfo>), ApiError> {
    let info = state.controller.start().await.map_err(|e| {
        error!(error = %e, "Failed to start recording");
        recording_error(e)
    })?;
    Ok((StatusCode::CREATED, Json(info)))
}

#[instrument(skip(state))]
async fn stop_recording(
    State(state): State<AppState>,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let outcome = state.controller.stop().await.map_err(recording_error)?;
    Ok(Json(outcome.into()))
}

/// Start the HTTP surface, serving until `shutdown` is cancelled
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting uploader API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server error")?;

    Ok(())
}
