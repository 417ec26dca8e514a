use anyhow::{Context, Result};
use livecast_uploader::api::{start_api_server, AppState};
use livecast_uploader::{
    CommandCapture, Config, MultipartBackend, ProgressReporter, RecorderContext,
    RecordingController, RecordingError, S3Backend,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level, &config.service.log_format);

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        bucket = %config.s3.bucket,
        "Starting Livecast uploader"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    let backend: Arc<dyn MultipartBackend> = Arc::new(S3Backend::new(&config.s3).await);
    let capture = Arc::new(CommandCapture::new(&config.capture));

    if config.capture.commands.is_empty() {
        warn!("No capture commands configured, recordings cannot be started");
    }

    let controller = Arc::new(RecordingController::new(RecorderContext {
        backend: backend.clone(),
        capture,
        recorder: config.recorder.clone(),
        upload: config.upload.clone(),
        progress: ProgressReporter::new(),
    }));

    let shutdown = CancellationToken::new();

    let rotation_handle = config.recorder.rotate_interval().map(|period| {
        tokio::spawn(controller.clone().run_rotation(period, shutdown.clone()))
    });

    let api_state = AppState {
        controller: controller.clone(),
        backend,
    };
    let api_config = config.api.clone();
    let api_shutdown = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config, api_shutdown).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Uploader started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down uploader");
    shutdown.cancel();

    if let Some(handle) = rotation_handle {
        let _ = handle.await;
    }

    // Let an active recording flush and finalize before exiting
    match controller.stop().await {
        Ok(outcome) => info!(
            object_key = %outcome.object_key(),
            completed = outcome.is_completed(),
            "Active recording settled"
        ),
        Err(RecordingError::NotRecording) => {}
        Err(e) => warn!(error = %e, "Failed to stop active recording"),
    }

    let _ = api_handle.await;

    info!("Uploader stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, log_format: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
