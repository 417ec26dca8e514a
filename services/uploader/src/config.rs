use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while validating a loaded configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Main configuration for the uploader service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Recording and chunking configuration
    #[serde(default)]
    pub recorder: RecorderConfig,
    /// Capture command configuration
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Part upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// HTTP surface configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (json or pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket receiving recordings
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Recording configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// Interval between recorder data events in milliseconds
    #[serde(default = "default_chunk_interval_ms")]
    pub chunk_interval_ms: u64,
    /// Leading token of every object key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Extension appended to object keys
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Recorder data is accumulated until a part reaches this size (0 = one part per event)
    #[serde(default = "default_min_part_size")]
    pub min_part_size_bytes: usize,
    /// Encodings to try in order; the empty string selects the capture default
    #[serde(default = "default_mime_candidates")]
    pub mime_candidates: Vec<String>,
    /// Stop and restart the recording on this period (0 = disabled)
    #[serde(default)]
    pub rotate_interval_secs: u64,
}

/// Capture commands keyed by the encoding they produce
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureConfig {
    /// Commands writing an encoded media stream to stdout
    #[serde(default)]
    pub commands: Vec<CaptureCommand>,
    /// Time allowed for a capture command to finalize after stop, in milliseconds
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

/// A single capture command
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureCommand {
    /// Encoding written by the command (e.g. "video/webm;codecs=vp9")
    pub mime_type: String,
    /// Program to execute
    pub program: String,
    /// Program arguments
    #[serde(default)]
    pub args: Vec<String>,
}

/// Part upload configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Timeout for a single part upload attempt in seconds (0 = no timeout)
    #[serde(default = "default_part_timeout_secs")]
    pub part_timeout_secs: u64,
    /// Retry policy for failed part uploads
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry policy for part uploads
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts per part after the first failure
    #[serde(default)]
    pub max_retries: u32,
    /// First backoff delay in milliseconds
    #[serde(default = "default_retry_initial_ms")]
    pub initial_interval_ms: u64,
    /// Upper bound on the backoff delay in milliseconds
    #[serde(default = "default_retry_max_ms")]
    pub max_interval_ms: u64,
}

/// HTTP surface configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Maximum accepted body size for the upload form in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "livecast-uploader".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_chunk_interval_ms() -> u64 {
    15_000
}

fn default_key_prefix() -> String {
    "videofile".to_string()
}

fn default_extension() -> String {
    "webm".to_string()
}

fn default_min_part_size() -> usize {
    5 * 1024 * 1024 // S3 minimum for non-final parts
}

fn default_mime_candidates() -> Vec<String> {
    vec![
        "video/webm;codecs=vp9".to_string(),
        "video/webm;codecs=vp8".to_string(),
        "video/webm".to_string(),
        String::new(),
    ]
}

fn default_stop_grace_ms() -> u64 {
    5_000
}

fn default_part_timeout_secs() -> u64 {
    300
}

fn default_retry_initial_ms() -> u64 {
    500
}

fn default_retry_max_ms() -> u64 {
    10_000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        Self::build(
            config::Config::builder()
                .add_source(config::File::with_name("config/uploader").required(false))
                .add_source(config::File::with_name("/etc/livecast/uploader").required(false)),
        )
    }

    /// Load configuration from an explicit file, still honouring the environment
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::build(
            config::Config::builder().add_source(config::File::from(path.as_ref()).required(true)),
        )
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> anyhow::Result<Self> {
        let config = builder
            .set_default("service.name", "livecast-uploader")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // UPLOADER__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("UPLOADER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3.bucket.trim().is_empty() {
            return Err(ConfigError::Missing("s3.bucket".to_string()));
        }

        if self.recorder.chunk_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "recorder.chunk_interval_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.recorder.mime_candidates.is_empty() {
            return Err(ConfigError::Invalid {
                key: "recorder.mime_candidates".to_string(),
                message: "at least one encoding is required".to_string(),
            });
        }

        let retry = &self.upload.retry;
        if retry.max_interval_ms < retry.initial_interval_ms {
            return Err(ConfigError::Invalid {
                key: "upload.retry.max_interval_ms".to_string(),
                message: format!(
                    "{} is smaller than initial_interval_ms {}",
                    retry.max_interval_ms, retry.initial_interval_ms
                ),
            });
        }

        Ok(())
    }
}

impl RecorderConfig {
    /// Get the recorder data interval as Duration
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    /// Get the rotation period, if rotation is enabled
    pub fn rotate_interval(&self) -> Option<Duration> {
        (self.rotate_interval_secs > 0).then(|| Duration::from_secs(self.rotate_interval_secs))
    }
}

impl CaptureConfig {
    /// Get the stop grace period as Duration
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl UploadConfig {
    /// Get the per-part timeout, if one is configured
    pub fn part_timeout(&self) -> Option<Duration> {
        (self.part_timeout_secs > 0).then(|| Duration::from_secs(self.part_timeout_secs))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            chunk_interval_ms: default_chunk_interval_ms(),
            key_prefix: default_key_prefix(),
            extension: default_extension(),
            min_part_size_bytes: default_min_part_size(),
            mime_candidates: default_mime_candidates(),
            rotate_interval_secs: 0,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_timeout_secs: default_part_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_interval_ms: default_retry_initial_ms(),
            max_interval_ms: default_retry_max_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            max_upload_bytes: default_max_upload_bytes(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}
