use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Main configuration for the transcoder service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    /// Elastic Transcoder job settings
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Pipeline that owns the input and output buckets
    pub pipeline_id: String,
    #[serde(default = "default_preset_id")]
    pub preset_id: String,
    /// Only objects with this extension are transcoded
    #[serde(default = "default_source_extension")]
    pub source_extension: String,
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_service_name() -> String {
    "livecast-transcoder".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

fn default_region() -> String {
    "ap-northeast-1".to_string()
}

fn default_preset_id() -> String {
    // System preset: Generic 720p
    "1351620000001-000010".to_string()
}

fn default_source_extension() -> String {
    "webm".to_string()
}

fn default_output_extension() -> String {
    "mp4".to_string()
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8081
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/transcoder").required(false))
            .add_source(config::File::with_name("/etc/livecast/transcoder").required(false))
            // TRANSCODER__TRANSCODER__PIPELINE_ID -> transcoder.pipeline_id
            .add_source(
                config::Environment::with_prefix("TRANSCODER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transcoder.pipeline_id.trim().is_empty() {
            return Err(ConfigError::Missing("transcoder.pipeline_id".to_string()));
        }

        for (key, value) in [
            ("transcoder.source_extension", &self.transcoder.source_extension),
            ("transcoder.output_extension", &self.transcoder.output_extension),
        ] {
            if value.is_empty() || value.contains(['.', '/']) {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    message: format!("{value:?} is not a bare file extension"),
                });
            }
        }

        if self.transcoder.source_extension == self.transcoder.output_extension {
            return Err(ConfigError::Invalid {
                key: "transcoder.output_extension".to_string(),
                message: "must differ from source_extension".to_string(),
            });
        }

        Ok(())
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

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}
