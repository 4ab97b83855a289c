//! Configuration management for TexBox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use texbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `TEXBOX__<section>__<key>`
//!
//! Examples:
//! - `TEXBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `TEXBOX__STORAGE__PROVIDER=s3`
//! - `TEXBOX__PIPELINE__MAX_CONTAINER_BYTES=64MB`
//!
//! Credentials and deployment settings use their conventional names and are
//! never read from the file: `SYNEXA_API_KEY`, `AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY`, `AWS_DEFAULT_REGION`, `BUCKET_NAME` and the optional
//! `BUCKET_ENDPOINT_URL`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/texbox.toml`.
//! This can be overridden using the `TEXBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, GenerationConfig, PipelineConfig, ServerConfig, StorageConfig, StorageProvider,
    TextureDelivery,
};
pub use sources::apply_environment;
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Well-known credential variables (`SYNEXA_API_KEY`, `AWS_*`, `BUCKET_*`)
    /// 2. Environment variables (`TEXBOX__*`)
    /// 3. TOML file (default: `config/texbox.toml`)
    /// 4. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a required
    /// setting is missing or out of range.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        tracing::info!(
            provider = ?config.storage.provider,
            bucket = %config.storage.bucket_name(),
            "Configuration validated"
        );
        Ok(config)
    }

    /// Load configuration from a specific path, without reading credentials
    /// from the process environment
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[storage]\nbucket = \"dev-textures\"\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.storage.bucket_name(), "dev-textures");
        assert_eq!(config.storage.provider, StorageProvider::Memory);
    }

    #[test]
    fn test_s3_without_credentials_fails_validation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[storage]
provider = "s3"
bucket = "textures"
region = "us-east-1"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::MissingEnvironment { .. })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"

[storage]
provider = "memory"
bucket = "texbox-dev"
endpoint = "http://localhost:9000"
link_ttl_minutes = 30

[generation]
base_url = "http://localhost:7000"
model = "tencent/hunyuan3d-2"
poll_interval_ms = 500
default_timeout_secs = 120

[pipeline]
upload_concurrency = 2
upload_timeout_secs = 30
fetch_timeout_secs = 30
job_timeout_secs = 300
max_container_bytes = "32MB"
delivery = "storage"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert!(!config.storage.uses_virtual_hosted_style());
        assert_eq!(config.storage.link_ttl_minutes, 30);
        assert_eq!(config.generation.base_url, "http://localhost:7000");
        assert_eq!(config.pipeline.upload_concurrency, 2);
        assert_eq!(config.pipeline.max_container_bytes, ByteSize::mebibytes(32));
        assert_eq!(config.pipeline.delivery, TextureDelivery::Storage);
    }
}
