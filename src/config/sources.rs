use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "TEXBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/texbox.toml";
const ENV_PREFIX: &str = "TEXBOX";
const ENV_SEPARATOR: &str = "__";

pub const GENERATION_API_KEY_VAR: &str = "SYNEXA_API_KEY";
pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const REGION_VAR: &str = "AWS_DEFAULT_REGION";
pub const BUCKET_VAR: &str = "BUCKET_NAME";
pub const ENDPOINT_VAR: &str = "BUCKET_ENDPOINT_URL";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env is the normal case outside local development
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    apply_environment(&mut config, |name| env::var(name).ok());

    Ok(config)
}

/// Copy secrets and the well-known deployment variables into the config.
///
/// Secrets are never read from TOML. Empty values count as unset.
pub fn apply_environment<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(api_key) = var(GENERATION_API_KEY_VAR) {
        config.generation.api_key = Some(api_key);
    }
    if let Some(access_key) = var(ACCESS_KEY_VAR) {
        config.storage.access_key = Some(access_key);
    }
    if let Some(secret_key) = var(SECRET_KEY_VAR) {
        config.storage.secret_key = Some(secret_key);
    }
    if let Some(region) = var(REGION_VAR) {
        config.storage.region = Some(region);
    }
    if let Some(bucket) = var(BUCKET_VAR) {
        config.storage.bucket = Some(bucket);
    }

    // The AWS endpoint is picked from the region; only S3-compatible hosts need it spelled out
    if let Some(endpoint) = var(ENDPOINT_VAR) {
        if !endpoint.contains("s3.amazonaws.com") {
            config.storage.endpoint = Some(endpoint);
        }
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // TEXBOX__PIPELINE__UPLOAD_CONCURRENCY -> pipeline.upload_concurrency
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
