use super::models::{Config, StorageProvider};
use super::sources::{
    ACCESS_KEY_VAR, BUCKET_VAR, GENERATION_API_KEY_VAR, REGION_VAR, SECRET_KEY_VAR,
};
use thiserror::Error;

/// Longest lifetime S3 accepts for a presigned link (7 days)
const MAX_LINK_TTL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required environment variables are not set: {}", .vars.join(", "))]
    MissingEnvironment { vars: Vec<String> },

    #[error("Storage bucket name must not be empty")]
    EmptyBucket,

    #[error("{field} must be positive")]
    NonPositive { field: &'static str },

    #[error("link_ttl_minutes must be between 1 and 10080, got {value}")]
    InvalidLinkTtl { value: u64 },

    #[error("Generation base_url must be an http(s) URL: {0}")]
    InvalidBaseUrl(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_environment(config)?;
    validate_storage(config)?;
    validate_generation(config)?;
    validate_pipeline(config)?;
    Ok(())
}

/// Production (S3) mode needs every credential; report them all at once
fn validate_environment(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider != StorageProvider::S3 {
        return Ok(());
    }

    let checks = [
        (GENERATION_API_KEY_VAR, config.generation.api_key.is_some()),
        (ACCESS_KEY_VAR, config.storage.access_key.is_some()),
        (SECRET_KEY_VAR, config.storage.secret_key.is_some()),
        (REGION_VAR, config.storage.region.is_some()),
        (
            BUCKET_VAR,
            config
                .storage
                .bucket
                .as_deref()
                .is_some_and(|bucket| !bucket.trim().is_empty()),
        ),
    ];

    let vars: Vec<String> = checks
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| {
            tracing::error!(var = *name, "Required environment variable is not set");
            name.to_string()
        })
        .collect();

    if vars.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingEnvironment { vars })
    }
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.bucket_name().trim().is_empty() {
        if config.storage.provider == StorageProvider::S3 {
            return Err(ValidationError::MissingEnvironment {
                vars: vec![BUCKET_VAR.to_string()],
            });
        }
        return Err(ValidationError::EmptyBucket);
    }

    let ttl = config.storage.link_ttl_minutes;
    if ttl == 0 || ttl > MAX_LINK_TTL_MINUTES {
        return Err(ValidationError::InvalidLinkTtl { value: ttl });
    }

    Ok(())
}

fn validate_generation(config: &Config) -> Result<(), ValidationError> {
    let base_url = &config.generation.base_url;
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ValidationError::InvalidBaseUrl(base_url.clone()));
    }

    if config.generation.poll_interval_ms == 0 {
        return Err(ValidationError::NonPositive {
            field: "generation.poll_interval_ms",
        });
    }
    if config.generation.default_timeout_secs == 0 {
        return Err(ValidationError::NonPositive {
            field: "generation.default_timeout_secs",
        });
    }

    Ok(())
}

fn validate_pipeline(config: &Config) -> Result<(), ValidationError> {
    let pipeline = &config.pipeline;

    let fields = [
        ("pipeline.upload_concurrency", pipeline.upload_concurrency as u64),
        ("pipeline.upload_timeout_secs", pipeline.upload_timeout_secs),
        ("pipeline.fetch_timeout_secs", pipeline.fetch_timeout_secs),
        ("pipeline.job_timeout_secs", pipeline.job_timeout_secs),
        ("pipeline.max_container_bytes", pipeline.max_container_bytes.as_u64()),
    ];

    for (field, value) in fields {
        if value == 0 {
            return Err(ValidationError::NonPositive { field });
        }
    }

    Ok(())
}
