use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    S3,
    #[default]
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Required in `s3` mode; `memory` mode falls back to [`LOCAL_BUCKET`]
    #[serde(default)]
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...)
    pub endpoint: Option<String>,
    /// Address objects as `https://<bucket>.<host>/<key>` instead of `https://<host>/<bucket>/<key>`
    #[serde(default)]
    pub virtual_hosted: Option<bool>,
    /// Lifetime of presigned download and upload links
    #[serde(default = "default_link_ttl_minutes")]
    pub link_ttl_minutes: u64,
    /// Loaded from environment, never from the config file
    #[serde(skip)]
    pub access_key: Option<String>,
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl StorageConfig {
    pub fn bucket_name(&self) -> &str {
        self.bucket.as_deref().unwrap_or(LOCAL_BUCKET)
    }

    pub fn link_ttl(&self) -> Duration {
        Duration::from_secs(self.link_ttl_minutes * 60)
    }

    /// AWS proper defaults to virtual-hosted URLs; custom endpoints to path-style.
    pub fn uses_virtual_hosted_style(&self) -> bool {
        self.virtual_hosted.unwrap_or(self.endpoint.is_none())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            bucket: None,
            region: None,
            endpoint: None,
            virtual_hosted: None,
            link_ttl_minutes: default_link_ttl_minutes(),
            access_key: None,
            secret_key: None,
        }
    }
}

/// Bucket name used by the in-memory provider when none is configured
pub const LOCAL_BUCKET: &str = "texbox-local";

fn default_link_ttl_minutes() -> u64 {
    60
}

/// 3D generation API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Used when a create request carries no `timeout`
    #[serde(default = "default_generation_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl GenerationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            poll_interval_ms: default_poll_interval_ms(),
            default_timeout_secs: default_generation_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_generation_base_url() -> String {
    "https://api.synexa.ai".to_string()
}

fn default_generation_model() -> String {
    "tencent/hunyuan3d-2".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_generation_timeout_secs() -> u64 {
    300
}

/// How `create` hands extracted textures back to the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureDelivery {
    /// Upload to storage and return presigned links
    #[default]
    Storage,
    /// Return base64-encoded bytes inline, nothing is uploaded
    Inline,
}

/// Pipeline tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    #[serde(default = "default_max_container_bytes")]
    pub max_container_bytes: ByteSize,
    #[serde(default = "default_rollback_on_failure")]
    pub rollback_on_failure: bool,
    #[serde(default)]
    pub delivery: TextureDelivery,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            upload_concurrency: default_upload_concurrency(),
            upload_timeout_secs: default_upload_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            job_timeout_secs: default_job_timeout_secs(),
            max_container_bytes: default_max_container_bytes(),
            rollback_on_failure: default_rollback_on_failure(),
            delivery: TextureDelivery::default(),
        }
    }
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("texbox")
}

fn default_upload_concurrency() -> usize {
    4
}

fn default_upload_timeout_secs() -> u64 {
    120
}

fn default_fetch_timeout_secs() -> u64 {
    120
}

fn default_job_timeout_secs() -> u64 {
    600
}

fn default_max_container_bytes() -> ByteSize {
    ByteSize::mebibytes(256)
}

fn default_rollback_on_failure() -> bool {
    true
}
