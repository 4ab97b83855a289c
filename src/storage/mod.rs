//! Blob storage gateway for extracted textures and client uploads
//! Uses Apache Arrow object_store crate for both storage and link signing

pub mod signer;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::signer::Signer;
use object_store::{ObjectStore, path::Path as StoragePath};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{StorageConfig, StorageProvider};
pub use signer::LocalSigner;

const DEFAULT_LINK_TTL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const MEMORY_ENDPOINT: &str = "http://storage.localhost";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    #[error("Cannot derive a key from url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key {0:?}")]
    InvalidKey(String),

    #[error("upload of {key} rejected: {source}")]
    Rejected {
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("signing download link for {key} failed: {source}")]
    Sign {
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("upload of {key} did not finish within {timeout:?}")]
    Timeout { key: String, timeout: Duration },
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid key {0:?}")]
    InvalidKey(String),

    #[error("signing upload link for {key} failed: {source}")]
    Sign {
        key: String,
        #[source]
        source: object_store::Error,
    },
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// How object URLs address the bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlStyle {
    /// `https://<bucket>.<host>/<key>`
    VirtualHosted,
    /// `https://<host>/<bucket>/<key>`
    PathStyle,
}

/// An uploaded object and its time-limited download link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Storage gateway wrapping an object store and a link signer
#[derive(Clone)]
pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
    signer: Arc<dyn Signer>,
    bucket: String,
    url_style: UrlStyle,
    link_ttl: Duration,
    upload_timeout: Duration,
}

impl std::fmt::Debug for StorageGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageGateway")
            .field("bucket", &self.bucket)
            .field("url_style", &self.url_style)
            .field("link_ttl", &self.link_ttl)
            .finish_non_exhaustive()
    }
}

impl StorageGateway {
    /// Create a gateway over any object_store backend and signer
    pub fn new(
        store: Arc<dyn ObjectStore>,
        signer: Arc<dyn Signer>,
        bucket: impl Into<String>,
        url_style: UrlStyle,
    ) -> Self {
        Self {
            store,
            signer,
            bucket: bucket.into(),
            url_style,
            link_ttl: DEFAULT_LINK_TTL,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    /// In-memory storage with locally signed links, for tests and development
    pub fn in_memory(bucket: &str, url_style: UrlStyle) -> Self {
        let endpoint = Url::parse(MEMORY_ENDPOINT).expect("static endpoint url is valid");
        Self::new(
            Arc::new(InMemory::new()),
            Arc::new(LocalSigner::new(endpoint, bucket, url_style)),
            bucket,
            url_style,
        )
    }

    /// Build the gateway described by the storage section of the config
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let url_style = if config.uses_virtual_hosted_style() {
            UrlStyle::VirtualHosted
        } else {
            UrlStyle::PathStyle
        };

        let gateway = match config.provider {
            StorageProvider::Memory => Self::in_memory(config.bucket_name(), url_style),
            StorageProvider::S3 => {
                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(config.bucket_name())
                    .with_virtual_hosted_style_request(url_style == UrlStyle::VirtualHosted);

                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }
                match (&config.access_key, &config.secret_key) {
                    (Some(access_key), Some(secret_key)) => {
                        builder = builder
                            .with_access_key_id(access_key)
                            .with_secret_access_key(secret_key);
                    }
                    _ => return Err(StorageError::Config("missing S3 credentials".into())),
                }

                let s3 = Arc::new(builder.build()?);
                Self::new(s3.clone(), s3, config.bucket_name(), url_style)
            }
        };

        Ok(gateway.with_link_ttl(config.link_ttl()))
    }

    pub fn with_link_ttl(mut self, ttl: Duration) -> Self {
        self.link_ttl = ttl;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn link_ttl(&self) -> Duration {
        self.link_ttl
    }

    /// Upload a local file under `key` and return a presigned download link
    pub async fn upload(&self, local_path: &Path, key: &str) -> std::result::Result<StoredObject, UploadError> {
        let path = parse_key(key).map_err(|_| UploadError::InvalidKey(key.to_string()))?;

        let data = tokio::fs::read(local_path)
            .await
            .map_err(|source| UploadError::Read {
                path: local_path.display().to_string(),
                source,
            })?;
        let size = data.len();

        tokio::time::timeout(self.upload_timeout, self.store.put(&path, data.into()))
            .await
            .map_err(|_| UploadError::Timeout {
                key: key.to_string(),
                timeout: self.upload_timeout,
            })?
            .map_err(|source| UploadError::Rejected {
                key: key.to_string(),
                source,
            })?;

        let url = self
            .signer
            .signed_url(Method::GET, &path, self.link_ttl)
            .await
            .map_err(|source| UploadError::Sign {
                key: key.to_string(),
                source,
            })?;

        tracing::info!(key, size, "Uploaded to storage");

        Ok(StoredObject {
            key: key.to_string(),
            url: url.to_string(),
            expires_at: chrono::Duration::from_std(self.link_ttl)
                .ok()
                .map(|ttl| Utc::now() + ttl),
        })
    }

    /// Presigned URL a third party can `PUT` the object to directly
    pub async fn issue_upload_link(&self, key: &str) -> std::result::Result<String, LinkError> {
        let path = parse_key(key).map_err(|_| LinkError::InvalidKey(key.to_string()))?;

        let url = self
            .signer
            .signed_url(Method::PUT, &path, self.link_ttl)
            .await
            .map_err(|source| LinkError::Sign {
                key: key.to_string(),
                source,
            })?;

        tracing::info!(key, "Issued upload link");
        Ok(url.to_string())
    }

    /// Delete `key`. Missing objects count as deleted; backend failures are
    /// logged and reported as `false`.
    pub async fn delete(&self, key: &str) -> bool {
        let path = match parse_key(key) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(key, error = %e, "Refusing to delete invalid key");
                return false;
            }
        };

        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {
                tracing::info!(key, "Deleted from storage");
                true
            }
            Err(e) => {
                tracing::error!(key, error = %e, "Failed to delete from storage");
                false
            }
        }
    }

    /// Delete the object a previously issued link points at
    pub async fn delete_by_url(&self, url: &str) -> bool {
        match self.key_from_url(url) {
            Ok(key) => self.delete(&key).await,
            Err(e) => {
                tracing::error!(url, error = %e, "Failed to derive key from url");
                false
            }
        }
    }

    /// Invert link construction: drop scheme, host and query, take the
    /// percent-decoded path minus a single leading `/` (and the bucket
    /// segment for path-style URLs).
    pub fn key_from_url(&self, url: &str) -> Result<String> {
        let invalid = |reason: &str| StorageError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
        let encoded = parsed.path().strip_prefix('/').unwrap_or(parsed.path());

        let encoded = match self.url_style {
            UrlStyle::VirtualHosted => encoded,
            UrlStyle::PathStyle => encoded
                .strip_prefix(self.bucket.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .ok_or_else(|| invalid("path does not start with the bucket"))?,
        };

        let path = StoragePath::from_url_path(encoded).map_err(|e| invalid(&e.to_string()))?;
        if path.as_ref().is_empty() {
            return Err(invalid("empty key"));
        }

        Ok(path.to_string())
    }

    /// Download from storage
    pub async fn download(&self, key: &str) -> Result<Bytes> {
        let path = parse_key(key)?;

        let result = self.store.get(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => other.into(),
        })?;
        let bytes = result.bytes().await?;

        tracing::debug!(key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes)
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = parse_key(key)?;

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_key(key: &str) -> Result<StoragePath> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    let path = StoragePath::parse(key).map_err(|_| StorageError::InvalidKey(key.to_string()))?;
    // parse() silently trims leading/trailing delimiters; such keys would not round-trip
    if path.as_ref() != key {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(path)
}
