//! Inputs and results of the pipeline operations

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parameters of a `create` run
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// Image the generation service should model; required
    pub image_reference: Option<String>,
    pub prompt: Option<String>,
    /// Generation timeout; falls back to the configured default
    pub timeout: Option<Duration>,
}

/// A presigned `PUT` target for a client upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLink {
    pub upload_url: String,
    pub key: String,
}

/// An extracted texture as stored in the bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTexture {
    pub key: String,
    pub url: String,
}

/// An extracted texture returned by value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineTexture {
    pub filename: String,
    /// Base64 (standard alphabet) file contents
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeliveredTexture {
    Stored(StoredTexture),
    Inline(InlineTexture),
}

/// Result of a successful `create`; textures follow the container's image order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOutcome {
    pub container_url: String,
    pub textures: Vec<DeliveredTexture>,
}

/// Aggregate result of a `delete` batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    /// True only when every target was deleted
    pub deleted: bool,
    /// Targets that could not be deleted, in input order
    pub failures: Vec<String>,
}
