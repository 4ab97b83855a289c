//! HTTP models for the TexBox job endpoint.
//!
//! `POST /run` takes a job envelope and answers with the job's output:
//!
//! ```json
//! { "input": { "action": "create", "image_path": "img/cat.png", "prompt": "toy cat", "timeout": 120 } }
//! ```
//!
//! ```json
//! { "output": { "container_url": "https://...", "textures": [{ "key": "...", "url": "..." }] } }
//! ```
//!
//! Job-level failures are still `200 OK` with `{"output": {"error": "..."}}`;
//! only malformed envelopes are rejected with an [`ErrorResponse`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::observability::MetricsSnapshot;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RunRequest {
    pub input: Value,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RunResponse {
    pub output: Value,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub metrics: MetricsSnapshot,
}
