//! 3D generation API client
//!
//! The upstream service turns an image (plus optional caption) into a set of
//! output files; the one whose URL carries [`TEXTURED_MARKER`] is the textured
//! GLB the pipeline post-processes.

use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::GenerationConfig;

/// Substring identifying the fully textured mesh among the outputs
pub const TEXTURED_MARKER: &str = "textured_mesh";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("prediction {id} ended with status {status}: {message}")]
    Failed {
        id: String,
        status: String,
        message: String,
    },

    #[error("generation did not finish within {0:?}")]
    Timeout(Duration),

    #[error("generation API key is not configured")]
    MissingApiKey,
}

/// Input for one generation run
#[derive(Debug, Clone, Builder)]
pub struct GenerationRequest {
    #[builder(into)]
    pub image: String,
    #[builder(into, default)]
    pub prompt: String,
    pub timeout: Duration,
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Run the model and return the URLs of every output file
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>, GenerationError>;
}

/// First output whose URL marks it as the textured variant
pub fn select_textured_asset(outputs: &[String]) -> Option<&str> {
    outputs
        .iter()
        .map(String::as_str)
        .find(|url| url.contains(TEXTURED_MARKER))
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    model: &'a str,
    input: Value,
}

/// Synexa predictions API: create a prediction, then poll until it settles
#[derive(Debug, Clone)]
pub struct SynexaClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

impl SynexaClient {
    /// A missing API key is only reported when a generation is attempted, so
    /// local setups can still issue links and delete objects.
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            poll_interval: config.poll_interval(),
        })
    }

    fn model_input(request: &GenerationRequest) -> Value {
        json!({
            "seed": 1234,
            "image": request.image,
            "steps": 5,
            "caption": request.prompt,
            "shape_only": false,
            "guidance_scale": 5.5,
            "multiple_views": [],
            "check_box_rembg": true,
            "octree_resolution": "256",
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Prediction, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::MissingApiKey)?;
        let response = request
            .header("x-api-key", api_key)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Prediction>()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))
    }
}

#[async_trait]
impl GenerationClient for SynexaClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>, GenerationError> {
        let deadline = Instant::now() + request.timeout;

        let body = PredictionInput {
            model: &self.model,
            input: Self::model_input(request),
        };
        let mut prediction = self
            .send(
                self.client
                    .post(format!("{}/v1/predictions", self.base_url))
                    .json(&body),
            )
            .await?;

        info!(prediction = %prediction.id, "Prediction created");

        loop {
            match prediction.status.as_str() {
                "succeeded" => return Ok(output_urls(prediction.output.as_ref())),
                "failed" | "canceled" => {
                    return Err(GenerationError::Failed {
                        message: prediction
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "no error message".to_string()),
                        id: prediction.id,
                        status: prediction.status,
                    });
                }
                status => debug!(prediction = %prediction.id, status, "Prediction pending"),
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(GenerationError::Timeout(request.timeout));
            }
            tokio::time::sleep(self.poll_interval).await;

            let url = format!("{}/v1/predictions/{}", self.base_url, prediction.id);
            prediction = self.send(self.client.get(url)).await?;
        }
    }
}

/// Outputs come back either as a single URL or a list of URLs (or objects with `url`)
fn output_urls(output: Option<&Value>) -> Vec<String> {
    fn url_of(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map.get("url").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }

    match output {
        Some(Value::Array(items)) => items.iter().filter_map(url_of).collect(),
        Some(other) => url_of(other).into_iter().collect(),
        None => Vec::new(),
    }
}
