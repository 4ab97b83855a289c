//! Action dispatch
//!
//! Every job, whether it arrives over HTTP or from the CLI, goes through
//! [`dispatch`]: the `action` field picks the pipeline operation, and the
//! result (or any failure, panics included) comes back as JSON.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::pipeline::{CreateRequest, PipelineError, PipelineOrchestrator};

/// Job input, tagged by `action`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum JobInput {
    #[serde(alias = "issue-upload-link")]
    Upload {
        #[serde(default, alias = "file_extension")]
        upload_file_extension: Option<String>,
    },
    Create {
        #[serde(default, alias = "image_reference")]
        image_path: Option<String>,
        #[serde(default)]
        prompt: Option<String>,
        /// Seconds
        #[serde(default, alias = "timeout_seconds")]
        timeout: Option<u64>,
    },
    Delete {
        #[serde(default)]
        keys: Option<Vec<String>>,
    },
}

impl JobInput {
    pub fn action(&self) -> &'static str {
        match self {
            JobInput::Upload { .. } => "upload",
            JobInput::Create { .. } => "create",
            JobInput::Delete { .. } => "delete",
        }
    }
}

/// Run one job and render its result. Never fails: errors become `{"error": ...}`.
pub async fn dispatch(orchestrator: Arc<PipelineOrchestrator>, input: Value) -> Value {
    let input: JobInput = match serde_json::from_value(input) {
        Ok(input) => input,
        Err(e) => return error_body(&format!("invalid input: {e}")),
    };
    let action = input.action();
    info!(action, "Dispatching job");

    // run on its own task so a panic inside the pipeline surfaces as a JoinError
    let handle = tokio::spawn(async move { run(&orchestrator, input).await });

    match handle.await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            error!(action, kind = e.kind(), error = %e, "Job failed");
            error_body(&format!("{action} failed: {e}"))
        }
        Err(e) => {
            let e = PipelineError::Internal(e.to_string());
            error!(action, error = %e, "Job aborted");
            error_body(&format!("{action} failed: {e}"))
        }
    }
}

async fn run(orchestrator: &PipelineOrchestrator, input: JobInput) -> Result<Value, PipelineError> {
    match input {
        JobInput::Upload {
            upload_file_extension,
        } => {
            let link = orchestrator
                .issue_upload_link(upload_file_extension.as_deref())
                .await?;
            to_value(&link)
        }
        JobInput::Create {
            image_path,
            prompt,
            timeout,
        } => {
            let outcome = orchestrator
                .create(CreateRequest {
                    image_reference: image_path,
                    prompt,
                    timeout: timeout.map(Duration::from_secs),
                })
                .await?;
            to_value(&outcome)
        }
        JobInput::Delete { keys } => {
            let keys = keys.ok_or_else(|| PipelineError::Validation("keys is required".to_string()))?;
            let report = orchestrator.delete(&keys).await;
            to_value(&report)
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, PipelineError> {
    serde_json::to_value(value).map_err(|e| PipelineError::Internal(e.to_string()))
}

fn error_body(message: &str) -> Value {
    json!({ "error": message })
}
