use thiserror::Error;

use crate::extractor::ParseError;
use crate::fetcher::FetchError;
use crate::generation::GenerationError;
use crate::storage::{LinkError, UploadError};

/// Every way a pipeline operation can fail, one variant per stage
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("no textured mesh among the generation outputs")]
    NotFound,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "VALIDATION",
            PipelineError::Generation(_) => "GENERATION",
            PipelineError::NotFound => "NOT_FOUND",
            PipelineError::Fetch(_) => "FETCH",
            PipelineError::Parse(_) => "PARSE",
            PipelineError::Upload(_) => "UPLOAD",
            PipelineError::Link(_) => "LINK",
            PipelineError::Internal(_) => "INTERNAL",
        }
    }
}
