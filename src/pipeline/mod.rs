//! Pipeline orchestration
//!
//! Composes generation, fetch, extraction and storage into the three
//! operations callers see: issuing upload links, creating textures from an
//! image, and deleting stored objects.
//!
//! A `create` job moves `Idle → Generating → Fetching → Extracting →
//! Uploading → Done | Failed`. Once the container has been fetched, its
//! workspace is released before the job reaches either terminal state,
//! whatever happened in between.

pub mod error;
pub mod models;
pub mod state;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bon::Builder;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{Config, TextureDelivery};
use crate::extractor::{ExtractedTexture, ParseError, TextureExtractor};
use crate::fetcher::{AssetContainerRef, AssetFetcher, FetchError, FetchedAsset};
use crate::generation::{GenerationClient, GenerationError, GenerationRequest, select_textured_asset};
use crate::observability::Metrics;
use crate::storage::{StorageGateway, StoredObject, UploadError};

pub use error::PipelineError;
pub use models::{
    CreateOutcome, CreateRequest, DeleteReport, DeliveredTexture, InlineTexture, StoredTexture,
    UploadLink,
};
pub use state::{JobState, JobTracker};

/// Extension used when the caller does not declare one
pub const DEFAULT_UPLOAD_EXTENSION: &str = ".png";

/// Orchestrator tuning
#[derive(Debug, Clone, Builder)]
pub struct PipelineOptions {
    /// Maximum uploads in flight for one job
    #[builder(default = 4)]
    pub upload_concurrency: usize,
    /// Budget for a whole `create` job, generation included
    #[builder(default = Duration::from_secs(600))]
    pub job_timeout: Duration,
    /// Generation timeout when the request does not carry one
    #[builder(default = Duration::from_secs(300))]
    pub generation_timeout: Duration,
    #[builder(default = Duration::from_secs(120))]
    pub fetch_timeout: Duration,
    /// Delete already-uploaded textures when a later upload fails
    #[builder(default = true)]
    pub rollback_on_failure: bool,
    /// Budget for the compensating deletes; whatever is left afterwards stays orphaned
    #[builder(default = Duration::from_secs(30))]
    pub rollback_timeout: Duration,
    #[builder(default)]
    pub delivery: TextureDelivery,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self::builder()
            .upload_concurrency(config.pipeline.upload_concurrency)
            .job_timeout(Duration::from_secs(config.pipeline.job_timeout_secs))
            .generation_timeout(config.generation.default_timeout())
            .fetch_timeout(Duration::from_secs(config.pipeline.fetch_timeout_secs))
            .rollback_on_failure(config.pipeline.rollback_on_failure)
            .rollback_timeout(Duration::from_secs(config.pipeline.upload_timeout_secs))
            .delivery(config.pipeline.delivery)
            .build()
    }
}

/// Absolute end of a job's time budget
#[derive(Debug, Clone, Copy)]
struct Deadline(Instant);

impl Deadline {
    fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// `stage` budget, shortened to whatever is left of the job
    fn cap(&self, stage: Duration) -> Duration {
        stage.min(self.remaining())
    }
}

pub struct PipelineOrchestrator {
    storage: Arc<StorageGateway>,
    generator: Arc<dyn GenerationClient>,
    fetcher: AssetFetcher,
    extractor: TextureExtractor,
    options: PipelineOptions,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("storage", &self.storage)
            .field("fetcher", &self.fetcher)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    pub fn new(
        storage: Arc<StorageGateway>,
        generator: Arc<dyn GenerationClient>,
        fetcher: AssetFetcher,
        options: PipelineOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            storage,
            generator,
            fetcher,
            extractor: TextureExtractor::new(),
            options,
            metrics,
        }
    }

    pub fn storage(&self) -> &StorageGateway {
        &self.storage
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Reserve a fresh key and return a presigned `PUT` link for it
    pub async fn issue_upload_link(
        &self,
        file_extension: Option<&str>,
    ) -> Result<UploadLink, PipelineError> {
        let extension = normalize_extension(file_extension)?;
        let key = format!("{}{}", Uuid::new_v4(), extension);

        let upload_url = self.storage.issue_upload_link(&key).await?;
        self.metrics.upload_link_issued();

        Ok(UploadLink { upload_url, key })
    }

    /// Generate a textured mesh from an image and deliver its embedded textures
    pub async fn create(&self, request: CreateRequest) -> Result<CreateOutcome, PipelineError> {
        let image = request
            .image_reference
            .as_deref()
            .map(str::trim)
            .filter(|image| !image.is_empty())
            .ok_or_else(|| PipelineError::Validation("image_path is required".to_string()))?;

        let timeout = request.timeout.unwrap_or(self.options.generation_timeout);
        if timeout.is_zero() {
            return Err(PipelineError::Validation(
                "timeout must be a positive number of seconds".to_string(),
            ));
        }

        let generation = GenerationRequest::builder()
            .image(image)
            .prompt(request.prompt.unwrap_or_default())
            .timeout(timeout)
            .build();

        let mut tracker = JobTracker::new(Uuid::new_v4());
        let span = info_span!("create", job_id = %tracker.job_id());

        async move {
            info!(image = %generation.image, "Job started");
            let deadline = Deadline::after(self.options.job_timeout);
            let result = self.run_create(&mut tracker, &deadline, generation).await;

            match &result {
                Ok(outcome) => {
                    tracker.advance(JobState::Done);
                    self.metrics.job_created();
                    info!(textures = outcome.textures.len(), "Job finished");
                }
                Err(e) => {
                    tracker.advance(JobState::Failed);
                    self.metrics.job_failed();
                    error!(kind = e.kind(), error = %e, "Job failed");
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn run_create(
        &self,
        tracker: &mut JobTracker,
        deadline: &Deadline,
        request: GenerationRequest,
    ) -> Result<CreateOutcome, PipelineError> {
        tracker.advance(JobState::Generating);
        let budget = deadline.cap(request.timeout);
        let request = GenerationRequest {
            timeout: budget,
            ..request
        };
        let outputs = tokio::time::timeout(budget, self.generator.generate(&request))
            .await
            .map_err(|_| GenerationError::Timeout(budget))??;

        let container_url = select_textured_asset(&outputs)
            .ok_or(PipelineError::NotFound)?
            .to_string();
        info!(url = %container_url, outputs = outputs.len(), "Textured mesh selected");

        tracker.advance(JobState::Fetching);
        let budget = deadline.cap(self.options.fetch_timeout);
        // a fetch cut short drops its workspace guard, which removes the directory
        let FetchedAsset {
            workspace,
            container,
        } = tokio::time::timeout(budget, self.fetcher.fetch(&container_url))
            .await
            .map_err(|_| FetchError::Timeout(budget))??;

        let mut written = Vec::new();
        let delivered = self.deliver(tracker, deadline, &container, &mut written).await;
        workspace.release().await;

        if delivered.is_err() && self.options.rollback_on_failure && !written.is_empty() {
            self.roll_back(&written).await;
        }

        Ok(CreateOutcome {
            container_url,
            textures: delivered?,
        })
    }

    async fn deliver(
        &self,
        tracker: &mut JobTracker,
        deadline: &Deadline,
        container: &AssetContainerRef,
        written: &mut Vec<String>,
    ) -> Result<Vec<DeliveredTexture>, PipelineError> {
        tracker.advance(JobState::Extracting);
        let budget = deadline.remaining();
        let textures = tokio::time::timeout(budget, self.extractor.extract(container))
            .await
            .map_err(|_| ParseError::Timeout(budget))??;

        tracker.advance(JobState::Uploading);
        match self.options.delivery {
            TextureDelivery::Storage => {
                let keys: Vec<String> = textures
                    .iter()
                    .map(|texture| format!("{}{}", Uuid::new_v4(), texture.extension()))
                    .collect();
                written.extend(keys.iter().cloned());
                self.upload_textures(textures, keys, deadline).await
            }
            TextureDelivery::Inline => encode_inline(&textures).await,
        }
    }

    /// Upload every texture under the matching key with bounded concurrency.
    ///
    /// Results keep extraction order. After the first failure no further
    /// uploads start; those already running are allowed to finish. When the
    /// job deadline passes, running uploads are aborted.
    async fn upload_textures(
        &self,
        textures: Vec<ExtractedTexture>,
        keys: Vec<String>,
        deadline: &Deadline,
    ) -> Result<Vec<DeliveredTexture>, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.options.upload_concurrency.max(1)));
        let aborted = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        for (slot, (texture, key)) in textures.into_iter().zip(keys.iter().cloned()).enumerate() {
            let storage = Arc::clone(&self.storage);
            let semaphore = Arc::clone(&semaphore);
            let aborted = Arc::clone(&aborted);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (slot, None);
                };
                if aborted.load(Ordering::Acquire) {
                    return (slot, None);
                }

                let result = storage.upload(&texture.local_path, &key).await;
                if result.is_err() {
                    aborted.store(true, Ordering::Release);
                }
                (slot, Some(result))
            });
        }

        let mut stored: Vec<Option<StoredObject>> = vec![None; keys.len()];
        let mut failure: Option<PipelineError> = None;

        loop {
            match tokio::time::timeout_at(deadline.0, tasks.join_next()).await {
                Ok(Some(Ok((slot, Some(Ok(object)))))) => stored[slot] = Some(object),
                Ok(Some(Ok((_, Some(Err(e)))))) => {
                    warn!(error = %e, "Texture upload failed");
                    failure.get_or_insert(e.into());
                }
                Ok(Some(Ok((_, None)))) => {}
                Ok(Some(Err(e))) => {
                    aborted.store(true, Ordering::Release);
                    failure.get_or_insert(PipelineError::Internal(format!("upload task failed: {e}")));
                }
                Ok(None) => break,
                Err(_) => {
                    let pending = stored
                        .iter()
                        .position(Option::is_none)
                        .and_then(|slot| keys.get(slot))
                        .cloned()
                        .unwrap_or_default();
                    failure.get_or_insert(
                        UploadError::Timeout {
                            key: pending,
                            timeout: self.options.job_timeout,
                        }
                        .into(),
                    );
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let stored = stored
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| PipelineError::Internal("upload result missing".to_string()))?;

        self.metrics.textures_uploaded(stored.len());

        Ok(stored
            .into_iter()
            .map(|object| {
                DeliveredTexture::Stored(StoredTexture {
                    key: object.key,
                    url: object.url,
                })
            })
            .collect())
    }

    /// Compensating deletes for an aborted upload batch.
    ///
    /// Runs with the upload concurrency limit and gives up after
    /// `rollback_timeout`. Keys not confirmed deleted are only logged.
    async fn roll_back(&self, keys: &[String]) {
        let semaphore = Arc::new(Semaphore::new(self.options.upload_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for key in keys.iter().cloned() {
            let storage = Arc::clone(&self.storage);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (key, false);
                };
                let deleted = storage.delete(&key).await;
                (key, deleted)
            });
        }

        let mut removed = HashSet::new();
        let drained = tokio::time::timeout(self.options.rollback_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Ok((key, true)) = joined {
                    removed.insert(key);
                }
            }
        })
        .await;
        tasks.abort_all();

        let orphaned: Vec<&String> = keys.iter().filter(|key| !removed.contains(*key)).collect();
        for key in &orphaned {
            warn!(key = %key, "Rollback did not delete object, left orphaned");
        }
        info!(
            attempted = keys.len(),
            orphaned = orphaned.len(),
            timed_out = drained.is_err(),
            "Rolled back partial upload"
        );
    }

    /// Delete each target independently. Targets starting with `http://` or
    /// `https://` are treated as links to stored objects, anything else as a key.
    pub async fn delete(&self, targets: &[String]) -> DeleteReport {
        let mut failures = Vec::new();

        for target in targets {
            let deleted = if is_url(target) {
                self.storage.delete_by_url(target).await
            } else {
                self.storage.delete(target).await
            };

            if !deleted {
                self.metrics.delete_failed();
                failures.push(target.clone());
            }
        }

        info!(
            requested = targets.len(),
            failed = failures.len(),
            "Delete batch finished"
        );

        DeleteReport {
            deleted: failures.is_empty(),
            failures,
        }
    }
}

fn is_url(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

/// Normalize a declared extension to `.ext`; `None` means [`DEFAULT_UPLOAD_EXTENSION`]
pub fn normalize_extension(extension: Option<&str>) -> Result<String, PipelineError> {
    let Some(extension) = extension else {
        return Ok(DEFAULT_UPLOAD_EXTENSION.to_string());
    };

    let bare = extension.trim().trim_start_matches('.');
    if bare.is_empty() {
        return Err(PipelineError::Validation(format!(
            "file extension {extension:?} is empty"
        )));
    }
    if !bare
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(PipelineError::Validation(format!(
            "file extension {extension:?} contains invalid characters"
        )));
    }

    Ok(format!(".{bare}"))
}

async fn encode_inline(textures: &[ExtractedTexture]) -> Result<Vec<DeliveredTexture>, PipelineError> {
    let mut delivered = Vec::with_capacity(textures.len());
    for texture in textures {
        let bytes = read_texture(&texture.local_path).await?;
        delivered.push(DeliveredTexture::Inline(InlineTexture {
            filename: texture.filename.clone(),
            data: BASE64.encode(bytes),
        }));
    }
    Ok(delivered)
}

async fn read_texture(path: &Path) -> Result<Vec<u8>, ParseError> {
    tokio::fs::read(path).await.map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })
}
