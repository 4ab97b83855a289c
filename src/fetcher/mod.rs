//! Asset container retrieval
//!
//! Container URLs follow a load-bearing naming convention: the last path
//! segment is `<workspace-token>_<filename>`, split on the *first* underscore.
//! The token names the job's workspace directory and the remainder is the
//! local filename.
//!
//! ```text
//! https://cdn.example.com/out/e9d16206-de03-4dbc-97d7-6a17c4c86e1e_textured_mesh.glb
//!                             └────────────── token ─────────────┘ └─ filename ─────┘
//! ```

pub mod http;

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;
use tracing::{info, warn};

use crate::workspace::{JobWorkspace, WorkspaceError, is_safe_segment};
pub use http::{DownloadError, HttpClient, HttpConfig};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid asset url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("asset name {0:?} does not follow the <token>_<filename> convention")]
    MalformedName(String),

    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: DownloadError,
    },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fetch did not finish within {0:?}")]
    Timeout(Duration),
}

/// `<token>_<filename>` split out of a container URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetName {
    pub token: String,
    pub filename: String,
}

impl AssetName {
    /// Split the final path segment of `url` on its first underscore.
    ///
    /// Query and fragment are not part of the name.
    pub fn from_url(url: &str) -> Result<Self, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let basename = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();

        Self::from_basename(basename)
    }

    pub fn from_basename(basename: &str) -> Result<Self, FetchError> {
        let malformed = || FetchError::MalformedName(basename.to_string());

        let (token, filename) = basename.split_once('_').ok_or_else(malformed)?;
        if !is_safe_segment(token) || !is_safe_segment(filename) {
            return Err(malformed());
        }

        Ok(Self {
            token: token.to_string(),
            filename: filename.to_string(),
        })
    }
}

/// A downloaded container, valid for as long as its workspace lives
#[derive(Debug, Clone)]
pub struct AssetContainerRef {
    pub source_url: String,
    pub local_path: PathBuf,
    pub declared_filename: String,
}

/// Result of a successful fetch; the caller owns (and must release) the workspace
#[derive(Debug)]
pub struct FetchedAsset {
    pub workspace: JobWorkspace,
    pub container: AssetContainerRef,
}

#[derive(Debug, Clone)]
pub struct AssetFetcher {
    http: HttpClient,
    workspace_root: PathBuf,
}

impl AssetFetcher {
    pub fn new(http: HttpClient, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            http,
            workspace_root: workspace_root.into(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Download `url` into a fresh workspace named after the URL's token.
    ///
    /// The name is validated before anything touches the disk, and the
    /// workspace is released again if the download fails.
    pub async fn fetch(&self, url: &str) -> Result<FetchedAsset, FetchError> {
        let name = AssetName::from_url(url)?;
        let workspace = JobWorkspace::acquire_named(&self.workspace_root, &name.token).await?;

        match self.download_into(url, &workspace, &name.filename).await {
            Ok(local_path) => {
                info!(workspace = %name.token, file = %name.filename, "Asset container fetched");
                Ok(FetchedAsset {
                    workspace,
                    container: AssetContainerRef {
                        source_url: url.to_string(),
                        local_path,
                        declared_filename: name.filename,
                    },
                })
            }
            Err(e) => {
                warn!(url, error = %e, "Asset fetch failed");
                workspace.release().await;
                Err(e)
            }
        }
    }

    async fn download_into(
        &self,
        url: &str,
        workspace: &JobWorkspace,
        filename: &str,
    ) -> Result<PathBuf, FetchError> {
        let bytes = self
            .http
            .download(url)
            .await
            .map_err(|source| FetchError::Download {
                url: url.to_string(),
                source,
            })?;

        let path = workspace.file_path(filename);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|source| FetchError::Write {
                path: path.clone(),
                source,
            })?;

        Ok(path)
    }
}
