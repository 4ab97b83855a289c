//! Per-job temporary directories
//!
//! A [`JobWorkspace`] is a scoped guard: every workspace is removed exactly once,
//! either by an explicit [`JobWorkspace::release`] or, if the guard is dropped
//! first (cancellation, panic, early return), by its `Drop` impl. Removal
//! failures are logged and never surface as the job's result.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid workspace token: {0:?}")]
    InvalidToken(String),

    #[error("workspace {0} already exists")]
    Collision(PathBuf),

    #[error("failed to create workspace {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Removal failure; only ever logged
#[derive(Debug, Error)]
#[error("failed to remove workspace {path}: {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug)]
pub struct JobWorkspace {
    id: String,
    root_path: PathBuf,
    created_at: DateTime<Utc>,
    released: bool,
}

impl JobWorkspace {
    /// Create a workspace under `base` named by a fresh random token
    pub async fn acquire(base: &Path) -> Result<Self, WorkspaceError> {
        Self::acquire_named(base, &Uuid::new_v4().to_string()).await
    }

    /// Create a workspace under `base` for a caller-supplied token.
    ///
    /// The directory must not exist yet; two jobs never share one.
    pub async fn acquire_named(base: &Path, token: &str) -> Result<Self, WorkspaceError> {
        if !is_safe_segment(token) {
            return Err(WorkspaceError::InvalidToken(token.to_string()));
        }

        tokio::fs::create_dir_all(base)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: base.to_path_buf(),
                source,
            })?;

        let root_path = base.join(token);
        match tokio::fs::create_dir(&root_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::Collision(root_path));
            }
            Err(source) => {
                return Err(WorkspaceError::Create {
                    path: root_path,
                    source,
                });
            }
        }

        debug!(workspace = token, path = %root_path.display(), "Workspace acquired");

        Ok(Self {
            id: token.to_string(),
            root_path,
            created_at: Utc::now(),
            released: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Path of a file directly inside the workspace
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.root_path.join(filename)
    }

    /// Recursively remove the workspace. Never fails.
    pub async fn release(mut self) {
        self.released = true;
        let path = self.root_path.clone();

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => debug!(workspace = %self.id, "Workspace released"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(workspace = %self.id, "Workspace already gone");
            }
            Err(source) => {
                let err = CleanupError { path, source };
                warn!(workspace = %self.id, error = %err, "Workspace cleanup failed");
            }
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match std::fs::remove_dir_all(&self.root_path) {
            Ok(()) => debug!(workspace = %self.id, "Workspace released on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                let err = CleanupError {
                    path: self.root_path.clone(),
                    source,
                };
                warn!(workspace = %self.id, error = %err, "Workspace cleanup on drop failed");
            }
        }
    }
}

/// A single, non-empty path component with no separators or dot-dot tricks
pub(crate) fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}
