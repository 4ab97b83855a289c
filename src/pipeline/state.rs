//! Per-job lifecycle tracking

use std::fmt;

use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Generating,
    Fetching,
    Extracting,
    Uploading,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Generating => "generating",
            JobState::Fetching => "fetching",
            JobState::Extracting => "extracting",
            JobState::Uploading => "uploading",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Forward-only state holder for one `create` job
#[derive(Debug)]
pub struct JobTracker {
    job_id: Uuid,
    state: JobState,
}

impl JobTracker {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            state: JobState::Idle,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Move to `next`. Transitions out of a terminal state are ignored.
    pub fn advance(&mut self, next: JobState) {
        if self.state.is_terminal() {
            return;
        }
        debug!(job_id = %self.job_id, from = %self.state, to = %next, "Job state changed");
        self.state = next;
    }
}
