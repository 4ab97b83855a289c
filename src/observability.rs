//! Observability (metrics counters, tracing setup)

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber, honouring `RUST_LOG` (default `info`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Process-wide pipeline counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_created: AtomicU64,
    jobs_failed: AtomicU64,
    textures_uploaded: AtomicU64,
    upload_links_issued: AtomicU64,
    deletes_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_created(&self) {
        self.jobs_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_created", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn textures_uploaded(&self, count: usize) {
        self.textures_uploaded
            .fetch_add(count as u64, Ordering::Relaxed);
        tracing::debug!(counter = "textures_uploaded", count, "Metric incremented");
    }

    pub fn upload_link_issued(&self) {
        self.upload_links_issued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "upload_links_issued", "Metric incremented");
    }

    pub fn delete_failed(&self) {
        self.deletes_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "deletes_failed", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            textures_uploaded: self.textures_uploaded.load(Ordering::Relaxed),
            upload_links_issued: self.upload_links_issued.load(Ordering::Relaxed),
            deletes_failed: self.deletes_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_created: u64,
    pub jobs_failed: u64,
    pub textures_uploaded: u64,
    pub upload_links_issued: u64,
    pub deletes_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = Metrics::new();
        metrics.job_created();
        metrics.job_created();
        metrics.job_failed();
        metrics.textures_uploaded(3);
        metrics.delete_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_created, 2);
        assert_eq!(snapshot.jobs_failed, 1);
        assert_eq!(snapshot.textures_uploaded, 3);
        assert_eq!(snapshot.upload_links_issued, 0);
        assert_eq!(snapshot.deletes_failed, 1);
    }
}
