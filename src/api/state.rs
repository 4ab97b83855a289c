use std::sync::Arc;

use crate::config::Config;
use crate::observability::Metrics;
use crate::pipeline::PipelineOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Arc<PipelineOrchestrator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
            metrics,
        }
    }
}
