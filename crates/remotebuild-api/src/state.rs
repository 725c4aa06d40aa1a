//! Application state.

use std::sync::Arc;

use remotebuild_config::Config;
use remotebuild_scheduler::JobService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jobs: Arc<JobService>,
}

impl AppState {
    pub fn new(config: Arc<Config>, jobs: Arc<JobService>) -> Self {
        Self { config, jobs }
    }
}
