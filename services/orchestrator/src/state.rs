use std::sync::Arc;

use modelops::PullJobs;

use crate::config::AppConfig;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pulls: Arc<PullJobs>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(pulls: PullJobs, config: AppConfig) -> Self {
        Self {
            pulls: Arc::new(pulls),
            config,
        }
    }
}
