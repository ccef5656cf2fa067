use tokio::time::sleep;
use tracing::{debug, info};

use crate::state::SharedState;

/// Periodically drops finished pull jobs older than the retention window.
/// Returns immediately when retention is disabled.
pub async fn run_retention_sweeper(state: SharedState) {
    let retention = state.config.job_retention;
    if retention.is_zero() {
        info!("retention: disabled, finished jobs are kept");
        return;
    }

    let interval = state.config.sweep_interval;
    info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "retention: sweeper started"
    );

    loop {
        sleep(interval).await;
        sweep_once(&state).await;
    }
}

async fn sweep_once(state: &SharedState) -> usize {
    let evicted = state.pulls.evict_finished(state.config.job_retention).await;
    if evicted > 0 {
        info!(evicted, "retention: swept finished jobs");
    } else {
        debug!("retention: nothing to sweep");
    }
    evicted
}
