use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::cancel::CancellationRegistry;
use crate::error::{PullError, Result};
use crate::provider::PullProvider;
use crate::runner::PullRunner;
use crate::schema::{JobId, JobStatus};
use crate::store::JobStore;

/// Entry point for model pull jobs: start, poll, cancel.
///
/// None of these calls wait on a runner. `start_job` returns as soon as the
/// queued record is visible, and status reads only touch the job table.
pub struct PullJobs {
    store: Arc<JobStore>,
    cancels: Arc<CancellationRegistry>,
    provider: Arc<dyn PullProvider>,
    limiter: Option<Arc<Semaphore>>,
}

impl PullJobs {
    pub fn new(provider: Arc<dyn PullProvider>) -> Self {
        Self {
            store: Arc::new(JobStore::new()),
            cancels: Arc::new(CancellationRegistry::new()),
            provider,
            limiter: None,
        }
    }

    /// Bounds concurrently running pulls. `0` keeps the unbounded default.
    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.limiter = (max_active > 0).then(|| Arc::new(Semaphore::new(max_active)));
        self
    }

    pub async fn start_job(&self, model_name: &str) -> Result<JobId> {
        let (job_id, _task) = self.start_job_tracked(model_name).await?;
        Ok(job_id)
    }

    /// Same as [`start_job`](Self::start_job) but hands back the supervisor task.
    pub async fn start_job_tracked(&self, model_name: &str) -> Result<(JobId, JoinHandle<()>)> {
        let model_name = model_name.trim();
        if model_name.is_empty() {
            return Err(PullError::BadInput("modelName must be a non-empty string".to_string()));
        }

        let job_id = Uuid::new_v4();
        self.store
            .insert(JobStatus::queued(job_id, model_name, Utc::now()))
            .await;
        let token = self.cancels.register(job_id);

        info!(job_id=%job_id, model=%model_name, "pull: queued");

        let task = PullRunner {
            job_id,
            model_name: model_name.to_string(),
            store: self.store.clone(),
            cancels: self.cancels.clone(),
            provider: self.provider.clone(),
            token,
            limiter: self.limiter.clone(),
        }
        .spawn();

        Ok((job_id, task))
    }

    pub async fn get_status(&self, job_id: JobId) -> Result<JobStatus> {
        self.store.get(job_id).await.ok_or(PullError::NotFound(job_id))
    }

    /// Requests cooperative cancellation. False for unknown, terminal or
    /// already-canceling jobs; the record is left untouched in those cases.
    pub async fn cancel_job(&self, job_id: JobId) -> bool {
        let accepted = self
            .store
            .update(job_id, |j| j.request_cancel())
            .await
            .unwrap_or(false);
        if accepted {
            self.cancels.cancel(job_id);
            info!(job_id=%job_id, "pull: cancellation requested");
        }
        accepted
    }

    pub async fn list_jobs(&self) -> Vec<JobStatus> {
        self.store.list().await
    }

    pub async fn active_count(&self) -> usize {
        self.store.active_count().await
    }

    /// Removes terminal jobs that ended more than `retention` ago.
    pub async fn evict_finished(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let evicted = self.store.evict_finished_before(cutoff).await;
        for id in &evicted {
            info!(job_id=%id, "pull: evicted finished job");
        }
        evicted.len()
    }

    pub fn provider(&self) -> &Arc<dyn PullProvider> {
        &self.provider
    }

    /// True while a runner for `job_id` is alive and can still be signalled.
    pub fn has_cancel_flag(&self, job_id: JobId) -> bool {
        self.cancels.contains(job_id)
    }
}
