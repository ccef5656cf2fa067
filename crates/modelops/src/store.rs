use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::schema::{JobId, JobStatus};

/// In-memory job table for the process lifetime.
///
/// Every accessor takes the lock for one map operation and releases it before
/// returning, so no caller ever holds it across provider I/O.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobStatus>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: JobStatus) {
        self.jobs.write().await.insert(job.job_id, job);
    }

    pub async fn get(&self, id: JobId) -> Option<JobStatus> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Runs `f` on the record under the write lock. `None` if the job is unknown.
    pub async fn update<R, F: FnOnce(&mut JobStatus) -> R>(&self, id: JobId, f: F) -> Option<R> {
        self.jobs.write().await.get_mut(&id).map(f)
    }

    pub async fn list(&self) -> Vec<JobStatus> {
        let mut out: Vec<JobStatus> = self.jobs.read().await.values().cloned().collect();
        out.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        out
    }

    pub async fn active_count(&self) -> usize {
        self.jobs.read().await.values().filter(|j| !j.is_terminal()).count()
    }

    /// Drops terminal jobs that ended before `cutoff`. Active jobs are never evicted.
    pub async fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> Vec<JobId> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|j| j.is_terminal() && j.end_time.is_some_and(|end| end < cutoff))
            .map(|j| j.job_id)
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        expired
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}
