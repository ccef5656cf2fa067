//! Background task that drives one pull job to a terminal phase.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationRegistry;
use crate::progress::parse_chunk;
use crate::provider::PullProvider;
use crate::schema::{JobId, JobPhase};
use crate::store::JobStore;

pub(crate) struct PullRunner {
    pub job_id: JobId,
    pub model_name: String,
    pub store: Arc<JobStore>,
    pub cancels: Arc<CancellationRegistry>,
    pub provider: Arc<dyn PullProvider>,
    pub token: CancellationToken,
    pub limiter: Option<Arc<Semaphore>>,
}

impl PullRunner {
    /// Spawns the runner under a supervisor. The supervisor turns errors and
    /// panics of the runner body into a failed record and always drops the
    /// job's cancellation flag on the way out.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        let job_id = self.job_id;
        let store = self.store.clone();
        let cancels = self.cancels.clone();

        tokio::spawn(async move {
            let body = tokio::spawn(self.run());

            let failure = match body.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(join_err) => {
                    error!(job_id=%job_id, "pull: runner crashed: {join_err}");
                    Some(panic_message(join_err))
                }
            };

            if let Some(err) = failure {
                warn!(job_id=%job_id, error=%err, "pull: failed");
                store
                    .update(job_id, |j| j.fail("Pull failed", err, Utc::now()))
                    .await;
            }

            cancels.remove(job_id);
        })
    }

    async fn run(self) -> anyhow::Result<()> {
        let id = self.job_id;

        let _permit = match &self.limiter {
            Some(limiter) => {
                tokio::select! {
                    permit = limiter.clone().acquire_owned() => Some(permit.context("pull limiter closed")?),
                    _ = self.token.cancelled() => None,
                }
            }
            None => None,
        };

        if self.token.is_cancelled() {
            info!(job_id=%id, "pull: canceled before start");
            self.store.update(id, |j| j.mark_canceled(Utc::now())).await;
            return Ok(());
        }

        info!(job_id=%id, model=%self.model_name, "pull: opening stream");
        let opened = tokio::select! {
            res = self.provider.open_pull(&self.model_name) => Some(res),
            _ = self.token.cancelled() => None,
        };
        let mut stream = match opened {
            Some(Ok(stream)) => stream,
            None => {
                info!(job_id=%id, "pull: canceled while opening stream");
                self.store.update(id, |j| j.mark_canceled(Utc::now())).await;
                return Ok(());
            }
            Some(Err(e)) => {
                let err = format!("{e:#}");
                warn!(job_id=%id, error=%err, "pull: could not open stream");
                self.store
                    .update(id, |j| j.fail("Failed to start pull", err, Utc::now()))
                    .await;
                return Ok(());
            }
        };

        self.store.update(id, |j| j.begin("Pulling manifest...")).await;

        let mut last_phase = JobPhase::Parsing;
        while let Some(item) = stream.next().await {
            let chunk = item.context("pull stream failed")?;
            let update = parse_chunk(&chunk);
            let token = &self.token;

            let phase = self
                .store
                .update(id, |j| {
                    if token.is_cancelled() || j.phase == JobPhase::Canceling {
                        j.mark_canceled(Utc::now());
                    } else {
                        j.apply_update(update, Utc::now());
                    }
                    j.phase
                })
                .await;

            let Some(phase) = phase else {
                warn!(job_id=%id, "pull: job record disappeared, stopping");
                return Ok(());
            };

            if phase != last_phase {
                debug!(job_id=%id, phase=%phase, "pull: phase changed");
                last_phase = phase;
            }

            if phase.is_terminal() {
                // Canceled pulls stop reading here; the server may keep sending.
                info!(job_id=%id, phase=%phase, "pull: finished");
                return Ok(());
            }
        }

        let token = &self.token;
        let phase = self
            .store
            .update(id, |j| {
                if token.is_cancelled() {
                    j.mark_canceled(Utc::now());
                } else {
                    j.complete("Pull completed", Utc::now());
                }
                j.phase
            })
            .await;
        info!(job_id=%id, phase=?phase, "pull: stream ended");
        Ok(())
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "pull task was aborted".to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown error".to_string()
    }
}
