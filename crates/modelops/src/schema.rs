use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::progress::ProgressUpdate;

pub type JobId = Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Queued,
    Parsing,
    Downloading,
    Verifying,
    Completed,
    Failed,
    Canceling,
    Canceled,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed | JobPhase::Canceled)
    }

    /// Position along queued -> parsing -> downloading -> verifying. Terminal
    /// and cancel phases sit above every progress phase.
    fn rank(self) -> u8 {
        match self {
            JobPhase::Queued => 0,
            JobPhase::Parsing => 1,
            JobPhase::Downloading => 2,
            JobPhase::Verifying => 3,
            JobPhase::Canceling => 4,
            JobPhase::Completed | JobPhase::Failed | JobPhase::Canceled => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobPhase::Queued => "queued",
            JobPhase::Parsing => "parsing",
            JobPhase::Downloading => "downloading",
            JobPhase::Verifying => "verifying",
            JobPhase::Completed => "completed",
            JobPhase::Failed => "failed",
            JobPhase::Canceling => "canceling",
            JobPhase::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress record as emitted by the model server's pull stream.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressChunk {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
}

impl ProgressChunk {
    pub fn status(status: impl Into<String>) -> Self {
        Self { status: status.into(), ..Self::default() }
    }

    pub fn bytes(status: impl Into<String>, completed: u64, total: u64) -> Self {
        Self {
            status: status.into(),
            completed: Some(completed),
            total: Some(total),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    pub model_name: String,
    pub phase: JobPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_layer: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    pub fn queued(job_id: JobId, model_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            model_name: model_name.into(),
            phase: JobPhase::Queued,
            message: "Job queued".to_string(),
            percent: None,
            completed_bytes: None,
            total_bytes: None,
            current_layer: None,
            start_time: now,
            end_time: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Queued -> parsing, before the first chunk arrives. No-op in any other phase.
    pub fn begin(&mut self, message: impl Into<String>) -> bool {
        if self.phase != JobPhase::Queued {
            return false;
        }
        self.phase = JobPhase::Parsing;
        self.message = message.into();
        true
    }

    /// Merges one parsed chunk. Phase never moves backwards, percent never
    /// decreases, and unset fields in the update leave stored values alone.
    /// Returns false when the record is terminal or canceling and was left untouched.
    pub fn apply_update(&mut self, update: ProgressUpdate, now: DateTime<Utc>) -> bool {
        if self.is_terminal() || self.phase == JobPhase::Canceling {
            return false;
        }

        if let Some(p) = update.percent {
            self.percent = Some(self.percent.map_or(p, |cur| cur.max(p)));
        }
        if update.completed_bytes.is_some() {
            self.completed_bytes = update.completed_bytes;
        }
        if update.total_bytes.is_some() {
            self.total_bytes = update.total_bytes;
        }
        if update.current_layer.is_some() {
            self.current_layer = update.current_layer;
        }

        match update.phase {
            JobPhase::Completed => self.complete(update.message, now),
            JobPhase::Failed => {
                let error = update.error.unwrap_or_else(|| update.message.clone());
                self.fail(update.message, error, now)
            }
            phase => {
                if phase.rank() >= self.phase.rank() {
                    self.phase = phase;
                }
                self.message = update.message;
            }
        }
        true
    }

    /// Optimistic cancel marker. Refused for terminal and already-canceling jobs.
    pub fn request_cancel(&mut self) -> bool {
        if self.is_terminal() || self.phase == JobPhase::Canceling {
            return false;
        }
        self.phase = JobPhase::Canceling;
        self.message = "Cancellation requested".to_string();
        true
    }

    pub fn complete(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        if self.phase == JobPhase::Canceling {
            return self.mark_canceled(now);
        }
        if self.finish(JobPhase::Completed, message.into(), None, now) {
            self.percent = Some(100);
        }
    }

    pub fn fail(&mut self, message: impl Into<String>, error: impl Into<String>, now: DateTime<Utc>) {
        if self.phase == JobPhase::Canceling {
            return self.mark_canceled(now);
        }
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        self.finish(JobPhase::Failed, message.into(), Some(error), now);
    }

    pub fn mark_canceled(&mut self, now: DateTime<Utc>) {
        self.finish(JobPhase::Canceled, "Pull canceled by user".to_string(), None, now);
    }

    fn finish(
        &mut self,
        phase: JobPhase,
        message: String,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.phase = phase;
        self.message = message;
        self.error = error;
        self.end_time = Some(now);
        true
    }
}
