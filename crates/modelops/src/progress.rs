//! Classification of raw pull-stream chunks into job phases.

use crate::schema::{JobPhase, ProgressChunk};

/// Ordered status table. Matching is a case-insensitive substring test and the
/// first hit wins, so "error" stays below the more specific verifying entries.
pub const PHASE_RULES: &[(&str, JobPhase)] = &[
    ("pulling manifest", JobPhase::Parsing),
    ("verifying sha256 digest", JobPhase::Verifying),
    ("writing manifest", JobPhase::Verifying),
    ("removing any unused layers", JobPhase::Verifying),
    ("success", JobPhase::Completed),
    ("error", JobPhase::Failed),
];

const LAYER_TAG_LEN: usize = 12;

/// Normalized view of one chunk. `None` fields mean "not reported", never "clear".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub phase: JobPhase,
    pub message: String,
    pub percent: Option<u8>,
    pub completed_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub current_layer: Option<String>,
    pub error: Option<String>,
}

impl Default for ProgressUpdate {
    fn default() -> Self {
        Self {
            phase: JobPhase::Downloading,
            message: String::new(),
            percent: None,
            completed_bytes: None,
            total_bytes: None,
            current_layer: None,
            error: None,
        }
    }
}

pub fn classify(status: &str) -> JobPhase {
    let lowered = status.to_lowercase();
    PHASE_RULES
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, phase)| *phase)
        .unwrap_or(JobPhase::Downloading)
}

pub fn parse_chunk(chunk: &ProgressChunk) -> ProgressUpdate {
    let phase = classify(&chunk.status);
    let error = (phase == JobPhase::Failed).then(|| chunk.status.clone());

    ProgressUpdate {
        phase,
        message: chunk.status.clone(),
        percent: percent_of(chunk.completed, chunk.total),
        completed_bytes: chunk.completed,
        total_bytes: chunk.total,
        current_layer: chunk.digest.as_deref().and_then(layer_tag),
        error,
    }
}

fn percent_of(completed: Option<u64>, total: Option<u64>) -> Option<u8> {
    let (completed, total) = (completed?, total?);
    if total == 0 {
        return None;
    }
    let pct = (completed as f64 / total as f64 * 100.0).round();
    Some(pct.clamp(0.0, 100.0) as u8)
}

/// "sha256:0123456789abcdef..." -> "0123456789ab"
fn layer_tag(digest: &str) -> Option<String> {
    let body = digest.rsplit_once(':').map_or(digest, |(_, rest)| rest).trim();
    if body.is_empty() {
        return None;
    }
    Some(body.chars().take(LAYER_TAG_LEN).collect())
}
