use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::schema::JobId;

/// Cancellation flags for jobs that still have a live runner.
///
/// An entry is created with the job and removed when its runner exits, so a
/// missing entry means "no runner to signal".
#[derive(Default)]
pub struct CancellationRegistry {
    flags: Mutex<HashMap<JobId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cleared flag and returns the runner's copy of it.
    pub fn register(&self, id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        match self.flags.lock() {
            Ok(mut flags) => {
                flags.insert(id, token.clone());
            }
            Err(e) => tracing::error!("cancellation registry poisoned on register: {e}"),
        }
        token
    }

    /// Sets the flag. Returns false when no runner is registered for `id`.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.flags.lock() {
            Ok(flags) => match flags.get(&id) {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(e) => {
                tracing::error!("cancellation registry poisoned on cancel: {e}");
                false
            }
        }
    }

    pub fn is_cancelled(&self, id: JobId) -> bool {
        match self.flags.lock() {
            Ok(flags) => flags.get(&id).is_some_and(|t| t.is_cancelled()),
            Err(e) => {
                tracing::error!("cancellation registry poisoned on read: {e}");
                false
            }
        }
    }

    pub fn remove(&self, id: JobId) {
        match self.flags.lock() {
            Ok(mut flags) => {
                flags.remove(&id);
            }
            Err(e) => tracing::error!("cancellation registry poisoned on remove: {e}"),
        }
    }

    pub fn contains(&self, id: JobId) -> bool {
        match self.flags.lock() {
            Ok(flags) => flags.contains_key(&id),
            Err(e) => {
                tracing::error!("cancellation registry poisoned on read: {e}");
                false
            }
        }
    }
}
