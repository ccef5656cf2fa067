//! In-process model server and state builders for route tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use modelops::{ChunkStream, ProgressChunk, ProviderInfo, PullJobs, PullProvider};

use crate::config::AppConfig;
use crate::state::{AppState, SharedState};

/// Serves a fixed chunk script per pull. `hold` keeps the stream open after
/// the script so jobs stay active.
pub struct FakeProvider {
    pub script: Vec<ProgressChunk>,
    pub hold: bool,
    pub reachable: AtomicBool,
    pub ping_hangs: AtomicBool,
}

impl FakeProvider {
    pub fn completing() -> Self {
        Self {
            script: vec![
                ProgressChunk::status("pulling manifest"),
                ProgressChunk::bytes("pulling 6a0746a1ec1a", 50, 100),
                ProgressChunk::status("success"),
            ],
            hold: false,
            reachable: AtomicBool::new(true),
            ping_hangs: AtomicBool::new(false),
        }
    }

    pub fn stalled() -> Self {
        Self {
            script: vec![ProgressChunk {
                digest: Some("sha256:6a0746a1ec1aef3e7ec53868f220ff6e".to_string()),
                ..ProgressChunk::bytes("pulling 6a0746a1ec1a", 10, 100)
            }],
            hold: true,
            reachable: AtomicBool::new(true),
            ping_hangs: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PullProvider for FakeProvider {
    async fn open_pull(&self, _model_name: &str) -> anyhow::Result<ChunkStream> {
        let head = futures::stream::iter(self.script.clone().into_iter().map(Ok));
        if self.hold {
            Ok(head.chain(futures::stream::pending()).boxed())
        } else {
            Ok(head.boxed())
        }
    }

    async fn ping(&self) -> anyhow::Result<()> {
        if self.ping_hangs.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            anyhow::bail!("connection refused")
        }
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "fake".to_string(),
            base_url: "http://fake.local".to_string(),
        }
    }
}

pub fn test_config() -> AppConfig {
    AppConfig::from_lookup(|_| None).expect("default config")
}

pub fn state_with(provider: Arc<FakeProvider>) -> SharedState {
    Arc::new(AppState::new(PullJobs::new(provider), test_config()))
}
