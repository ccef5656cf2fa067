use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::schema::ProgressChunk;

pub type ChunkStream = BoxStream<'static, anyhow::Result<ProgressChunk>>;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub base_url: String,
}

/// Model server that can stream a pull of a named model.
///
/// The returned stream has no abort primitive: dropping it stops local
/// processing only, the server may keep transferring the model.
#[async_trait]
pub trait PullProvider: Send + Sync {
    async fn open_pull(&self, model_name: &str) -> anyhow::Result<ChunkStream>;
    async fn ping(&self) -> anyhow::Result<()>;
    fn info(&self) -> ProviderInfo;
}
