use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use modelops::{ChunkStream, ProgressChunk, ProviderInfo, PullProvider};
use serde::Deserialize;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest NDJSON record accepted from the server. Real progress lines are a few hundred bytes.
const MAX_LINE_BYTES: usize = 64 * 1024;

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        // No total timeout: a pull streams for as long as the download takes.
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to build model server client")?;
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl PullProvider for OllamaProvider {
    async fn open_pull(&self, model_name: &str) -> anyhow::Result<ChunkStream> {
        let body = serde_json::json!({
            "model": model_name,
            "stream": true
        });

        let url = format!("{}/api/pull", self.base_url);
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("model server unreachable")?
            .error_for_status()
            .context("model server rejected pull")?;

        // No abort exists for /api/pull; dropping this stream only stops reading.
        let mut body = resp.bytes_stream();
        let stream = async_stream::stream! {
            let mut lines = LineBuffer::default();
            while let Some(piece) = body.next().await {
                let piece: Bytes = match piece {
                    Ok(p) => p,
                    Err(e) => {
                        yield Err(anyhow::Error::new(e).context("pull stream interrupted"));
                        return;
                    }
                };
                let complete = match lines.push(&piece) {
                    Ok(complete) => complete,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                for line in complete {
                    match decode_line(&line) {
                        Ok(chunk) => yield Ok(chunk),
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
            if let Some(line) = lines.finish() {
                yield decode_line(&line);
            }
        };

        Ok(stream.boxed())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let url = format!("{}/api/version", self.base_url);
        self.client.get(url).send().await?.error_for_status()?;
        Ok(())
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "ollama".to_string(),
            base_url: self.base_url.clone(),
        }
    }
}

/// One NDJSON line of `/api/pull`. Failures arrive as `{"error": "..."}`.
#[derive(Debug, Deserialize)]
struct PullLine {
    #[serde(default)]
    status: String,
    digest: Option<String>,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

fn decode_line(line: &str) -> anyhow::Result<ProgressChunk> {
    let raw: PullLine = serde_json::from_str(line)
        .with_context(|| format!("invalid pull progress line: {line}"))?;

    if let Some(err) = raw.error {
        // routed through the status table, which maps it to failed
        return Ok(ProgressChunk::status(format!("error: {err}")));
    }

    Ok(ProgressChunk {
        status: raw.status,
        digest: raw.digest,
        total: raw.total,
        completed: raw.completed,
    })
}

/// Reassembles newline-delimited records from arbitrarily split body pieces.
struct LineBuffer {
    pending: Vec<u8>,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
        }
    }

    /// Returns the records completed by `bytes`. Fails once an unterminated
    /// record outgrows `max_line`.
    fn push(&mut self, bytes: &[u8]) -> anyhow::Result<Vec<String>> {
        self.pending.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                out.push(text);
            }
        }
        if self.pending.len() > self.max_line {
            anyhow::bail!(
                "pull progress line exceeds {} bytes without a newline",
                self.max_line
            );
        }
        Ok(out)
    }

    fn finish(self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.pending).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::post, Json, Router};
    use modelops::{parse_chunk, JobPhase};

    /// Serves `app` on an ephemeral local port and returns its base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn drain(stream: ChunkStream) -> Vec<anyhow::Result<ProgressChunk>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_open_pull_streams_ndjson() {
        let app = Router::new().route(
            "/api/pull",
            post(|Json(req): Json<serde_json::Value>| async move {
                assert_eq!(req["model"], "llama3:8b");
                assert_eq!(req["stream"], true);
                concat!(
                    "{\"status\":\"pulling manifest\"}\n",
                    "{\"status\":\"pulling 6a07\",\"digest\":\"sha256:6a0746a1ec1a\",\"total\":200,\"completed\":50}\n",
                    "{\"status\":\"success\"}"
                )
            }),
        );
        let provider = OllamaProvider::new(serve(app).await).unwrap();

        let items = drain(provider.open_pull("llama3:8b").await.unwrap()).await;
        let chunks: Vec<ProgressChunk> = items.into_iter().map(|c| c.unwrap()).collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].status, "pulling manifest");
        assert_eq!(chunks[1].completed, Some(50));
        assert_eq!(chunks[1].total, Some(200));
        // last record has no trailing newline
        assert_eq!(chunks[2].status, "success");
    }

    #[tokio::test]
    async fn test_open_pull_error_line_classifies_as_failed() {
        let app = Router::new().route(
            "/api/pull",
            post(|| async { "{\"status\":\"pulling manifest\"}\n{\"error\":\"pull model manifest: file does not exist\"}\n" }),
        );
        let provider = OllamaProvider::new(serve(app).await).unwrap();

        let items = drain(provider.open_pull("nope").await.unwrap()).await;
        let last = items.last().unwrap().as_ref().unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(parse_chunk(last).phase, JobPhase::Failed);
        assert_eq!(last.status, "error: pull model manifest: file does not exist");
    }

    #[tokio::test]
    async fn test_open_pull_non_2xx_is_open_failure() {
        let app = Router::new().route(
            "/api/pull",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let provider = OllamaProvider::new(serve(app).await).unwrap();

        let err = match provider.open_pull("llama3:8b").await {
            Ok(_) => panic!("500 must fail the open"),
            Err(e) => e,
        };
        assert!(format!("{err:#}").contains("model server rejected pull"));
    }

    #[tokio::test]
    async fn test_open_pull_unreachable_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let provider = OllamaProvider::new(format!("http://{addr}")).unwrap();

        assert!(provider.open_pull("llama3:8b").await.is_err());
        assert!(provider.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_open_pull_body_failure_is_stream_error() {
        let app = Router::new().route(
            "/api/pull",
            post(|| async {
                let pieces: Vec<Result<Bytes, std::io::Error>> = vec![
                    Ok(Bytes::from_static(b"{\"status\":\"pulling manifest\"}\n")),
                    Err(std::io::Error::other("connection reset")),
                ];
                Body::from_stream(futures::stream::iter(pieces))
            }),
        );
        let provider = OllamaProvider::new(serve(app).await).unwrap();

        let items = drain(provider.open_pull("llama3:8b").await.unwrap()).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().status, "pulling manifest");
        let err = items[1].as_ref().unwrap_err();
        assert!(format!("{err:#}").contains("pull stream interrupted"));
    }

    #[tokio::test]
    async fn test_open_pull_garbage_line_is_stream_error() {
        let app = Router::new().route("/api/pull", post(|| async { "<html>bad gateway</html>\n" }));
        let provider = OllamaProvider::new(serve(app).await).unwrap();

        let items = drain(provider.open_pull("llama3:8b").await.unwrap()).await;

        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[tokio::test]
    async fn test_ping_hits_version_endpoint() {
        let app = Router::new().route(
            "/api/version",
            axum::routing::get(|| async { Json(serde_json::json!({ "version": "0.3.12" })) }),
        );
        let provider = OllamaProvider::new(serve(app).await).unwrap();

        provider.ping().await.unwrap();
        assert_eq!(provider.info().name, "ollama");
    }

    #[test]
    fn test_decode_progress_line() {
        let chunk = decode_line(
            r#"{"status":"pulling 6a0746a1ec1a","digest":"sha256:6a0746a1ec1aef3e7ec53868f220ff6e389f6f8ef87a01d77c96807de94ca2aa","total":4661211424,"completed":1048576}"#,
        )
        .unwrap();
        assert_eq!(chunk.status, "pulling 6a0746a1ec1a");
        assert_eq!(chunk.total, Some(4661211424));
        assert_eq!(chunk.completed, Some(1048576));
        assert_eq!(parse_chunk(&chunk).current_layer.as_deref(), Some("6a0746a1ec1a"));
    }

    #[test]
    fn test_decode_error_line() {
        let chunk = decode_line(r#"{"error":"pull model manifest: file does not exist"}"#).unwrap();
        let update = parse_chunk(&chunk);
        assert_eq!(update.phase, JobPhase::Failed);
        assert_eq!(
            update.error.as_deref(),
            Some("error: pull model manifest: file does not exist")
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_line("<html>bad gateway</html>").is_err());
    }

    #[test]
    fn test_line_buffer_split_across_pieces() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(br#"{"status":"pulling man"#).unwrap().is_empty());
        let lines = buf.push(b"ifest\"}\n{\"status\":\"success\"}\n\n{\"sta").unwrap();
        assert_eq!(lines, vec![r#"{"status":"pulling manifest"}"#, r#"{"status":"success"}"#]);
        assert_eq!(buf.push(b"tus\":\"tail\"}").unwrap().len(), 0);
        assert_eq!(buf.finish().as_deref(), Some(r#"{"status":"tail"}"#));
    }

    #[test]
    fn test_line_buffer_empty_finish() {
        let mut buf = LineBuffer::default();
        buf.push(b"{\"status\":\"success\"}\r\n").unwrap();
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_line_buffer_rejects_unterminated_flood() {
        let mut buf = LineBuffer::with_max_line(16);
        assert_eq!(buf.push(b"{\"status\":\"ok\"}\n0123").unwrap().len(), 1);
        assert!(buf.push(b"456789").unwrap().is_empty());
        let err = buf.push(b"abcdefghij").unwrap_err();
        assert!(err.to_string().contains("16 bytes"));
    }
}
