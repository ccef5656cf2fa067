mod config;
mod provider_ollama;
mod retention;
mod routes_health;
mod routes_pull;
mod state;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use modelops::{PullJobs, PullProvider};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::provider_ollama::OllamaProvider;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    let provider = Arc::new(OllamaProvider::new(cfg.ollama_url.clone())?);

    // Startup check is advisory: pulls retry the server per job.
    match tokio::time::timeout(crate::routes_health::PING_TIMEOUT, provider.ping()).await {
        Ok(Ok(())) => info!(url=%cfg.ollama_url, "ollama: ok"),
        Ok(Err(e)) => warn!(url=%cfg.ollama_url, error=%e, "ollama: not reachable yet"),
        Err(_) => warn!(url=%cfg.ollama_url, "ollama: ping timed out"),
    }

    let pulls = PullJobs::new(provider).with_max_active(cfg.max_active_pulls);
    let app_state = Arc::new(AppState::new(pulls, cfg.clone()));

    tokio::spawn(crate::retention::run_retention_sweeper(app_state.clone()));

    let app = Router::new()
        .merge(crate::routes_pull::router())
        .merge(crate::routes_health::router())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = &cfg.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("orchestrator listening on http://{addr}");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
