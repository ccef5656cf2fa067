use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use tokio::time::timeout;
use tracing::debug;

use crate::state::SharedState;

/// Upper bound on a model server probe; a silent server reads as unreachable.
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn get_health(State(st): State<SharedState>) -> Json<serde_json::Value> {
    let provider = st.pulls.provider();
    let info = provider.info();

    let reachable = match timeout(PING_TIMEOUT, provider.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(provider=%info.name, error=%e, "health: model server unreachable");
            false
        }
        Err(_) => {
            debug!(provider=%info.name, "health: model server ping timed out");
            false
        }
    };

    Json(serde_json::json!({
        "status": "ok",
        "provider": {
            "name": info.name,
            "baseUrl": info.base_url,
        },
        "providerReachable": reachable,
        "activeJobs": st.pulls.active_count().await,
        "checkedAt": Utc::now(),
    }))
}

pub fn router() -> Router<SharedState> {
    Router::new().route("/health", get(get_health))
}
