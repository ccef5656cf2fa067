//! HTTP surface for model pull jobs.
//!
//! - POST /models/pull              start a pull, 202 + job id
//! - GET  /models/pull              all known jobs, newest first
//! - GET  /models/pull/:job_id      one job
//! - POST /models/pull/:job_id/cancel

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use modelops::{JobId, JobStatus, PullError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::state::SharedState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPullReq {
    #[serde(default)]
    pub model_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPullResp {
    pub job_id: JobId,
}

#[derive(Serialize)]
pub struct CancelResp {
    pub accepted: bool,
}

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

fn api_error(e: PullError) -> (StatusCode, Json<ApiError>) {
    let status = match e {
        PullError::BadInput(_) => StatusCode::BAD_REQUEST,
        PullError::NotFound(_) => StatusCode::NOT_FOUND,
    };
    (status, Json(ApiError { error: e.to_string() }))
}

pub async fn post_pull(
    State(st): State<SharedState>,
    body: Result<Json<StartPullReq>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<StartPullResp>)> {
    // Any unreadable body means modelName was not supplied.
    let Json(req) = body.map_err(|rejection| {
        warn!(error=%rejection.body_text(), "pull: unreadable start request");
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: format!("modelName must be a non-empty string: {}", rejection.body_text()),
            }),
        )
    })?;
    let model_name = req.model_name.unwrap_or_default();
    let job_id = st.pulls.start_job(&model_name).await.map_err(|e| {
        warn!(error=%e, "pull: rejected start request");
        api_error(e)
    })?;

    Ok((StatusCode::ACCEPTED, Json(StartPullResp { job_id })))
}

pub async fn list_pulls(State(st): State<SharedState>) -> Json<Vec<JobStatus>> {
    Json(st.pulls.list_jobs().await)
}

pub async fn get_pull(
    State(st): State<SharedState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatus>> {
    // Unparseable ids cannot name a job, so they read as unknown.
    let Ok(id) = job_id.parse::<JobId>() else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: format!("no such job: {job_id}"),
            }),
        ));
    };

    st.pulls.get_status(id).await.map(Json).map_err(api_error)
}

pub async fn cancel_pull(
    State(st): State<SharedState>,
    Path(job_id): Path<String>,
) -> Json<CancelResp> {
    let accepted = match job_id.parse::<JobId>() {
        Ok(id) => st.pulls.cancel_job(id).await,
        Err(_) => false,
    };
    if !accepted {
        info!(job_id=%job_id, "pull: cancel refused");
    }
    Json(CancelResp { accepted })
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/models/pull", post(post_pull).get(list_pulls))
        .route("/models/pull/:job_id", get(get_pull))
        .route("/models/pull/:job_id/cancel", post(cancel_pull))
}
