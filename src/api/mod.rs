//! JSON HTTP surface of the master
//!
//! Authentication lives in front of the master: the fronting layer resolves
//! the caller and passes their role in the `X-Viewer-Role` header.

mod error;

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::core::{SlaveData, Submission, TestResult};
use crate::scoreboard::{Scoreboard, ViewerRole};
use crate::slave_manager::SlaveManager;
use crate::storage::Storage;
use crate::submission::SubmissionProcessor;

pub use error::{ApiError, ApiResult, ErrorDetails, ErrorResponse};

pub const VIEWER_ROLE_HEADER: &str = "x-viewer-role";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub processor: Arc<SubmissionProcessor>,
    pub scoreboard: Arc<Scoreboard>,
    pub slaves: Arc<SlaveManager>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/submissions", post(create_submission))
        .route("/api/submissions/{id}", get(get_submission))
        .route("/api/contests/{id}/scoreboard", get(get_scoreboard))
        .route("/api/contests/{id}/scoreboard/status", get(get_board_status))
        .route("/api/contests/{id}/unfreeze", post(unfreeze_contest))
        .route("/api/slaves", get(list_slaves))
        .route("/api/slaves/refresh", post(refresh_slaves))
        .with_state(state)
}

/// Role of the caller; a missing header means an ordinary contestant.
pub fn viewer_role(headers: &HeaderMap) -> ApiResult<ViewerRole> {
    let Some(value) = headers.get(VIEWER_ROLE_HEADER) else {
        return Ok(ViewerRole::Contestant);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::InvalidInput("viewer role is not valid text".into()))?;
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "contestant" => Ok(ViewerRole::Contestant),
        "jury" => Ok(ViewerRole::Jury),
        "admin" => Ok(ViewerRole::Admin),
        other => Err(ApiError::InvalidInput(format!("unknown viewer role '{}'", other))),
    }
}

fn require_staff(role: ViewerRole) -> ApiResult<()> {
    match role {
        ViewerRole::Contestant => Err(ApiError::Forbidden(
            "this action requires the jury or admin role".into(),
        )),
        ViewerRole::Jury | ViewerRole::Admin => Ok(()),
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct CreateSubmissionRequest {
    pub problem_id: i64,
    pub user_id: i64,
    pub language_id: i64,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSubmissionResponse {
    pub submission_id: i64,
}

async fn create_submission(
    State(state): State<AppState>,
    Json(request): Json<CreateSubmissionRequest>,
) -> ApiResult<(StatusCode, Json<CreateSubmissionResponse>)> {
    if request.code.is_empty() {
        return Err(ApiError::InvalidInput("code must not be empty".into()));
    }
    let submission_id = state
        .processor
        .submit(
            request.problem_id,
            request.user_id,
            request.language_id,
            request.code,
        )
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CreateSubmissionResponse { submission_id }),
    ))
}

#[derive(Debug, Serialize)]
pub struct SubmissionDetail {
    #[serde(flatten)]
    pub submission: Submission,
    pub test_results: Vec<TestResult>,
}

async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SubmissionDetail>> {
    let submission = state
        .storage
        .submission(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("submission {}", id)))?;
    let test_results = state.storage.test_results(id).await?;
    Ok(Json(SubmissionDetail {
        submission,
        test_results,
    }))
}

async fn get_scoreboard(
    State(state): State<AppState>,
    Path(contest_id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let role = viewer_role(&headers)?;
    let board = state.scoreboard.scoreboard(contest_id, role).await?;
    Ok(Json(&*board).into_response())
}

async fn get_board_status(
    State(state): State<AppState>,
    Path(contest_id): Path<i64>,
) -> Response {
    Json(state.scoreboard.board_status(contest_id)).into_response()
}

async fn unfreeze_contest(
    State(state): State<AppState>,
    Path(contest_id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    require_staff(viewer_role(&headers)?)?;
    let copied = state.scoreboard.unfreeze(contest_id).await?;
    info!("Contest {} unfrozen by request, {} rows published", contest_id, copied);
    Ok(Json(json!({ "contest_id": contest_id, "rows": copied })))
}

async fn list_slaves(State(state): State<AppState>) -> Json<Vec<SlaveData>> {
    Json(state.slaves.slaves().await)
}

async fn refresh_slaves(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let active = state.slaves.refresh_slaves().await?;
    Ok(Json(json!({ "active": active })))
}
