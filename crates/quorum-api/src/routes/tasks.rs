use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use quorum_core::dispatcher::ClaimedTask;
use quorum_core::AppState;
use quorum_db::tasks::TaskRow;
use serde::Deserialize;

use crate::error::ApiError;

/// POST /api/v1/tasks/claim -- Claim the next due task and execute its
/// handler. Returns null when nothing is due; the claim token in the task row
/// must come back via the complete call once the effects are delivered.
pub async fn claim_next(
    State(state): State<AppState>,
) -> Result<Json<Option<ClaimedTask>>, ApiError> {
    let claimed = quorum_core::dispatcher::claim_next(&state).await?;
    Ok(Json(claimed))
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    pub claim_token: String,
}

/// POST /api/v1/tasks/{task_id}/complete -- Mark a claimed task executed
pub async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(body): Json<CompleteRequest>,
) -> Result<StatusCode, ApiError> {
    quorum_core::dispatcher::complete(&state, task_id, &body.claim_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/chats/{chat_id}/tasks/pending -- Unexecuted tasks for a chat
pub async fn pending_for_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
) -> Result<Json<Vec<TaskRow>>, ApiError> {
    let tasks = quorum_db::tasks::pending_for_chat(&state.db, chat_id).await?;
    Ok(Json(tasks))
}
