use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use quorum_core::AppState;
use quorum_db::subscribers::SubscriberRow;

use crate::error::ApiError;

/// PUT /api/v1/subscribers/{user_id} -- Opt a user into the scheduling
/// audience. Idempotent; re-activating keeps the original subscription time.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<SubscriberRow>, ApiError> {
    let row = quorum_db::subscribers::activate(&state.db, user_id, Utc::now()).await?;
    Ok(Json(row))
}

/// DELETE /api/v1/subscribers/{user_id} -- Opt a user out. Succeeds whether
/// or not the user was subscribed.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    quorum_db::subscribers::deactivate(&state.db, user_id, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/subscribers -- Active subscribers
pub async fn list_active(
    State(state): State<AppState>,
) -> Result<Json<Vec<SubscriberRow>>, ApiError> {
    let rows = quorum_db::subscribers::list_active(&state.db).await?;
    Ok(Json(rows))
}
