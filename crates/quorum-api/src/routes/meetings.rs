use axum::extract::{Path, Query, State};
use axum::Json;
use quorum_core::AppState;
use quorum_db::meetings::MeetingRow;
use serde::Deserialize;

use crate::error::ApiError;

const DEFAULT_LIMIT: i64 = 20;

#[derive(Deserialize)]
pub struct MeetingsQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/chats/{chat_id}/meetings -- Finalized meetings, newest first
pub async fn list_for_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Query(query): Query<MeetingsQuery>,
) -> Result<Json<Vec<MeetingRow>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let meetings = quorum_db::meetings::list_for_chat(&state.db, chat_id, limit).await?;
    Ok(Json(meetings))
}

/// GET /api/v1/polls/{poll_id}/meeting -- The meeting a poll resolved into
pub async fn by_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> Result<Json<MeetingRow>, ApiError> {
    let meeting = quorum_db::meetings::get_by_poll(&state.db, &poll_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(meeting))
}
