use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use quorum_core::polls::PollState;
use quorum_core::AppState;
use quorum_db::polls::{PollRow, VoteReview};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreatePollRequest {
    pub id: String,
    pub chat_id: i64,
    pub question: String,
    pub options: Vec<String>,
    pub creator_id: i64,
    #[serde(default)]
    pub expected_voters: Option<i64>,
}

/// POST /api/v1/polls -- Open a scheduling poll in a chat
pub async fn create_poll(
    State(state): State<AppState>,
    Json(body): Json<CreatePollRequest>,
) -> Result<(StatusCode, Json<PollRow>), ApiError> {
    let poll = quorum_core::polls::create_poll(
        &state,
        &body.id,
        body.chat_id,
        &body.question,
        &body.options,
        body.creator_id,
        body.expected_voters,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(poll)))
}

/// GET /api/v1/polls/{poll_id} -- Poll with its live tally
pub async fn get_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> Result<Json<PollState>, ApiError> {
    let poll = quorum_core::polls::poll_state(&state, &poll_id).await?;
    Ok(Json(poll))
}

#[derive(Deserialize)]
pub struct RegisterMessagesRequest {
    #[serde(default)]
    pub poll_message_id: Option<i64>,
    #[serde(default)]
    pub pinned_message_id: Option<i64>,
}

/// POST /api/v1/polls/{poll_id}/messages -- Attach transport message ids
pub async fn register_messages(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    Json(body): Json<RegisterMessagesRequest>,
) -> Result<StatusCode, ApiError> {
    quorum_core::polls::register_messages(
        &state,
        &poll_id,
        body.poll_message_id,
        body.pinned_message_id,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/polls/{poll_id}/abandon -- Close a poll without a winner
pub async fn abandon_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> Result<Json<PollRow>, ApiError> {
    let poll = quorum_core::polls::abandon(&state, &poll_id).await?;
    Ok(Json(poll))
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub user_id: i64,
    pub option_indices: Vec<i64>,
}

/// POST /api/v1/polls/{poll_id}/votes -- Record a ballot and evaluate consensus
pub async fn submit_vote(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    Json(body): Json<VoteRequest>,
) -> Result<Json<VoteReview>, ApiError> {
    let review =
        quorum_core::voting::submit_vote(&state, &poll_id, body.user_id, &body.option_indices)
            .await?;
    Ok(Json(review))
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub meeting_time: DateTime<Utc>,
    #[serde(default)]
    pub pinned_message_id: Option<i64>,
}

/// POST /api/v1/polls/{poll_id}/schedule -- Arm the confirmation prompt for a
/// resolved poll. `task` is null when the meeting is too close for one.
pub async fn schedule_meeting(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    Json(body): Json<ScheduleRequest>,
) -> Result<Json<Value>, ApiError> {
    let task = quorum_core::schedule::schedule_meeting(
        &state,
        &poll_id,
        body.meeting_time,
        body.pinned_message_id,
    )
    .await?;
    Ok(Json(json!({ "task": task })))
}

/// GET /api/v1/chats/{chat_id}/poll -- The chat's open poll, if any
pub async fn active_poll(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let active = quorum_core::polls::active_poll(&state, chat_id).await?;
    Ok(Json(json!({ "active": active })))
}
