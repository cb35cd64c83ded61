use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use quorum_core::AppState;
use quorum_db::confirmations::ConfirmationRow;
use quorum_models::ConfirmationOutcome;
use serde::Deserialize;

use crate::error::ApiError;

/// GET /api/v1/confirmations/{confirmation_id} -- One confirmation round
pub async fn get_round(
    State(state): State<AppState>,
    Path(confirmation_id): Path<i64>,
) -> Result<Json<ConfirmationRow>, ApiError> {
    let round = quorum_core::confirmation::round(&state, confirmation_id).await?;
    Ok(Json(round))
}

#[derive(Deserialize)]
pub struct ResponseRequest {
    pub user_id: i64,
    pub confirmed: bool,
}

/// POST /api/v1/confirmations/{confirmation_id}/response -- Record one
/// confirm/decline answer from an invited voter
pub async fn record_response(
    State(state): State<AppState>,
    Path(confirmation_id): Path<i64>,
    Json(body): Json<ResponseRequest>,
) -> Result<Json<ConfirmationOutcome>, ApiError> {
    let outcome =
        quorum_core::confirmation::respond(&state, confirmation_id, body.user_id, body.confirmed)
            .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/confirmations/{confirmation_id}/cancel -- Cancel a pending round
pub async fn cancel_round(
    State(state): State<AppState>,
    Path(confirmation_id): Path<i64>,
) -> Result<Json<ConfirmationRow>, ApiError> {
    let round = quorum_core::confirmation::cancel(&state, confirmation_id).await?;
    Ok(Json(round))
}

#[derive(Deserialize)]
pub struct PromptMessageRequest {
    pub message_id: i64,
}

/// POST /api/v1/confirmations/{confirmation_id}/prompt-message -- Bind the
/// transport message carrying the prompt, for later lookup by reply
pub async fn bind_prompt_message(
    State(state): State<AppState>,
    Path(confirmation_id): Path<i64>,
    Json(body): Json<PromptMessageRequest>,
) -> Result<StatusCode, ApiError> {
    quorum_core::confirmation::bind_prompt_message(&state, confirmation_id, body.message_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct CompletionMessageRequest {
    pub message_id: i64,
}

/// POST /api/v1/confirmations/{confirmation_id}/completion-message -- Bind
/// the transport message announcing the completed round
pub async fn bind_completion_message(
    State(state): State<AppState>,
    Path(confirmation_id): Path<i64>,
    Json(body): Json<CompletionMessageRequest>,
) -> Result<StatusCode, ApiError> {
    quorum_core::confirmation::bind_completion_message(&state, confirmation_id, body.message_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/chats/{chat_id}/confirmations/pending -- Open rounds for a chat
pub async fn pending_for_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
) -> Result<Json<Vec<ConfirmationRow>>, ApiError> {
    let rounds = quorum_core::confirmation::pending_for_chat(&state, chat_id).await?;
    Ok(Json(rounds))
}

/// GET /api/v1/chats/{chat_id}/confirmations/by-prompt/{message_id} -- Round
/// lookup by the prompt message a user replied to
pub async fn by_prompt_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(i64, i64)>,
) -> Result<Json<ConfirmationRow>, ApiError> {
    let round = quorum_core::confirmation::by_prompt(&state, chat_id, message_id).await?;
    Ok(Json(round))
}
