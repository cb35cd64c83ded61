pub mod error;
pub mod routes;

use axum::routing::{get, post, put};
use axum::Router;
use quorum_core::AppState;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// The full HTTP surface. State is attached by the caller so tests and the
/// server binary can share one router definition.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/v1/polls", post(routes::polls::create_poll))
        .route("/api/v1/polls/{poll_id}", get(routes::polls::get_poll))
        .route(
            "/api/v1/polls/{poll_id}/messages",
            post(routes::polls::register_messages),
        )
        .route(
            "/api/v1/polls/{poll_id}/abandon",
            post(routes::polls::abandon_poll),
        )
        .route(
            "/api/v1/polls/{poll_id}/votes",
            post(routes::polls::submit_vote),
        )
        .route(
            "/api/v1/polls/{poll_id}/schedule",
            post(routes::polls::schedule_meeting),
        )
        .route(
            "/api/v1/polls/{poll_id}/meeting",
            get(routes::meetings::by_poll),
        )
        .route("/api/v1/chats/{chat_id}/poll", get(routes::polls::active_poll))
        .route(
            "/api/v1/chats/{chat_id}/meetings",
            get(routes::meetings::list_for_chat),
        )
        .route(
            "/api/v1/chats/{chat_id}/tasks/pending",
            get(routes::tasks::pending_for_chat),
        )
        .route(
            "/api/v1/chats/{chat_id}/confirmations/pending",
            get(routes::confirmations::pending_for_chat),
        )
        .route(
            "/api/v1/chats/{chat_id}/confirmations/by-prompt/{message_id}",
            get(routes::confirmations::by_prompt_message),
        )
        .route(
            "/api/v1/confirmations/{confirmation_id}",
            get(routes::confirmations::get_round),
        )
        .route(
            "/api/v1/confirmations/{confirmation_id}/response",
            post(routes::confirmations::record_response),
        )
        .route(
            "/api/v1/confirmations/{confirmation_id}/cancel",
            post(routes::confirmations::cancel_round),
        )
        .route(
            "/api/v1/confirmations/{confirmation_id}/prompt-message",
            post(routes::confirmations::bind_prompt_message),
        )
        .route(
            "/api/v1/confirmations/{confirmation_id}/completion-message",
            post(routes::confirmations::bind_completion_message),
        )
        .route("/api/v1/tasks/claim", post(routes::tasks::claim_next))
        .route(
            "/api/v1/tasks/{task_id}/complete",
            post(routes::tasks::complete_task),
        )
        .route(
            "/api/v1/subscribers",
            get(routes::subscribers::list_active),
        )
        .route(
            "/api/v1/subscribers/{user_id}",
            put(routes::subscribers::subscribe).delete(routes::subscribers::unsubscribe),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
