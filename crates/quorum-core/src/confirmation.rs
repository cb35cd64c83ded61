use crate::error::CoreError;
use crate::AppState;
use chrono::Utc;
use quorum_db::confirmations::{ConfirmationRow, ResponseReview};
use quorum_models::ConfirmationOutcome;

fn counts(round: &ConfirmationRow) -> (i64, i64, i64) {
    (
        round.confirmed.0.len() as i64,
        round.declined.0.len() as i64,
        round.awaiting().len() as i64,
    )
}

/// Record one confirm/decline answer and report the round's standing. A
/// decline never cancels the round here; callers decide whether to follow up
/// with [`cancel`].
pub async fn respond(
    state: &AppState,
    confirmation_id: i64,
    user_id: i64,
    confirmed: bool,
) -> Result<ConfirmationOutcome, CoreError> {
    let review = quorum_db::confirmations::record_response(
        &state.db,
        confirmation_id,
        user_id,
        confirmed,
        state.settings.unpin_delay,
        Utc::now(),
    )
    .await?;

    match review {
        ResponseReview::NotPending { round } => Err(CoreError::Conflict(format!(
            "confirmation round is {}",
            round.status
        ))),
        ResponseReview::NotEligible { .. } => Err(CoreError::BadRequest(
            "user is not part of this confirmation round".into(),
        )),
        ResponseReview::Acknowledged { round } => {
            let (confirmed, declined, awaiting) = counts(&round);
            Ok(ConfirmationOutcome::Acknowledged {
                confirmed,
                declined,
                awaiting,
            })
        }
        ResponseReview::Declined { round } => {
            tracing::info!(confirmation_id, user_id, "confirmation declined");
            let (confirmed, declined, awaiting) = counts(&round);
            Ok(ConfirmationOutcome::Declined {
                confirmed,
                declined,
                awaiting,
            })
        }
        ResponseReview::Completed { meeting, .. } => {
            tracing::info!(
                confirmation_id,
                meeting_id = meeting.id,
                "confirmation completed, meeting finalized"
            );
            Ok(ConfirmationOutcome::Completed {
                meeting_id: meeting.id,
            })
        }
    }
}

/// Explicitly cancel a pending round, e.g. after a decline.
pub async fn cancel(state: &AppState, confirmation_id: i64) -> Result<ConfirmationRow, CoreError> {
    let cancelled =
        quorum_db::confirmations::cancel_round(&state.db, confirmation_id, Utc::now()).await?;
    if !cancelled {
        return match quorum_db::confirmations::get_round(&state.db, confirmation_id).await? {
            Some(round) => Err(CoreError::Conflict(format!(
                "confirmation round is {}",
                round.status
            ))),
            None => Err(CoreError::NotFound),
        };
    }
    tracing::info!(confirmation_id, "confirmation round cancelled");
    quorum_db::confirmations::get_round(&state.db, confirmation_id)
        .await?
        .ok_or(CoreError::NotFound)
}

pub async fn round(state: &AppState, confirmation_id: i64) -> Result<ConfirmationRow, CoreError> {
    quorum_db::confirmations::get_round(&state.db, confirmation_id)
        .await?
        .ok_or(CoreError::NotFound)
}

/// Look a round up by the chat message carrying its prompt, the reference the
/// transport actually holds when a button is pressed.
pub async fn by_prompt(
    state: &AppState,
    chat_id: i64,
    prompt_message_id: i64,
) -> Result<ConfirmationRow, CoreError> {
    quorum_db::confirmations::get_round_by_prompt(&state.db, chat_id, prompt_message_id)
        .await?
        .ok_or(CoreError::NotFound)
}

pub async fn bind_prompt_message(
    state: &AppState,
    confirmation_id: i64,
    message_id: i64,
) -> Result<(), CoreError> {
    let bound =
        quorum_db::confirmations::bind_prompt_message(&state.db, confirmation_id, message_id)
            .await?;
    if !bound {
        return Err(CoreError::NotFound);
    }
    Ok(())
}

pub async fn bind_completion_message(
    state: &AppState,
    confirmation_id: i64,
    message_id: i64,
) -> Result<(), CoreError> {
    let bound =
        quorum_db::confirmations::set_completion_message(&state.db, confirmation_id, message_id)
            .await?;
    if !bound {
        return Err(CoreError::NotFound);
    }
    Ok(())
}

pub async fn pending_for_chat(
    state: &AppState,
    chat_id: i64,
) -> Result<Vec<ConfirmationRow>, CoreError> {
    Ok(quorum_db::confirmations::pending_for_chat(&state.db, chat_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeSettings;
    use chrono::Duration;

    async fn test_state() -> AppState {
        let db = quorum_db::create_pool("sqlite::memory:", 1).await.expect("pool");
        quorum_db::run_migrations(&db).await.expect("migrations");
        AppState::new(db, RuntimeSettings::default())
    }

    async fn open_round(state: &AppState, voters: &[i64]) -> ConfirmationRow {
        let now = Utc::now();
        let (round, _) = quorum_db::confirmations::open_round(
            &state.db,
            -1,
            Some("p1"),
            42,
            "Mon 15:00",
            now + Duration::hours(24),
            None,
            voters,
            now + Duration::minutes(30),
            now,
        )
        .await
        .expect("round");
        round
    }

    #[tokio::test]
    async fn responses_map_to_outcomes() {
        let state = test_state().await;
        let round = open_round(&state, &[1, 2]).await;

        let outsider = respond(&state, round.id, 99, true).await;
        assert!(matches!(outsider, Err(CoreError::BadRequest(_))));

        let first = respond(&state, round.id, 1, true).await.expect("respond");
        assert_eq!(
            first,
            ConfirmationOutcome::Acknowledged {
                confirmed: 1,
                declined: 0,
                awaiting: 1
            }
        );

        let last = respond(&state, round.id, 2, true).await.expect("respond");
        assert!(matches!(last, ConfirmationOutcome::Completed { .. }));

        let late = respond(&state, round.id, 1, false).await;
        assert!(matches!(late, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn cancel_is_terminal_and_single_shot() {
        let state = test_state().await;
        let round = open_round(&state, &[1, 2]).await;

        respond(&state, round.id, 1, false).await.expect("decline");
        let cancelled = cancel(&state, round.id).await.expect("cancel");
        assert_eq!(cancelled.status, "cancelled");

        let again = cancel(&state, round.id).await;
        assert!(matches!(again, Err(CoreError::Conflict(_))));
        let missing = cancel(&state, round.id + 1).await;
        assert!(matches!(missing, Err(CoreError::NotFound)));
    }

    #[tokio::test]
    async fn prompt_binding_round_trips() {
        let state = test_state().await;
        let round = open_round(&state, &[1]).await;

        bind_prompt_message(&state, round.id, 881).await.expect("bind");
        let found = by_prompt(&state, -1, 881).await.expect("lookup");
        assert_eq!(found.id, round.id);

        let missing = by_prompt(&state, -1, 999).await;
        assert!(matches!(missing, Err(CoreError::NotFound)));

        bind_completion_message(&state, round.id, 882)
            .await
            .expect("bind completion");
        let updated = crate::confirmation::round(&state, round.id).await.expect("round");
        assert_eq!(updated.completion_message_id, Some(882));

        let ghost = bind_completion_message(&state, round.id + 1, 883).await;
        assert!(matches!(ghost, Err(CoreError::NotFound)));
    }
}
