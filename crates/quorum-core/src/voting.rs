use crate::error::CoreError;
use crate::AppState;
use chrono::Utc;
use quorum_db::polls::{ForceReview, VoteReview};
use quorum_models::{ForceResolution, VoteOutcome};

/// Validate and store one user's vote, reporting what it did to the poll.
/// Indices are normalized (sorted, deduplicated) before storage so identical
/// selections always tally identically.
pub async fn submit_vote(
    state: &AppState,
    poll_id: &str,
    user_id: i64,
    option_indices: &[i64],
) -> Result<VoteReview, CoreError> {
    if option_indices.is_empty() {
        return Err(CoreError::BadRequest(
            "at least one option index is required".into(),
        ));
    }
    let poll = quorum_db::polls::get_poll(&state.db, poll_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    let option_count = poll.options.0.len() as i64;
    let mut indices = option_indices.to_vec();
    indices.sort_unstable();
    indices.dedup();
    if indices.iter().any(|&index| index < 0 || index >= option_count) {
        return Err(CoreError::BadRequest(format!(
            "option indices must lie in 0..{option_count}"
        )));
    }

    let review = quorum_db::polls::record_vote(
        &state.db,
        poll_id,
        user_id,
        &indices,
        Utc::now(),
        state.settings.revote_timeout,
    )
    .await?;

    match &review.outcome {
        VoteOutcome::TieAnnounced { tied, round } => {
            tracing::info!(poll_id, round = *round, options = ?tied, "tie announced, revote window armed");
        }
        VoteOutcome::Resolved { winning_index, .. } => {
            tracing::info!(poll_id, winning_index = *winning_index, "poll resolved");
        }
        _ => {}
    }
    Ok(review)
}

/// Settle a poll whose revote window ran out. Safe to call on an already
/// closed poll; the review says so instead of failing.
pub async fn force_resolve(state: &AppState, poll_id: &str) -> Result<ForceReview, CoreError> {
    let review = quorum_db::polls::force_resolve(&state.db, poll_id, Utc::now()).await?;
    match &review.resolution {
        ForceResolution::Resolved { winning_index, .. } => {
            tracing::info!(poll_id, winning_index = *winning_index, "poll force-resolved");
        }
        ForceResolution::Abandoned => {
            tracing::info!(poll_id, "poll abandoned, nobody voted during the revote window");
        }
        ForceResolution::AlreadyClosed => {}
    }
    Ok(review)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeSettings;

    async fn test_state() -> AppState {
        let db = quorum_db::create_pool("sqlite::memory:", 1).await.expect("pool");
        quorum_db::run_migrations(&db).await.expect("migrations");
        AppState::new(db, RuntimeSettings::default())
    }

    async fn seed_poll(state: &AppState, expected: i64) {
        let options = vec!["Mon 15:00".to_string(), "Tue 18:00".to_string()];
        crate::polls::create_poll(state, "p1", -1, "when?", &options, 7, Some(expected))
            .await
            .expect("poll");
    }

    #[tokio::test]
    async fn rejects_invalid_selections() {
        let state = test_state().await;
        seed_poll(&state, 3).await;

        let empty = submit_vote(&state, "p1", 1, &[]).await;
        assert!(matches!(empty, Err(CoreError::BadRequest(_))));

        let out_of_range = submit_vote(&state, "p1", 1, &[2]).await;
        assert!(matches!(out_of_range, Err(CoreError::BadRequest(_))));

        let negative = submit_vote(&state, "p1", 1, &[-1]).await;
        assert!(matches!(negative, Err(CoreError::BadRequest(_))));

        let missing = submit_vote(&state, "nope", 1, &[0]).await;
        assert!(matches!(missing, Err(CoreError::NotFound)));
    }

    #[tokio::test]
    async fn selections_are_normalized_before_storage() {
        let state = test_state().await;
        seed_poll(&state, 3).await;

        submit_vote(&state, "p1", 1, &[1, 0, 1]).await.expect("vote");
        let votes = quorum_db::polls::list_votes(&state.db, "p1")
            .await
            .expect("votes");
        assert_eq!(votes[0].option_indices.0, vec![0, 1]);
    }

    #[tokio::test]
    async fn consensus_flows_through_to_resolution() {
        let state = test_state().await;
        seed_poll(&state, 2).await;

        let progress = submit_vote(&state, "p1", 1, &[0]).await.expect("vote");
        assert!(matches!(progress.outcome, VoteOutcome::Progress { .. }));

        let resolved = submit_vote(&state, "p1", 2, &[0]).await.expect("vote");
        assert!(matches!(
            resolved.outcome,
            VoteOutcome::Resolved { winning_index: 0, .. }
        ));
    }
}
