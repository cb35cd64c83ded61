use crate::error::CoreError;
use crate::AppState;
use chrono::Utc;
use quorum_db::polls::PollRow;
use quorum_models::Tally;

/// Hard cap on the option list; chat transports rarely render more.
pub const MAX_OPTIONS: usize = 10;

/// A poll together with the tally derived from its current votes.
#[derive(Debug, serde::Serialize)]
pub struct PollState {
    pub poll: PollRow,
    pub tally: Tally,
}

/// Validate and create a poll. The expected participant count defaults to the
/// number of active subscribers when the caller does not pin one.
#[allow(clippy::too_many_arguments)]
pub async fn create_poll(
    state: &AppState,
    id: &str,
    chat_id: i64,
    question: &str,
    options: &[String],
    creator_id: i64,
    expected_voters: Option<i64>,
) -> Result<PollRow, CoreError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CoreError::BadRequest("poll id must not be empty".into()));
    }
    let question = question.trim();
    if question.is_empty() {
        return Err(CoreError::BadRequest("question must not be empty".into()));
    }
    if options.is_empty() {
        return Err(CoreError::BadRequest("at least one option is required".into()));
    }
    if options.len() > MAX_OPTIONS {
        return Err(CoreError::BadRequest(format!(
            "at most {MAX_OPTIONS} options are allowed"
        )));
    }
    let options: Vec<String> = options.iter().map(|label| label.trim().to_string()).collect();
    if options.iter().any(String::is_empty) {
        return Err(CoreError::BadRequest("option labels must not be empty".into()));
    }

    if quorum_db::polls::get_poll(&state.db, id).await?.is_some() {
        return Err(CoreError::Conflict("poll id already in use".into()));
    }
    if let Some(open) = quorum_db::polls::get_open_poll_for_chat(&state.db, chat_id).await? {
        return Err(CoreError::Conflict(format!(
            "chat already has an open poll ({})",
            open.id
        )));
    }

    let expected = match expected_voters {
        Some(count) if count >= 1 => count,
        Some(_) => {
            return Err(CoreError::BadRequest(
                "expected participant count must be at least 1".into(),
            ))
        }
        None => {
            let subscribed = quorum_db::subscribers::count_active(&state.db).await?;
            if subscribed == 0 {
                return Err(CoreError::BadRequest(
                    "no active subscribers to derive the participant count from".into(),
                ));
            }
            subscribed
        }
    };

    let poll = quorum_db::polls::create_poll(
        &state.db,
        id,
        chat_id,
        question,
        &options,
        creator_id,
        expected,
        Utc::now(),
    )
    .await?;
    tracing::info!(poll_id = %poll.id, chat_id, expected, "poll created");
    Ok(poll)
}

/// Bind the transport's message references once the poll has been posted.
pub async fn register_messages(
    state: &AppState,
    poll_id: &str,
    poll_message_id: Option<i64>,
    pinned_message_id: Option<i64>,
) -> Result<(), CoreError> {
    let updated =
        quorum_db::polls::set_poll_messages(&state.db, poll_id, poll_message_id, pinned_message_id)
            .await?;
    if !updated {
        return Err(CoreError::NotFound);
    }
    Ok(())
}

/// Close an open poll without a winner.
pub async fn abandon(state: &AppState, poll_id: &str) -> Result<PollRow, CoreError> {
    let closed = quorum_db::polls::abandon_poll(&state.db, poll_id, Utc::now()).await?;
    if !closed {
        return match quorum_db::polls::get_poll(&state.db, poll_id).await? {
            Some(_) => Err(CoreError::Conflict("poll is already closed".into())),
            None => Err(CoreError::NotFound),
        };
    }
    let poll = quorum_db::polls::get_poll(&state.db, poll_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    tracing::info!(poll_id = %poll.id, "poll abandoned");
    Ok(poll)
}

async fn build_state(state: &AppState, poll: PollRow) -> Result<PollState, CoreError> {
    let votes = quorum_db::polls::list_votes(&state.db, &poll.id).await?;
    let selections: Vec<Vec<i64>> = votes
        .into_iter()
        .map(|vote| vote.option_indices.0)
        .collect();
    let tally = Tally::compute(poll.options.0.len(), &selections);
    Ok(PollState { poll, tally })
}

pub async fn poll_state(state: &AppState, poll_id: &str) -> Result<PollState, CoreError> {
    let poll = quorum_db::polls::get_poll(&state.db, poll_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    build_state(state, poll).await
}

/// The chat's open poll with its live tally, if one exists.
pub async fn active_poll(state: &AppState, chat_id: i64) -> Result<Option<PollState>, CoreError> {
    match quorum_db::polls::get_open_poll_for_chat(&state.db, chat_id).await? {
        Some(poll) => Ok(Some(build_state(state, poll).await?)),
        None => Ok(None),
    }
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

    fn labels(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn rejects_malformed_polls() {
        let state = test_state().await;

        let empty_options = create_poll(&state, "p1", -1, "when?", &[], 7, Some(3)).await;
        assert!(matches!(empty_options, Err(CoreError::BadRequest(_))));

        let too_many: Vec<String> = (0..=MAX_OPTIONS).map(|i| format!("slot {i}")).collect();
        let overflow = create_poll(&state, "p1", -1, "when?", &too_many, 7, Some(3)).await;
        assert!(matches!(overflow, Err(CoreError::BadRequest(_))));

        let blank_label =
            create_poll(&state, "p1", -1, "when?", &labels(&["Mon", "  "]), 7, Some(3)).await;
        assert!(matches!(blank_label, Err(CoreError::BadRequest(_))));

        let zero_expected =
            create_poll(&state, "p1", -1, "when?", &labels(&["Mon"]), 7, Some(0)).await;
        assert!(matches!(zero_expected, Err(CoreError::BadRequest(_))));
    }

    #[tokio::test]
    async fn one_open_poll_per_chat() {
        let state = test_state().await;
        create_poll(&state, "p1", -1, "when?", &labels(&["Mon", "Tue"]), 7, Some(3))
            .await
            .expect("first poll");

        let second =
            create_poll(&state, "p2", -1, "when else?", &labels(&["Wed"]), 7, Some(3)).await;
        assert!(matches!(second, Err(CoreError::Conflict(_))));

        // a different chat is unaffected
        create_poll(&state, "p3", -2, "when?", &labels(&["Mon"]), 7, Some(3))
            .await
            .expect("other chat");

        // closing the first frees the chat again
        abandon(&state, "p1").await.expect("abandon");
        create_poll(&state, "p4", -1, "retry", &labels(&["Mon"]), 7, Some(3))
            .await
            .expect("after close");
    }

    #[tokio::test]
    async fn poll_ids_are_unique_across_chats() {
        let state = test_state().await;
        create_poll(&state, "p1", -1, "when?", &labels(&["Mon"]), 7, Some(3))
            .await
            .expect("first");

        let duplicate = create_poll(&state, "p1", -2, "when?", &labels(&["Mon"]), 7, Some(3)).await;
        assert!(matches!(duplicate, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn expected_count_defaults_to_active_subscribers() {
        let state = test_state().await;
        let now = Utc::now();
        for user in [10, 11, 12] {
            quorum_db::subscribers::activate(&state.db, user, now)
                .await
                .expect("subscribe");
        }
        quorum_db::subscribers::deactivate(&state.db, 12, now)
            .await
            .expect("unsubscribe");

        let poll = create_poll(&state, "p1", -1, "when?", &labels(&["Mon"]), 7, None)
            .await
            .expect("poll");
        assert_eq!(poll.expected_voters, 2);
    }

    #[tokio::test]
    async fn default_count_requires_subscribers() {
        let state = test_state().await;
        let missing = create_poll(&state, "p1", -1, "when?", &labels(&["Mon"]), 7, None).await;
        assert!(matches!(missing, Err(CoreError::BadRequest(_))));
    }

    #[tokio::test]
    async fn active_poll_carries_the_live_tally() {
        let state = test_state().await;
        create_poll(&state, "p1", -1, "when?", &labels(&["Mon", "Tue"]), 7, Some(4))
            .await
            .expect("poll");
        crate::voting::submit_vote(&state, "p1", 1, &[0])
            .await
            .expect("vote");
        crate::voting::submit_vote(&state, "p1", 2, &[1])
            .await
            .expect("vote");

        let active = active_poll(&state, -1)
            .await
            .expect("lookup")
            .expect("open poll");
        assert_eq!(active.poll.id, "p1");
        assert_eq!(active.tally.counts, vec![1, 1]);
        assert_eq!(active.tally.voters, 2);

        assert!(active_poll(&state, -99).await.expect("lookup").is_none());
    }
}
