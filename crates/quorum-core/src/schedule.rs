use crate::error::CoreError;
use crate::{AppState, RuntimeSettings};
use chrono::{DateTime, Utc};
use quorum_db::tasks::TaskRow;
use quorum_models::{TaskKind, TaskPayload};

/// When the confirmation prompt for a meeting should fire, or None for
/// meetings too close to bother: the full lead time when the meeting is
/// strictly further out than that, the short lead time when it is at least
/// the minimum away, nothing below that.
pub fn confirmation_due(
    settings: &RuntimeSettings,
    now: DateTime<Utc>,
    meeting_time: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let until = meeting_time - now;
    if until > settings.confirmation_lead_far {
        Some(meeting_time - settings.confirmation_lead_far)
    } else if until >= settings.confirmation_min_lead {
        Some(meeting_time - settings.confirmation_lead_near)
    } else {
        None
    }
}

/// Arm the pre-meeting confirmation for a resolved poll. Returns the enqueued
/// task, or None when the meeting is too close for a confirmation round.
pub async fn schedule_meeting(
    state: &AppState,
    poll_id: &str,
    meeting_time: DateTime<Utc>,
    pinned_message_id: Option<i64>,
) -> Result<Option<TaskRow>, CoreError> {
    let poll = quorum_db::polls::get_poll(&state.db, poll_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if !poll.is_closed {
        return Err(CoreError::Conflict("poll has not resolved yet".into()));
    }
    let Some(winner) = poll.winning_option_index else {
        return Err(CoreError::Conflict("poll closed without a winner".into()));
    };
    let winning_text = poll
        .option_text(winner)
        .ok_or_else(|| {
            CoreError::Invariant(format!(
                "winning option {winner} is out of range for poll {poll_id}"
            ))
        })?
        .to_string();

    let now = Utc::now();
    if meeting_time <= now {
        return Err(CoreError::BadRequest("meeting time must be in the future".into()));
    }
    if quorum_db::meetings::get_by_poll(&state.db, poll_id).await?.is_some() {
        return Err(CoreError::Conflict(
            "meeting already finalized for this poll".into(),
        ));
    }
    if quorum_db::tasks::exists_pending_for_poll(&state.db, TaskKind::Confirmation, poll_id).await?
    {
        return Err(CoreError::Conflict(
            "a confirmation is already scheduled for this poll".into(),
        ));
    }
    let Some(due) = confirmation_due(&state.settings, now, meeting_time) else {
        tracing::info!(poll_id, meeting_time = %meeting_time, "meeting too close for a confirmation round");
        return Ok(None);
    };

    let task = quorum_db::tasks::enqueue(
        &state.db,
        poll.chat_id,
        Some(poll_id),
        &TaskPayload::Confirmation {
            poll_id: poll_id.to_string(),
            winning_text,
            meeting_time,
            pinned_message_id: pinned_message_id.or(poll.pinned_message_id),
        },
        due,
        now,
    )
    .await?;
    tracing::info!(poll_id, task_id = task.id, due_at = %task.due_at, "confirmation task scheduled");
    Ok(Some(task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeSettings;
    use chrono::Duration;

    #[test]
    fn far_meetings_use_the_full_lead_time() {
        let settings = RuntimeSettings::default();
        let now = Utc::now();
        let meeting = now + Duration::hours(48);
        assert_eq!(
            confirmation_due(&settings, now, meeting),
            Some(meeting - Duration::hours(24))
        );
        // exactly 24 h out is not "more than 24 h away": short lead applies
        let boundary = now + Duration::hours(24);
        assert_eq!(
            confirmation_due(&settings, now, boundary),
            Some(boundary - Duration::hours(4))
        );
    }

    #[test]
    fn near_meetings_use_the_short_lead_time() {
        let settings = RuntimeSettings::default();
        let now = Utc::now();
        let meeting = now + Duration::hours(10);
        assert_eq!(
            confirmation_due(&settings, now, meeting),
            Some(meeting - Duration::hours(4))
        );
        let boundary = now + Duration::hours(4);
        assert_eq!(
            confirmation_due(&settings, now, boundary),
            Some(now)
        );
    }

    #[test]
    fn imminent_meetings_are_skipped() {
        let settings = RuntimeSettings::default();
        let now = Utc::now();
        assert_eq!(confirmation_due(&settings, now, now + Duration::hours(3)), None);
        assert_eq!(confirmation_due(&settings, now, now - Duration::hours(1)), None);
    }

    async fn test_state() -> AppState {
        let db = quorum_db::create_pool("sqlite::memory:", 1).await.expect("pool");
        quorum_db::run_migrations(&db).await.expect("migrations");
        AppState::new(db, RuntimeSettings::default())
    }

    async fn resolved_poll(state: &AppState) {
        let options = vec!["Mon 15:00".to_string(), "Tue 18:00".to_string()];
        crate::polls::create_poll(state, "p1", -1, "when?", &options, 7, Some(1))
            .await
            .expect("poll");
        crate::voting::submit_vote(state, "p1", 1, &[0])
            .await
            .expect("resolving vote");
    }

    #[tokio::test]
    async fn scheduling_requires_a_resolved_poll() {
        let state = test_state().await;
        let options = vec!["Mon".to_string()];
        crate::polls::create_poll(&state, "p1", -1, "when?", &options, 7, Some(3))
            .await
            .expect("poll");

        let open = schedule_meeting(&state, "p1", Utc::now() + Duration::hours(48), None).await;
        assert!(matches!(open, Err(CoreError::Conflict(_))));

        crate::polls::abandon(&state, "p1").await.expect("abandon");
        let no_winner =
            schedule_meeting(&state, "p1", Utc::now() + Duration::hours(48), None).await;
        assert!(matches!(no_winner, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn scheduling_enqueues_the_confirmation_task() {
        let state = test_state().await;
        resolved_poll(&state).await;
        let meeting = Utc::now() + Duration::hours(48);

        let task = schedule_meeting(&state, "p1", meeting, Some(556))
            .await
            .expect("schedule")
            .expect("task");
        assert_eq!(task.kind, "confirmation");
        assert_eq!(task.due_at, meeting - Duration::hours(24));
        assert_eq!(
            task.payload.0,
            TaskPayload::Confirmation {
                poll_id: "p1".to_string(),
                winning_text: "Mon 15:00".to_string(),
                meeting_time: meeting,
                pinned_message_id: Some(556),
            }
        );
    }

    #[tokio::test]
    async fn imminent_meetings_schedule_nothing() {
        let state = test_state().await;
        resolved_poll(&state).await;

        let skipped = schedule_meeting(&state, "p1", Utc::now() + Duration::hours(2), None)
            .await
            .expect("schedule");
        assert!(skipped.is_none());

        let past = schedule_meeting(&state, "p1", Utc::now() - Duration::hours(1), None).await;
        assert!(matches!(past, Err(CoreError::BadRequest(_))));
    }

    #[tokio::test]
    async fn scheduling_twice_conflicts() {
        let state = test_state().await;
        resolved_poll(&state).await;
        let meeting = Utc::now() + Duration::hours(48);

        schedule_meeting(&state, "p1", meeting, None)
            .await
            .expect("schedule")
            .expect("task");

        let again = schedule_meeting(&state, "p1", meeting, None).await;
        assert!(matches!(again, Err(CoreError::Conflict(_))));
    }
}
