use crate::{meetings, meetings::MeetingRow, tasks, DbError, DbPool};
use chrono::{DateTime, Duration, Utc};
use quorum_models::{ConfirmationStatus, TaskPayload};
use sqlx::types::Json;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct ConfirmationRow {
    pub id: i64,
    pub chat_id: i64,
    pub poll_id: Option<String>,
    pub source_task_id: i64,
    pub winning_text: String,
    pub meeting_time: DateTime<Utc>,
    pub pinned_message_id: Option<i64>,
    pub prompt_message_id: Option<i64>,
    pub all_voters: Json<Vec<i64>>,
    pub confirmed: Json<Vec<i64>>,
    pub declined: Json<Vec<i64>>,
    pub status: String,
    pub completion_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ConfirmationRow {
    pub fn is_pending(&self) -> bool {
        self.status == ConfirmationStatus::Pending.as_str()
    }

    /// Voters who have not responded yet.
    pub fn awaiting(&self) -> Vec<i64> {
        self.all_voters
            .0
            .iter()
            .copied()
            .filter(|id| !self.confirmed.0.contains(id) && !self.declined.0.contains(id))
            .collect()
    }
}

/// Outcome of a confirm/decline response, with the round after the write.
#[derive(Debug)]
pub enum ResponseReview {
    /// The round already left `pending`; nothing was stored.
    NotPending { round: ConfirmationRow },
    /// The user is not in the round's voter snapshot; nothing was stored.
    NotEligible { round: ConfirmationRow },
    /// Confirmation stored; the round keeps waiting.
    Acknowledged { round: ConfirmationRow },
    /// Decline stored; automatic completion is blocked from here on.
    Declined { round: ConfirmationRow },
    /// The last confirmation arrived: round completed, meeting finalized.
    Completed {
        round: ConfirmationRow,
        meeting: MeetingRow,
    },
}

async fn fetch_round(
    conn: &mut sqlx::SqliteConnection,
    confirmation_id: i64,
) -> Result<Option<ConfirmationRow>, DbError> {
    let row = sqlx::query_as::<_, ConfirmationRow>(
        "SELECT id, chat_id, poll_id, source_task_id, winning_text, meeting_time,
                pinned_message_id, prompt_message_id, all_voters, confirmed, declined,
                status, completion_message_id, created_at, resolved_at
         FROM immediate_confirmations
         WHERE id = ?1",
    )
    .bind(confirmation_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

async fn fetch_by_source_task(
    conn: &mut sqlx::SqliteConnection,
    source_task_id: i64,
) -> Result<Option<ConfirmationRow>, DbError> {
    let row = sqlx::query_as::<_, ConfirmationRow>(
        "SELECT id, chat_id, poll_id, source_task_id, winning_text, meeting_time,
                pinned_message_id, prompt_message_id, all_voters, confirmed, declined,
                status, completion_message_id, created_at, resolved_at
         FROM immediate_confirmations
         WHERE source_task_id = ?1",
    )
    .bind(source_task_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn get_round(
    pool: &DbPool,
    confirmation_id: i64,
) -> Result<Option<ConfirmationRow>, DbError> {
    let mut conn = pool.acquire().await?;
    fetch_round(&mut conn, confirmation_id).await
}

pub async fn get_round_by_prompt(
    pool: &DbPool,
    chat_id: i64,
    prompt_message_id: i64,
) -> Result<Option<ConfirmationRow>, DbError> {
    let row = sqlx::query_as::<_, ConfirmationRow>(
        "SELECT id, chat_id, poll_id, source_task_id, winning_text, meeting_time,
                pinned_message_id, prompt_message_id, all_voters, confirmed, declined,
                status, completion_message_id, created_at, resolved_at
         FROM immediate_confirmations
         WHERE chat_id = ?1
           AND prompt_message_id = ?2",
    )
    .bind(chat_id)
    .bind(prompt_message_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Open a confirmation round for a fired confirmation task, or return the
/// round that task already opened. The source task id is the convergence key:
/// a redelivered task lands on the same row instead of opening a second
/// round. Only the call that actually created the round arms the followup
/// nudge, in the same transaction, so redelivery cannot duplicate it. The
/// voter snapshot is stored sorted and deduplicated.
#[allow(clippy::too_many_arguments)]
pub async fn open_round(
    pool: &DbPool,
    chat_id: i64,
    poll_id: Option<&str>,
    source_task_id: i64,
    winning_text: &str,
    meeting_time: DateTime<Utc>,
    pinned_message_id: Option<i64>,
    all_voters: &[i64],
    followup_due: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(ConfirmationRow, bool), DbError> {
    let mut voters = all_voters.to_vec();
    voters.sort_unstable();
    voters.dedup();

    let mut tx = pool.begin().await?;
    let inserted = sqlx::query_as::<_, ConfirmationRow>(
        "INSERT INTO immediate_confirmations
             (chat_id, poll_id, source_task_id, winning_text, meeting_time,
              pinned_message_id, all_voters, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(source_task_id) DO NOTHING
         RETURNING id, chat_id, poll_id, source_task_id, winning_text, meeting_time,
                   pinned_message_id, prompt_message_id, all_voters, confirmed, declined,
                   status, completion_message_id, created_at, resolved_at",
    )
    .bind(chat_id)
    .bind(poll_id)
    .bind(source_task_id)
    .bind(winning_text)
    .bind(meeting_time)
    .bind(pinned_message_id)
    .bind(Json(voters))
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let (round, created) = match inserted {
        Some(round) => {
            tasks::enqueue_on(
                &mut tx,
                chat_id,
                poll_id,
                &TaskPayload::Followup {
                    confirmation_id: round.id,
                },
                followup_due,
                now,
            )
            .await?;
            (round, true)
        }
        None => {
            let round = fetch_by_source_task(&mut tx, source_task_id)
                .await?
                .ok_or(DbError::NotFound)?;
            (round, false)
        }
    };
    tx.commit().await?;
    Ok((round, created))
}

/// Record one confirm/decline response. The latest response wins: the user is
/// removed from both sets and re-added to the chosen one. When the write
/// makes every snapshot voter a confirmer with nobody declining, the round
/// completes, the meeting is finalized and the unpin follow-up is armed, all
/// in the transaction of the response itself.
pub async fn record_response(
    pool: &DbPool,
    confirmation_id: i64,
    user_id: i64,
    confirm: bool,
    unpin_delay: Duration,
    now: DateTime<Utc>,
) -> Result<ResponseReview, DbError> {
    let mut tx = pool.begin().await?;

    let Some(round) = fetch_round(&mut tx, confirmation_id).await? else {
        return Err(DbError::NotFound);
    };
    if !round.is_pending() {
        return Ok(ResponseReview::NotPending { round });
    }
    if !round.all_voters.0.contains(&user_id) {
        return Ok(ResponseReview::NotEligible { round });
    }

    let mut confirmed_set = round.confirmed.0.clone();
    let mut declined_set = round.declined.0.clone();
    confirmed_set.retain(|id| *id != user_id);
    declined_set.retain(|id| *id != user_id);
    if confirm {
        confirmed_set.push(user_id);
        confirmed_set.sort_unstable();
    } else {
        declined_set.push(user_id);
        declined_set.sort_unstable();
    }

    // both sides sorted, so set equality is plain equality
    let unanimous = declined_set.is_empty() && confirmed_set == round.all_voters.0;

    if unanimous {
        sqlx::query(
            "UPDATE immediate_confirmations
             SET confirmed = ?2, declined = ?3, status = 'completed', resolved_at = ?4
             WHERE id = ?1",
        )
        .bind(confirmation_id)
        .bind(Json(confirmed_set))
        .bind(Json(declined_set))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let (meeting, _created) = meetings::finalize_on(
            &mut tx,
            round.chat_id,
            round.poll_id.as_deref(),
            round.meeting_time,
            &round.winning_text,
            round.prompt_message_id,
            round.pinned_message_id,
            now,
        )
        .await?;

        if let Some(message_id) = round.pinned_message_id {
            tasks::enqueue_on(
                &mut tx,
                round.chat_id,
                round.poll_id.as_deref(),
                &TaskPayload::UnpinMessage { message_id },
                round.meeting_time + unpin_delay,
                now,
            )
            .await?;
        }

        let round = fetch_round(&mut tx, confirmation_id)
            .await?
            .ok_or(DbError::NotFound)?;
        tx.commit().await?;
        return Ok(ResponseReview::Completed { round, meeting });
    }

    sqlx::query(
        "UPDATE immediate_confirmations
         SET confirmed = ?2, declined = ?3
         WHERE id = ?1",
    )
    .bind(confirmation_id)
    .bind(Json(confirmed_set))
    .bind(Json(declined_set))
    .execute(&mut *tx)
    .await?;

    let round = fetch_round(&mut tx, confirmation_id)
        .await?
        .ok_or(DbError::NotFound)?;
    tx.commit().await?;
    Ok(if confirm {
        ResponseReview::Acknowledged { round }
    } else {
        ResponseReview::Declined { round }
    })
}

/// Move a pending round to `cancelled`. False when the round already left
/// `pending`, which keeps cancellation races with completion harmless.
pub async fn cancel_round(
    pool: &DbPool,
    confirmation_id: i64,
    now: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE immediate_confirmations
         SET status = 'cancelled', resolved_at = ?2
         WHERE id = ?1
           AND status = 'pending'",
    )
    .bind(confirmation_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn bind_prompt_message(
    pool: &DbPool,
    confirmation_id: i64,
    message_id: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE immediate_confirmations
         SET prompt_message_id = ?2
         WHERE id = ?1",
    )
    .bind(confirmation_id)
    .bind(message_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_completion_message(
    pool: &DbPool,
    confirmation_id: i64,
    message_id: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE immediate_confirmations
         SET completion_message_id = ?2
         WHERE id = ?1",
    )
    .bind(confirmation_id)
    .bind(message_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn pending_for_chat(
    pool: &DbPool,
    chat_id: i64,
) -> Result<Vec<ConfirmationRow>, DbError> {
    let rows = sqlx::query_as::<_, ConfirmationRow>(
        "SELECT id, chat_id, poll_id, source_task_id, winning_text, meeting_time,
                pinned_message_id, prompt_message_id, all_voters, confirmed, declined,
                status, completion_message_id, created_at, resolved_at
         FROM immediate_confirmations
         WHERE chat_id = ?1
           AND status = 'pending'
         ORDER BY created_at ASC, id ASC",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Sweep pending rounds created before the cutoff to `expired`. Conditional
/// on `status = 'pending'`, so a response landing first wins the row.
pub async fn expire_stale(
    pool: &DbPool,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE immediate_confirmations
         SET status = 'expired', resolved_at = ?2
         WHERE status = 'pending'
           AND created_at <= ?1",
    )
    .bind(cutoff)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn purge_terminal_older_than(
    pool: &DbPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM immediate_confirmations
         WHERE id IN (
             SELECT id FROM immediate_confirmations
             WHERE status != 'pending'
               AND resolved_at <= ?1
             ORDER BY resolved_at ASC
             LIMIT ?2
         )",
    )
    .bind(cutoff)
    .bind(limit.max(1))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNPIN_DELAY: Duration = Duration::hours(10);

    async fn test_pool() -> DbPool {
        let pool = crate::create_pool("sqlite::memory:", 1).await.expect("pool");
        crate::run_migrations(&pool).await.expect("migrations");
        pool
    }

    async fn open_test_round(
        db: &DbPool,
        source_task_id: i64,
        voters: &[i64],
        now: DateTime<Utc>,
    ) -> ConfirmationRow {
        let (round, created) = open_round(
            db,
            -100,
            Some("poll-1"),
            source_task_id,
            "Mon 15:00",
            now + Duration::hours(24),
            Some(556),
            voters,
            now + Duration::minutes(30),
            now,
        )
        .await
        .expect("open round");
        assert!(created);
        round
    }

    fn task_kinds(tasks: &[crate::tasks::TaskRow]) -> Vec<&str> {
        tasks.iter().map(|t| t.kind.as_str()).collect()
    }

    #[tokio::test]
    async fn three_voters_complete_only_after_everyone_confirms() {
        let db = test_pool().await;
        let now = Utc::now();
        let round = open_test_round(&db, 900, &[3, 1, 2], now).await;
        // snapshot is stored sorted
        assert_eq!(round.all_voters.0, vec![1, 2, 3]);
        bind_prompt_message(&db, round.id, 777).await.expect("bind");

        let first = record_response(&db, round.id, 1, true, UNPIN_DELAY, now)
            .await
            .expect("respond");
        let ResponseReview::Acknowledged { round: after_first } = first else {
            panic!("expected acknowledgement, got {first:?}");
        };
        assert_eq!(after_first.awaiting(), vec![2, 3]);

        let second = record_response(&db, round.id, 2, true, UNPIN_DELAY, now)
            .await
            .expect("respond");
        assert!(matches!(second, ResponseReview::Acknowledged { .. }));

        let third = record_response(&db, round.id, 3, true, UNPIN_DELAY, now)
            .await
            .expect("respond");
        let ResponseReview::Completed { round: done, meeting } = third else {
            panic!("expected completion, got {third:?}");
        };
        assert!(!done.is_pending());
        assert_eq!(done.status, "completed");
        assert!(done.resolved_at.is_some());
        assert_eq!(meeting.poll_id.as_deref(), Some("poll-1"));
        assert_eq!(meeting.winning_text, "Mon 15:00");
        assert_eq!(meeting.confirmation_message_id, Some(777));

        // completion armed the unpin follow-up next to the open-time nudge
        let pending = crate::tasks::pending_for_chat(&db, -100).await.expect("tasks");
        assert_eq!(task_kinds(&pending), vec!["followup", "unpin_message"]);
        let unpin = &pending[1];
        assert_eq!(unpin.due_at, done.meeting_time + UNPIN_DELAY);
        assert_eq!(
            unpin.payload.0,
            TaskPayload::UnpinMessage { message_id: 556 }
        );
    }

    #[tokio::test]
    async fn one_decline_blocks_completion_until_cancelled() {
        let db = test_pool().await;
        let now = Utc::now();
        let round = open_test_round(&db, 901, &[1, 2, 3], now).await;

        record_response(&db, round.id, 1, true, UNPIN_DELAY, now)
            .await
            .expect("u1");
        record_response(&db, round.id, 2, true, UNPIN_DELAY, now)
            .await
            .expect("u2");
        let declined = record_response(&db, round.id, 3, false, UNPIN_DELAY, now)
            .await
            .expect("u3");
        let ResponseReview::Declined { round: flagged } = declined else {
            panic!("expected decline, got {declined:?}");
        };
        // everyone answered but the round must not complete
        assert!(flagged.is_pending());
        assert!(flagged.awaiting().is_empty());
        assert_eq!(flagged.declined.0, vec![3]);
        assert!(
            crate::meetings::get_by_poll(&db, "poll-1")
                .await
                .expect("meeting lookup")
                .is_none()
        );

        // cancellation is the separate, explicit path
        assert!(cancel_round(&db, round.id, now).await.expect("cancel"));
        assert!(!cancel_round(&db, round.id, now).await.expect("cancel again"));
        let cancelled = get_round(&db, round.id).await.expect("get").expect("row");
        assert_eq!(cancelled.status, "cancelled");

        let late = record_response(&db, round.id, 1, true, UNPIN_DELAY, now)
            .await
            .expect("late");
        assert!(matches!(late, ResponseReview::NotPending { .. }));
    }

    #[tokio::test]
    async fn latest_response_wins_and_can_still_complete() {
        let db = test_pool().await;
        let now = Utc::now();
        let round = open_test_round(&db, 902, &[1, 2], now).await;

        let refusal = record_response(&db, round.id, 1, false, UNPIN_DELAY, now)
            .await
            .expect("decline");
        assert!(matches!(refusal, ResponseReview::Declined { .. }));

        let changed = record_response(&db, round.id, 1, true, UNPIN_DELAY, now)
            .await
            .expect("switch");
        let ResponseReview::Acknowledged { round: after } = changed else {
            panic!("expected acknowledgement, got {changed:?}");
        };
        assert_eq!(after.confirmed.0, vec![1]);
        assert!(after.declined.0.is_empty());

        let last = record_response(&db, round.id, 2, true, UNPIN_DELAY, now)
            .await
            .expect("final");
        assert!(matches!(last, ResponseReview::Completed { .. }));
    }

    #[tokio::test]
    async fn outsiders_cannot_respond() {
        let db = test_pool().await;
        let now = Utc::now();
        let round = open_test_round(&db, 903, &[1, 2], now).await;

        let outsider = record_response(&db, round.id, 99, true, UNPIN_DELAY, now)
            .await
            .expect("outsider");
        let ResponseReview::NotEligible { round: untouched } = outsider else {
            panic!("expected rejection, got {outsider:?}");
        };
        assert!(untouched.confirmed.0.is_empty());
        assert!(untouched.declined.0.is_empty());
    }

    #[tokio::test]
    async fn refired_task_converges_on_the_same_round() {
        let db = test_pool().await;
        let now = Utc::now();
        let round = open_test_round(&db, 904, &[1, 2], now).await;

        let (again, created) = open_round(
            &db,
            -100,
            Some("poll-1"),
            904,
            "Mon 15:00",
            now + Duration::hours(24),
            Some(556),
            &[1, 2],
            now + Duration::minutes(30),
            now,
        )
        .await
        .expect("reopen");
        assert!(!created);
        assert_eq!(again.id, round.id);

        // the nudge was armed once, by the call that created the round
        let pending = crate::tasks::pending_for_chat(&db, -100).await.expect("tasks");
        assert_eq!(task_kinds(&pending), vec!["followup"]);
    }

    #[tokio::test]
    async fn stale_pending_rounds_are_swept_to_expired() {
        let db = test_pool().await;
        let now = Utc::now();
        let opened_at = now - Duration::hours(25);
        let round = open_test_round(&db, 905, &[1, 2], opened_at).await;
        open_test_round(&db, 906, &[1, 2], now).await;

        let swept = expire_stale(&db, now - Duration::hours(24), now)
            .await
            .expect("sweep");
        assert_eq!(swept, 1);

        let expired = get_round(&db, round.id).await.expect("get").expect("row");
        assert_eq!(expired.status, "expired");
        let response = record_response(&db, round.id, 1, true, UNPIN_DELAY, now)
            .await
            .expect("respond");
        assert!(matches!(response, ResponseReview::NotPending { .. }));

        let still_pending = pending_for_chat(&db, -100).await.expect("pending");
        assert_eq!(still_pending.len(), 1);
    }

    #[tokio::test]
    async fn purge_drops_only_old_terminal_rounds() {
        let db = test_pool().await;
        let now = Utc::now();
        let old = now - Duration::days(8);

        let terminal = open_test_round(&db, 907, &[1], old).await;
        cancel_round(&db, terminal.id, old).await.expect("cancel");
        let pending = open_test_round(&db, 908, &[1], now).await;

        let removed = purge_terminal_older_than(&db, now - Duration::days(7), 100)
            .await
            .expect("purge");
        assert_eq!(removed, 1);
        assert!(get_round(&db, terminal.id).await.expect("get").is_none());
        assert!(get_round(&db, pending.id).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn prompt_message_lookup_round_trips() {
        let db = test_pool().await;
        let now = Utc::now();
        let round = open_test_round(&db, 909, &[1, 2], now).await;

        assert!(bind_prompt_message(&db, round.id, 881).await.expect("bind"));
        let found = get_round_by_prompt(&db, -100, 881)
            .await
            .expect("lookup")
            .expect("row");
        assert_eq!(found.id, round.id);

        assert!(get_round_by_prompt(&db, -100, 999)
            .await
            .expect("lookup")
            .is_none());
    }
}
