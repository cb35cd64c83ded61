use crate::{tasks, DbError, DbPool};
use chrono::{DateTime, Duration, Utc};
use quorum_models::{ForceResolution, Tally, TaskPayload, VoteOutcome};
use sqlx::types::Json;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct PollRow {
    pub id: String,
    pub chat_id: i64,
    pub question: String,
    pub options: Json<Vec<String>>,
    pub creator_id: i64,
    pub expected_voters: i64,
    pub poll_message_id: Option<i64>,
    pub pinned_message_id: Option<i64>,
    pub is_closed: bool,
    pub winning_option_index: Option<i64>,
    pub in_revote: bool,
    pub tie_signature: Option<String>,
    pub tie_announce_count: i64,
    pub last_tie_announced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl PollRow {
    pub fn option_text(&self, index: i64) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.options.0.get(i))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct VoteRow {
    pub poll_id: String,
    pub user_id: i64,
    pub option_indices: Json<Vec<i64>>,
    pub voted_at: DateTime<Utc>,
}

/// A vote write together with the consensus decision it triggered.
#[derive(Debug, serde::Serialize)]
pub struct VoteReview {
    pub poll: PollRow,
    pub outcome: VoteOutcome,
}

/// A voting-timeout resolution and the poll's state afterwards.
#[derive(Debug, serde::Serialize)]
pub struct ForceReview {
    pub poll: PollRow,
    pub resolution: ForceResolution,
}

#[allow(clippy::too_many_arguments)]
pub async fn create_poll(
    pool: &DbPool,
    id: &str,
    chat_id: i64,
    question: &str,
    options: &[String],
    creator_id: i64,
    expected_voters: i64,
    now: DateTime<Utc>,
) -> Result<PollRow, DbError> {
    let row = sqlx::query_as::<_, PollRow>(
        "INSERT INTO polls (id, chat_id, question, options, creator_id, expected_voters, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING id, chat_id, question, options, creator_id, expected_voters,
                   poll_message_id, pinned_message_id, is_closed, winning_option_index,
                   in_revote, tie_signature, tie_announce_count, last_tie_announced_at,
                   created_at, closed_at",
    )
    .bind(id)
    .bind(chat_id)
    .bind(question)
    .bind(Json(options.to_vec()))
    .bind(creator_id)
    .bind(expected_voters)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

async fn fetch_poll(
    conn: &mut sqlx::SqliteConnection,
    poll_id: &str,
) -> Result<Option<PollRow>, DbError> {
    let row = sqlx::query_as::<_, PollRow>(
        "SELECT id, chat_id, question, options, creator_id, expected_voters,
                poll_message_id, pinned_message_id, is_closed, winning_option_index,
                in_revote, tie_signature, tie_announce_count, last_tie_announced_at,
                created_at, closed_at
         FROM polls
         WHERE id = ?1",
    )
    .bind(poll_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn get_poll(pool: &DbPool, poll_id: &str) -> Result<Option<PollRow>, DbError> {
    let mut conn = pool.acquire().await?;
    fetch_poll(&mut conn, poll_id).await
}

/// The chat's current open poll, if any. "Active poll" is always derived from
/// storage, never cached, so it survives restarts.
pub async fn get_open_poll_for_chat(
    pool: &DbPool,
    chat_id: i64,
) -> Result<Option<PollRow>, DbError> {
    let row = sqlx::query_as::<_, PollRow>(
        "SELECT id, chat_id, question, options, creator_id, expected_voters,
                poll_message_id, pinned_message_id, is_closed, winning_option_index,
                in_revote, tie_signature, tie_announce_count, last_tie_announced_at,
                created_at, closed_at
         FROM polls
         WHERE chat_id = ?1
           AND is_closed = 0
         ORDER BY created_at DESC
         LIMIT 1",
    )
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Bind transport message references. Passing None keeps the stored value.
pub async fn set_poll_messages(
    pool: &DbPool,
    poll_id: &str,
    poll_message_id: Option<i64>,
    pinned_message_id: Option<i64>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE polls
         SET poll_message_id = COALESCE(?2, poll_message_id),
             pinned_message_id = COALESCE(?3, pinned_message_id)
         WHERE id = ?1",
    )
    .bind(poll_id)
    .bind(poll_message_id)
    .bind(pinned_message_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn clear_pinned_message(
    pool: &DbPool,
    chat_id: i64,
    message_id: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE polls
         SET pinned_message_id = NULL
         WHERE chat_id = ?1
           AND pinned_message_id = ?2",
    )
    .bind(chat_id)
    .bind(message_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Close an open poll without a winner.
pub async fn abandon_poll(pool: &DbPool, poll_id: &str, now: DateTime<Utc>) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE polls
         SET is_closed = 1, closed_at = ?2, in_revote = 0
         WHERE id = ?1
           AND is_closed = 0",
    )
    .bind(poll_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn fetch_votes(
    conn: &mut sqlx::SqliteConnection,
    poll_id: &str,
) -> Result<Vec<VoteRow>, DbError> {
    let rows = sqlx::query_as::<_, VoteRow>(
        "SELECT poll_id, user_id, option_indices, voted_at
         FROM poll_votes
         WHERE poll_id = ?1
         ORDER BY user_id ASC",
    )
    .bind(poll_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn list_votes(pool: &DbPool, poll_id: &str) -> Result<Vec<VoteRow>, DbError> {
    let mut conn = pool.acquire().await?;
    fetch_votes(&mut conn, poll_id).await
}

fn tied_labels(poll: &PollRow, tally: &Tally) -> Vec<String> {
    tally
        .leaders
        .iter()
        .filter_map(|&index| poll.option_text(index))
        .map(str::to_string)
        .collect()
}

/// Store (or replace) one user's vote and review the poll in the same
/// transaction. Resolution only runs once the distinct-voter count reaches
/// the poll's expected participant count; below that the write reports
/// progress. The tie-signature compare-and-update rides the vote write, so a
/// given tie is announced exactly once no matter how many votes re-trigger
/// it, and announcing also arms the revote-timeout task.
pub async fn record_vote(
    pool: &DbPool,
    poll_id: &str,
    user_id: i64,
    option_indices: &[i64],
    now: DateTime<Utc>,
    revote_timeout: Duration,
) -> Result<VoteReview, DbError> {
    let mut tx = pool.begin().await?;

    let Some(poll) = fetch_poll(&mut tx, poll_id).await? else {
        return Err(DbError::NotFound);
    };
    if poll.is_closed {
        return Ok(VoteReview {
            poll,
            outcome: VoteOutcome::PollClosed,
        });
    }

    sqlx::query(
        "INSERT INTO poll_votes (poll_id, user_id, option_indices, voted_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(poll_id, user_id) DO UPDATE SET
            option_indices = excluded.option_indices,
            voted_at = excluded.voted_at",
    )
    .bind(poll_id)
    .bind(user_id)
    .bind(Json(option_indices.to_vec()))
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let votes = fetch_votes(&mut tx, poll_id).await?;
    let selections: Vec<Vec<i64>> = votes.iter().map(|vote| vote.option_indices.0.clone()).collect();
    let tally = Tally::compute(poll.options.0.len(), &selections);

    let outcome = if tally.voters < poll.expected_voters {
        VoteOutcome::Progress {
            voters: tally.voters,
            expected: poll.expected_voters,
        }
    } else if let Some(winner) = tally.sole_leader() {
        sqlx::query(
            "UPDATE polls
             SET is_closed = 1, winning_option_index = ?2, closed_at = ?3,
                 in_revote = 0, tie_signature = NULL,
                 tie_announce_count = 0, last_tie_announced_at = NULL
             WHERE id = ?1
               AND is_closed = 0",
        )
        .bind(poll_id)
        .bind(winner)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        VoteOutcome::Resolved {
            winning_index: winner,
            winning_text: poll.option_text(winner).unwrap_or_default().to_string(),
        }
    } else {
        // voters >= expected >= 1 guarantees at least two tied leaders here
        let signature = tally.tie_signature.clone().unwrap_or_default();
        let tied = tied_labels(&poll, &tally);
        if poll.tie_signature.as_deref() == Some(signature.as_str()) {
            VoteOutcome::TieUnchanged { tied }
        } else {
            sqlx::query(
                "UPDATE polls
                 SET tie_signature = ?2, tie_announce_count = tie_announce_count + 1,
                     in_revote = 1, last_tie_announced_at = ?3
                 WHERE id = ?1",
            )
            .bind(poll_id)
            .bind(&signature)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            tasks::enqueue_on(
                &mut tx,
                poll.chat_id,
                Some(poll_id),
                &TaskPayload::PollVotingTimeout {
                    poll_id: poll_id.to_string(),
                },
                now + revote_timeout,
                now,
            )
            .await?;
            VoteOutcome::TieAnnounced {
                tied,
                round: poll.tie_announce_count + 1,
            }
        }
    };

    let poll = fetch_poll(&mut tx, poll_id).await?.ok_or(DbError::NotFound)?;
    tx.commit().await?;
    Ok(VoteReview { poll, outcome })
}

/// Resolve a poll whose revote window ran out: most votes wins, lowest index
/// among still-tied options, no votes at all abandons the poll. A poll that
/// closed in the meantime is left alone, which is what makes stale timeout
/// tasks harmless.
pub async fn force_resolve(
    pool: &DbPool,
    poll_id: &str,
    now: DateTime<Utc>,
) -> Result<ForceReview, DbError> {
    let mut tx = pool.begin().await?;

    let Some(poll) = fetch_poll(&mut tx, poll_id).await? else {
        return Err(DbError::NotFound);
    };
    if poll.is_closed {
        return Ok(ForceReview {
            poll,
            resolution: ForceResolution::AlreadyClosed,
        });
    }

    let votes = fetch_votes(&mut tx, poll_id).await?;
    let selections: Vec<Vec<i64>> = votes.iter().map(|vote| vote.option_indices.0.clone()).collect();
    let tally = Tally::compute(poll.options.0.len(), &selections);

    let resolution = if tally.voters == 0 {
        sqlx::query(
            "UPDATE polls
             SET is_closed = 1, closed_at = ?2, in_revote = 0
             WHERE id = ?1",
        )
        .bind(poll_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        ForceResolution::Abandoned
    } else {
        let winner = tally.leaders.iter().copied().min().unwrap_or(0);
        sqlx::query(
            "UPDATE polls
             SET is_closed = 1, winning_option_index = ?2, closed_at = ?3,
                 in_revote = 0, tie_signature = NULL,
                 tie_announce_count = 0, last_tie_announced_at = NULL
             WHERE id = ?1",
        )
        .bind(poll_id)
        .bind(winner)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        ForceResolution::Resolved {
            winning_index: winner,
            winning_text: poll.option_text(winner).unwrap_or_default().to_string(),
        }
    };

    let poll = fetch_poll(&mut tx, poll_id).await?.ok_or(DbError::NotFound)?;
    tx.commit().await?;
    Ok(ForceReview { poll, resolution })
}
