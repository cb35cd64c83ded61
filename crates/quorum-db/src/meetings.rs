use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct MeetingRow {
    pub id: i64,
    pub chat_id: i64,
    pub poll_id: Option<String>,
    pub meeting_time: DateTime<Utc>,
    pub winning_text: String,
    pub confirmation_message_id: Option<i64>,
    pub pinned_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

async fn fetch_by_poll(
    conn: &mut sqlx::SqliteConnection,
    poll_id: &str,
) -> Result<Option<MeetingRow>, DbError> {
    let row = sqlx::query_as::<_, MeetingRow>(
        "SELECT id, chat_id, poll_id, meeting_time, winning_text,
                confirmation_message_id, pinned_message_id, created_at
         FROM meetings
         WHERE poll_id = ?1",
    )
    .bind(poll_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Record the finalized meeting for a poll, or return the one already
/// recorded. The poll_id uniqueness makes finalization idempotent under
/// redelivery; the bool reports whether this call created the row. A repeat
/// request carrying a different meeting time is logged and ignored, the
/// stored row is never rewritten.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn finalize_on(
    conn: &mut sqlx::SqliteConnection,
    chat_id: i64,
    poll_id: Option<&str>,
    meeting_time: DateTime<Utc>,
    winning_text: &str,
    confirmation_message_id: Option<i64>,
    pinned_message_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<(MeetingRow, bool), DbError> {
    let inserted = sqlx::query_as::<_, MeetingRow>(
        "INSERT INTO meetings (chat_id, poll_id, meeting_time, winning_text,
                               confirmation_message_id, pinned_message_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(poll_id) DO NOTHING
         RETURNING id, chat_id, poll_id, meeting_time, winning_text,
                   confirmation_message_id, pinned_message_id, created_at",
    )
    .bind(chat_id)
    .bind(poll_id)
    .bind(meeting_time)
    .bind(winning_text)
    .bind(confirmation_message_id)
    .bind(pinned_message_id)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = inserted {
        return Ok((row, true));
    }

    // conflict is only possible on a concrete poll reference
    let poll_id = poll_id.ok_or(DbError::NotFound)?;
    let existing = fetch_by_poll(conn, poll_id).await?.ok_or(DbError::NotFound)?;
    if existing.meeting_time != meeting_time {
        tracing::error!(
            poll_id,
            stored = %existing.meeting_time,
            requested = %meeting_time,
            "meeting already finalized with a different time, keeping the stored row"
        );
    }
    Ok((existing, false))
}

#[allow(clippy::too_many_arguments)]
pub async fn finalize(
    pool: &DbPool,
    chat_id: i64,
    poll_id: Option<&str>,
    meeting_time: DateTime<Utc>,
    winning_text: &str,
    confirmation_message_id: Option<i64>,
    pinned_message_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<(MeetingRow, bool), DbError> {
    let mut conn = pool.acquire().await?;
    finalize_on(
        &mut conn,
        chat_id,
        poll_id,
        meeting_time,
        winning_text,
        confirmation_message_id,
        pinned_message_id,
        now,
    )
    .await
}

pub async fn get_by_poll(pool: &DbPool, poll_id: &str) -> Result<Option<MeetingRow>, DbError> {
    let mut conn = pool.acquire().await?;
    fetch_by_poll(&mut conn, poll_id).await
}

pub async fn list_for_chat(
    pool: &DbPool,
    chat_id: i64,
    limit: i64,
) -> Result<Vec<MeetingRow>, DbError> {
    let rows = sqlx::query_as::<_, MeetingRow>(
        "SELECT id, chat_id, poll_id, meeting_time, winning_text,
                confirmation_message_id, pinned_message_id, created_at
         FROM meetings
         WHERE chat_id = ?1
         ORDER BY meeting_time DESC, id DESC
         LIMIT ?2",
    )
    .bind(chat_id)
    .bind(limit.max(1))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn purge_older_than(
    pool: &DbPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM meetings
         WHERE id IN (
             SELECT id FROM meetings
             WHERE created_at <= ?1
             ORDER BY created_at ASC
             LIMIT ?2
         )",
    )
    .bind(cutoff)
    .bind(limit.max(1))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
