use crate::{DbError, DbPool};
use chrono::{DateTime, Duration, Utc};
use quorum_models::{TaskKind, TaskPayload};
use sqlx::types::Json;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub chat_id: i64,
    pub poll_id: Option<String>,
    pub kind: String,
    pub payload: Json<TaskPayload>,
    pub due_at: DateTime<Utc>,
    pub executed: bool,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claim_token: Option<String>,
}

pub(crate) async fn enqueue_on(
    conn: &mut sqlx::SqliteConnection,
    chat_id: i64,
    poll_id: Option<&str>,
    payload: &TaskPayload,
    due_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<TaskRow, DbError> {
    let row = sqlx::query_as::<_, TaskRow>(
        "INSERT INTO scheduled_tasks (chat_id, poll_id, kind, payload, due_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING id, chat_id, poll_id, kind, payload, due_at, executed, executed_at,
                   created_at, claimed_at, claim_token",
    )
    .bind(chat_id)
    .bind(poll_id)
    .bind(payload.kind().as_str())
    .bind(Json(payload.clone()))
    .bind(due_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn enqueue(
    pool: &DbPool,
    chat_id: i64,
    poll_id: Option<&str>,
    payload: &TaskPayload,
    due_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<TaskRow, DbError> {
    let mut conn = pool.acquire().await?;
    enqueue_on(&mut conn, chat_id, poll_id, payload, due_at, now).await
}

/// Atomically claim the next due task, if any. A task is claimable when it is
/// unexecuted, due, and either unclaimed or claimed longer ago than `lease`
/// (its previous claimant is presumed dead). The single conditional UPDATE
/// guarantees two racing workers never receive the same row.
pub async fn claim_next_due(
    pool: &DbPool,
    now: DateTime<Utc>,
    lease: Duration,
    claim_token: &str,
) -> Result<Option<TaskRow>, DbError> {
    let lease_cutoff = now - lease;
    let row = sqlx::query_as::<_, TaskRow>(
        "UPDATE scheduled_tasks
         SET claimed_at = ?1, claim_token = ?2
         WHERE id = (
             SELECT id FROM scheduled_tasks
             WHERE executed = 0
               AND due_at <= ?1
               AND (claimed_at IS NULL OR claimed_at <= ?3)
             ORDER BY due_at ASC, id ASC
             LIMIT 1
         )
         RETURNING id, chat_id, poll_id, kind, payload, due_at, executed, executed_at,
                   created_at, claimed_at, claim_token",
    )
    .bind(now)
    .bind(claim_token)
    .bind(lease_cutoff)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Mark a claimed task as executed. This is the durability boundary: a crash
/// before it means the task is redelivered after the lease expires, so every
/// handler must tolerate re-execution.
pub async fn complete(
    pool: &DbPool,
    task_id: i64,
    claim_token: &str,
    now: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE scheduled_tasks
         SET executed = 1, executed_at = ?3
         WHERE id = ?1
           AND claim_token = ?2
           AND executed = 0",
    )
    .bind(task_id)
    .bind(claim_token)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_task(pool: &DbPool, task_id: i64) -> Result<Option<TaskRow>, DbError> {
    let row = sqlx::query_as::<_, TaskRow>(
        "SELECT id, chat_id, poll_id, kind, payload, due_at, executed, executed_at,
                created_at, claimed_at, claim_token
         FROM scheduled_tasks
         WHERE id = ?1",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn pending_for_chat(pool: &DbPool, chat_id: i64) -> Result<Vec<TaskRow>, DbError> {
    let rows = sqlx::query_as::<_, TaskRow>(
        "SELECT id, chat_id, poll_id, kind, payload, due_at, executed, executed_at,
                created_at, claimed_at, claim_token
         FROM scheduled_tasks
         WHERE chat_id = ?1
           AND executed = 0
         ORDER BY due_at ASC, id ASC",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Whether an unexecuted task of `kind` exists, optionally ignoring one row.
/// The exclusion lets a running task check for a successor other than itself.
pub async fn exists_other_unexecuted(
    pool: &DbPool,
    kind: TaskKind,
    excluding_id: Option<i64>,
) -> Result<bool, DbError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1
         FROM scheduled_tasks
         WHERE kind = ?1
           AND executed = 0
           AND id != COALESCE(?2, -1)
         LIMIT 1",
    )
    .bind(kind.as_str())
    .bind(excluding_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Whether an unexecuted task of `kind` referencing `poll_id` exists.
pub async fn exists_pending_for_poll(
    pool: &DbPool,
    kind: TaskKind,
    poll_id: &str,
) -> Result<bool, DbError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1
         FROM scheduled_tasks
         WHERE kind = ?1
           AND poll_id = ?2
           AND executed = 0
         LIMIT 1",
    )
    .bind(kind.as_str())
    .bind(poll_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn purge_executed_older_than(
    pool: &DbPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM scheduled_tasks
         WHERE id IN (
             SELECT id FROM scheduled_tasks
             WHERE executed = 1
               AND executed_at <= ?1
             ORDER BY executed_at ASC
             LIMIT ?2
         )",
    )
    .bind(cutoff)
    .bind(limit.max(1))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
