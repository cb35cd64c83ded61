use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct SubscriberRow {
    pub user_id: i64,
    pub is_active: bool,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

/// Mark a user as an active subscriber. Re-activating keeps the original
/// subscription time; resubscribing after an opt-out resets it.
pub async fn activate(
    pool: &DbPool,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<SubscriberRow, DbError> {
    let row = sqlx::query_as::<_, SubscriberRow>(
        "INSERT INTO subscribers (user_id, is_active, subscribed_at, unsubscribed_at)
         VALUES (?1, 1, ?2, NULL)
         ON CONFLICT(user_id) DO UPDATE SET
            is_active = 1,
            subscribed_at = CASE
                WHEN subscribers.is_active = 0 THEN excluded.subscribed_at
                ELSE subscribers.subscribed_at
            END,
            unsubscribed_at = NULL
         RETURNING user_id, is_active, subscribed_at, unsubscribed_at",
    )
    .bind(user_id)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn deactivate(pool: &DbPool, user_id: i64, now: DateTime<Utc>) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE subscribers
         SET is_active = 0, unsubscribed_at = ?2
         WHERE user_id = ?1
           AND is_active = 1",
    )
    .bind(user_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get(pool: &DbPool, user_id: i64) -> Result<Option<SubscriberRow>, DbError> {
    let row = sqlx::query_as::<_, SubscriberRow>(
        "SELECT user_id, is_active, subscribed_at, unsubscribed_at
         FROM subscribers
         WHERE user_id = ?1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_active(pool: &DbPool) -> Result<Vec<SubscriberRow>, DbError> {
    let rows = sqlx::query_as::<_, SubscriberRow>(
        "SELECT user_id, is_active, subscribed_at, unsubscribed_at
         FROM subscribers
         WHERE is_active = 1
         ORDER BY user_id ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn count_active(pool: &DbPool) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers WHERE is_active = 1")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
