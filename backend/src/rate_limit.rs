//! Sliding-window upload quota, keyed by user.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("upload limit of {limit} per {window_secs}s reached, retry in {retry_after_secs}s")]
    Exceeded {
        limit: u32,
        window_secs: i64,
        retry_after_secs: i64,
    },
    #[error("rate limit store error: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadQuota {
    pub limit: u32,
    pub window: Duration,
}

impl Default for UploadQuota {
    fn default() -> Self {
        Self {
            limit: 10,
            window: Duration::hours(1),
        }
    }
}

impl UploadQuota {
    fn exceeded(&self, oldest: Option<DateTime<Utc>>, now: DateTime<Utc>) -> RateLimitError {
        let retry_after_secs = oldest
            .map(|t| (t + self.window - now).num_seconds().max(1))
            .unwrap_or_else(|| self.window.num_seconds());
        RateLimitError::Exceeded {
            limit: self.limit,
            window_secs: self.window.num_seconds(),
            retry_after_secs,
        }
    }
}

/// Atomic check-and-record of one upload.
///
/// An event at time `t` counts against the user while `now - window < t`. Implementations
/// must make the count and the insert a single step per user so concurrent uploads
/// cannot both pass the last free slot.
#[async_trait]
pub trait UploadLimiter: Send + Sync {
    async fn acquire(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), RateLimitError>;

    /// Give back the slot taken by `acquire(user_id, at)` for an upload that was not kept.
    async fn release(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), RateLimitError>;
}

/// Process-local limiter. The DashMap entry guard serializes callers for the same user.
#[derive(Clone, Default)]
pub struct InMemoryUploadLimiter {
    events: Arc<DashMap<String, VecDeque<DateTime<Utc>>>>,
    quota: UploadQuota,
}

impl InMemoryUploadLimiter {
    pub fn new(quota: UploadQuota) -> Self {
        Self {
            events: Arc::new(DashMap::new()),
            quota,
        }
    }
}

#[async_trait]
impl UploadLimiter for InMemoryUploadLimiter {
    async fn acquire(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), RateLimitError> {
        let cutoff = now - self.quota.window;
        let mut entry = self.events.entry(user_id.to_string()).or_default();
        let timestamps = entry.value_mut();

        while timestamps.front().is_some_and(|t| *t <= cutoff) {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.quota.limit as usize {
            return Err(self.quota.exceeded(timestamps.front().copied(), now));
        }

        timestamps.push_back(now);
        Ok(())
    }

    async fn release(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), RateLimitError> {
        if let Some(mut entry) = self.events.get_mut(user_id) {
            if let Some(pos) = entry.iter().rposition(|t| *t == at) {
                entry.remove(pos);
            }
        }
        Ok(())
    }
}

/// Postgres-backed limiter shared by every server instance.
///
/// Each call runs in one transaction holding a per-user advisory lock, so the prune,
/// count and insert cannot interleave with another upload by the same user.
#[derive(Clone)]
pub struct PgUploadLimiter {
    pool: PgPool,
    quota: UploadQuota,
}

impl PgUploadLimiter {
    pub fn new(pool: PgPool, quota: UploadQuota) -> Self {
        Self { pool, quota }
    }
}

#[async_trait]
impl UploadLimiter for PgUploadLimiter {
    async fn acquire(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), RateLimitError> {
        let cutoff = now - self.quota.window;
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM upload_events WHERE user_id = $1 AND uploaded_at <= $2")
            .bind(user_id)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        let (count, oldest): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            "SELECT COUNT(*), MIN(uploaded_at) FROM upload_events WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if count >= i64::from(self.quota.limit) {
            tx.rollback().await?;
            tracing::info!("upload quota exhausted for user {}", user_id);
            return Err(self.quota.exceeded(oldest, now));
        }

        sqlx::query("INSERT INTO upload_events (user_id, uploaded_at) VALUES ($1, $2)")
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    async fn release(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), RateLimitError> {
        sqlx::query(
            r#"
            DELETE FROM upload_events
            WHERE id = (
                SELECT id FROM upload_events
                WHERE user_id = $1 AND uploaded_at = $2
                ORDER BY id DESC
                LIMIT 1
            )
            "#,
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
