// Module database - PostgreSQL pool and track file records
// One row per route-owning entity, replaced on every re-upload

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("No track file stored for {0}")]
    NotFound(String),

    #[error("Invalid track file data: {0}")]
    InvalidData(String),
}

/// Aggregate statistics of the latest upload for one owning entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TrackFileRecord {
    pub owner_id: String,
    pub original_filename: String,
    pub storage_path: String,
    pub total_distance_km: f64,
    pub total_elevation_gain_m: i64,
    pub total_points: i64,
    pub uploaded_at: DateTime<Utc>,
}

/// Persistence for [`TrackFileRecord`]s.
#[async_trait]
pub trait TrackFileRepository: Send + Sync {
    /// Insert or replace the record for `record.owner_id`.
    ///
    /// Returns the storage path of the replaced record, if there was one.
    async fn upsert(&self, record: &TrackFileRecord) -> Result<Option<String>, DatabaseError>;

    async fn get(&self, owner_id: &str) -> Result<TrackFileRecord, DatabaseError>;
}

/// Database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create new database connection pool
    ///
    /// # Errors
    /// Returns DatabaseError if the connection fails
    pub async fn new(database_url: &str) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool created");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations
    ///
    /// # Errors
    /// Returns DatabaseError if migration fails
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        // sqlx::query() runs a single statement; raw_sql accepts the whole file
        let mut conn = self.pool.acquire().await?;

        let migration_sql = include_str!("../migrations/20260101_create_track_files.sql");

        sqlx::raw_sql(migration_sql).execute(&mut *conn).await?;

        tracing::info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl TrackFileRepository for Database {
    async fn upsert(&self, record: &TrackFileRecord) -> Result<Option<String>, DatabaseError> {
        if record.owner_id.is_empty() {
            return Err(DatabaseError::InvalidData("owner_id is empty".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let previous: Option<String> = sqlx::query_scalar(
            "SELECT storage_path FROM track_files WHERE owner_id = $1 FOR UPDATE",
        )
        .bind(&record.owner_id)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO track_files (
                owner_id, original_filename, storage_path, total_distance_km,
                total_elevation_gain_m, total_points, uploaded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (owner_id) DO UPDATE SET
                original_filename = EXCLUDED.original_filename,
                storage_path = EXCLUDED.storage_path,
                total_distance_km = EXCLUDED.total_distance_km,
                total_elevation_gain_m = EXCLUDED.total_elevation_gain_m,
                total_points = EXCLUDED.total_points,
                uploaded_at = EXCLUDED.uploaded_at
            "#,
        )
        .bind(&record.owner_id)
        .bind(&record.original_filename)
        .bind(&record.storage_path)
        .bind(record.total_distance_km)
        .bind(record.total_elevation_gain_m)
        .bind(record.total_points)
        .bind(record.uploaded_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Track file saved for {} ({} points, {:.2} km)",
            record.owner_id,
            record.total_points,
            record.total_distance_km
        );
        Ok(previous)
    }

    async fn get(&self, owner_id: &str) -> Result<TrackFileRecord, DatabaseError> {
        let record =
            sqlx::query_as::<_, TrackFileRecord>("SELECT * FROM track_files WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DatabaseError::NotFound(owner_id.to_string()))?;

        Ok(record)
    }
}

/// Map-backed repository for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTrackFiles {
    records: Arc<Mutex<HashMap<String, TrackFileRecord>>>,
}

impl InMemoryTrackFiles {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, TrackFileRecord>>, DatabaseError> {
        self.records
            .lock()
            .map_err(|_| DatabaseError::InvalidData("track file map poisoned".to_string()))
    }
}

#[async_trait]
impl TrackFileRepository for InMemoryTrackFiles {
    async fn upsert(&self, record: &TrackFileRecord) -> Result<Option<String>, DatabaseError> {
        if record.owner_id.is_empty() {
            return Err(DatabaseError::InvalidData("owner_id is empty".to_string()));
        }
        let previous = self
            .lock()?
            .insert(record.owner_id.clone(), record.clone())
            .map(|old| old.storage_path);
        Ok(previous)
    }

    async fn get(&self, owner_id: &str) -> Result<TrackFileRecord, DatabaseError> {
        self.lock()?
            .get(owner_id)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(owner_id.to_string()))
    }
}
