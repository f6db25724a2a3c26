//! File records consumed by the preview pipeline.
//!
//! The platform's full file domain (upload, sharing, hierarchy) lives
//! elsewhere; the scheduler only needs to resolve a file id to the stored
//! object it should convert, so that seam is a small trait.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A stored document, as the preview pipeline sees it.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    /// Location of the original object in blob storage.
    pub storage_path: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// Read-only lookup of stored files.
///
/// A file can disappear between enqueue and conversion (deleted, moved);
/// callers must treat a `None` result as a normal outcome.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn find_by_id(&self, file_id: Uuid) -> Result<Option<StoredFile>>;
}

/// PostgreSQL-backed file lookup.
pub struct PgFileStore {
    pool: PgPool,
}

impl PgFileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileStore for PgFileStore {
    async fn find_by_id(&self, file_id: Uuid) -> Result<Option<StoredFile>> {
        let file = sqlx::query_as::<_, StoredFile>(
            r#"
            SELECT id, name, mime_type, storage_path, size_bytes, created_at
            FROM files
            WHERE id = $1
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }
}
