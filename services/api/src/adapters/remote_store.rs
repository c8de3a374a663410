//! services/api/src/adapters/remote_store.rs
//!
//! This module contains the remote table adapter, the concrete implementation
//! of the `RemoteStore` port. It keeps one row per logical key in PostgreSQL
//! using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neurostudy_core::ports::{PortError, PortResult, RemoteRow, RemoteStore};
use sqlx::{FromRow, PgPool};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A remote store backed by the `study_store` table.
#[derive(Clone)]
pub struct PgRemoteStore {
    pool: PgPool,
}

impl PgRemoteStore {
    /// Creates a new `PgRemoteStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct StoreRecord {
    id: String,
    content: String,
    version: i64,
    updated_at: DateTime<Utc>,
}
impl StoreRecord {
    fn to_domain(self) -> RemoteRow {
        RemoteRow {
            id: self.id,
            content: self.content,
            version: self.version.max(0) as u64,
            updated_at: self.updated_at,
        }
    }
}

//=========================================================================================
// `RemoteStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RemoteStore for PgRemoteStore {
    async fn fetch_rows(&self, ids: &[&str]) -> PortResult<Vec<RemoteRow>> {
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let records = sqlx::query_as::<_, StoreRecord>(
            "SELECT id, content, version, updated_at FROM study_store WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Storage(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn upsert_row(&self, row: RemoteRow) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO study_store (id, content, version, updated_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET content = EXCLUDED.content, version = EXCLUDED.version, updated_at = EXCLUDED.updated_at",
        )
        .bind(&row.id)
        .bind(&row.content)
        .bind(row.version as i64)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Storage(e.to_string()))?;
        Ok(())
    }
}
