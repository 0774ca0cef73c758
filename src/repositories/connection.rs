use async_trait::async_trait;
use deadpool_postgres::Pool;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::connection::{ConnectionRecord, Provider},
};

/// Persistence boundary for account connections.
///
/// `upsert` is keyed by (`user_id`, `provider`): repeated calls with the same
/// key leave exactly one record holding the last write.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Inserts the record or overwrites the existing one for its key.
    async fn upsert(&self, record: &ConnectionRecord) -> Result<()>;

    /// Looks up the record for a user and provider.
    async fn find(&self, user_id: Uuid, provider: Provider) -> Result<Option<ConnectionRecord>>;
}

/// A helper function to map a `tokio_postgres::Row` to a `ConnectionRecord`.
fn row_to_connection(row: &Row) -> Result<ConnectionRecord> {
    let provider: String = row
        .try_get("provider")
        .map_err(|_| AppError::MissingData("provider".to_string()))?;

    Ok(ConnectionRecord {
        user_id: row.try_get("user_id").map_err(|_| AppError::MissingData("user_id".to_string()))?,
        provider: Provider::from_tag(&provider)
            .ok_or_else(|| AppError::Internal(format!("Unknown provider tag: {}", provider)))?,
        provider_account_id: row.try_get("provider_account_id").map_err(|_| AppError::MissingData("provider_account_id".to_string()))?,
        access_token: row.try_get("access_token").map_err(|_| AppError::MissingData("access_token".to_string()))?,
        refresh_token: row.try_get("refresh_token").map_err(|_| AppError::MissingData("refresh_token".to_string()))?,
        expires_at: row.try_get("expires_at").map_err(|_| AppError::MissingData("expires_at".to_string()))?,
    })
}

/// `account_connections` table backed by PostgreSQL.
#[derive(Clone)]
pub struct PgConnectionStore {
    pool: Pool,
}

impl PgConnectionStore {
    /// Creates a new `PgConnectionStore`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionStore for PgConnectionStore {
    async fn upsert(&self, record: &ConnectionRecord) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO account_connections
                    (user_id, provider, provider_account_id, access_token, refresh_token, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (user_id, provider) DO UPDATE
                SET provider_account_id = EXCLUDED.provider_account_id,
                    access_token = EXCLUDED.access_token,
                    refresh_token = EXCLUDED.refresh_token,
                    expires_at = EXCLUDED.expires_at,
                    updated_at = NOW()
                "#,
                &[
                    &record.user_id,
                    &record.provider.as_str(),
                    &record.provider_account_id,
                    &record.access_token,
                    &record.refresh_token,
                    &record.expires_at,
                ],
            )
            .await?;

        tracing::debug!(
            "Upserted {} connection for user {}",
            record.provider,
            record.user_id
        );
        Ok(())
    }

    async fn find(&self, user_id: Uuid, provider: Provider) -> Result<Option<ConnectionRecord>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT user_id, provider, provider_account_id, access_token, refresh_token, expires_at
                FROM account_connections
                WHERE user_id = $1 AND provider = $2
                "#,
                &[&user_id, &provider.as_str()],
            )
            .await?;
        row.map(|r| row_to_connection(&r)).transpose()
    }
}

/// In-process store with the same upsert semantics as the table.
#[derive(Clone, Default)]
pub struct MemoryConnectionStore {
    records: Arc<RwLock<HashMap<(Uuid, Provider), ConnectionRecord>>>,
    upserts: Arc<AtomicUsize>,
    failure: Arc<RwLock<Option<String>>>,
}

impl MemoryConnectionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `upsert` fail with `reason`.
    pub async fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.write().await = Some(reason.into());
    }

    /// Number of `upsert` calls received, failed ones included.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn upsert(&self, record: &ConnectionRecord) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = self.failure.read().await.clone() {
            return Err(AppError::Persistence(reason));
        }

        let mut records = self.records.write().await;
        records.insert(record.key(), record.clone());
        Ok(())
    }

    async fn find(&self, user_id: Uuid, provider: Provider) -> Result<Option<ConnectionRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(user_id, provider)).cloned())
    }
}
