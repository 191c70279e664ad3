//! Relational inventory of objects observed by the proxy.
//!
//! One table per bucket (lazily created), idempotent upsert on write,
//! soft-delete on delete. Follows the repository-per-concern shape of
//! `barbacane-control`'s `db` module, with errors kept local to this crate
//! since the store is invoked from an async continuation, never directly
//! from a request handler.

pub mod error;
pub mod models;

pub use error::InventoryError;
pub use models::table_name;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashSet;

/// Inventory store. `Disabled` no-ops every call and never opens a
/// connection, so the dispatcher can call the same methods regardless of
/// whether `POSTGRES_URL` was configured.
pub enum InventoryStore {
    Enabled(Inner),
    Disabled,
}

impl InventoryStore {
    /// Construct a disabled store — used when `DISABLE_DATABASE` is set or
    /// no `POSTGRES_URL` was given.
    pub fn disabled() -> Self {
        Self::Disabled
    }

    /// Connect to Postgres and return an enabled store.
    pub async fn connect(database_url: &str) -> Result<Self, InventoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::Enabled(Inner::new(pool)))
    }

    /// Wrap an already-constructed pool (used by tests against a real
    /// database).
    pub fn from_pool(pool: PgPool) -> Self {
        Self::Enabled(Inner::new(pool))
    }

    /// Issue `CREATE TABLE IF NOT EXISTS` for `bucket`'s table and its three
    /// indexes, once per process, memoized in a read-biased lock.
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<(), InventoryError> {
        match self {
            Self::Enabled(inner) => inner.ensure_bucket(bucket).await,
            Self::Disabled => Ok(()),
        }
    }

    /// Upsert the object record for `(bucket, key)` on a successful
    /// PUT/POST.
    pub async fn record_put(
        &self,
        bucket: &str,
        key: &str,
        size: i64,
        content_type: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        match self {
            Self::Enabled(inner) => inner.record_put(bucket, key, size, content_type, now).await,
            Self::Disabled => Ok(()),
        }
    }

    /// Mark the object record for `(bucket, key)` as backed up. A missing
    /// row is a benign no-op.
    pub async fn mark_backed_up(&self, bucket: &str, key: &str) -> Result<(), InventoryError> {
        match self {
            Self::Enabled(inner) => inner.mark_backed_up(bucket, key).await,
            Self::Disabled => Ok(()),
        }
    }

    /// Soft-delete the object record for `(bucket, key)` on a successful
    /// DELETE. A missing row is a no-op.
    pub async fn record_delete(
        &self,
        bucket: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        match self {
            Self::Enabled(inner) => inner.record_delete(bucket, key, now).await,
            Self::Disabled => Ok(()),
        }
    }
}

/// Backing state for an enabled inventory store.
pub struct Inner {
    pool: PgPool,
    registered: RwLock<HashSet<String>>,
}

impl Inner {
    fn new(pool: PgPool) -> Self {
        Self {
            pool,
            registered: RwLock::new(HashSet::new()),
        }
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), InventoryError> {
        let table = table_name(bucket);
        if self.registered.read().contains(&table) {
            return Ok(());
        }

        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                id BIGSERIAL PRIMARY KEY, \
                path TEXT NOT NULL UNIQUE, \
                size BIGINT NOT NULL, \
                content_type TEXT NOT NULL DEFAULT 'application/octet-stream', \
                is_backed_up BOOLEAN NOT NULL DEFAULT false, \
                last_modified TIMESTAMPTZ NOT NULL, \
                deleted BOOLEAN NOT NULL DEFAULT false, \
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()\
            )",
        );
        sqlx::query(&create_table).execute(&self.pool).await?;

        for (suffix, column) in [("path", "path"), ("is_backed_up", "is_backed_up"), ("deleted", "deleted")] {
            let stmt = format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{suffix} ON {table} ({column})",
            );
            sqlx::query(&stmt).execute(&self.pool).await?;
        }

        self.registered.write().insert(table);
        Ok(())
    }

    async fn record_put(
        &self,
        bucket: &str,
        key: &str,
        size: i64,
        content_type: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        self.ensure_bucket(bucket).await?;
        let table = table_name(bucket);
        let stmt = format!(
            "INSERT INTO {table} (path, size, content_type, is_backed_up, last_modified, deleted, updated_at) \
             VALUES ($1, $2, $3, false, $4, false, now()) \
             ON CONFLICT (path) DO UPDATE SET \
               size = EXCLUDED.size, \
               content_type = EXCLUDED.content_type, \
               is_backed_up = false, \
               deleted = false, \
               last_modified = EXCLUDED.last_modified, \
               updated_at = now()",
        );
        sqlx::query(&stmt)
            .bind(key)
            .bind(size)
            .bind(content_type)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_backed_up(&self, bucket: &str, key: &str) -> Result<(), InventoryError> {
        let table = table_name(bucket);
        let stmt = format!(
            "UPDATE {table} SET is_backed_up = true, updated_at = now() WHERE path = $1",
        );
        sqlx::query(&stmt).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn record_delete(
        &self,
        bucket: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        // A DELETE may be the first operation the proxy ever observes for
        // this bucket, so the table might not exist yet.
        self.ensure_bucket(bucket).await?;
        let table = table_name(bucket);
        let stmt = format!(
            "UPDATE {table} SET deleted = true, last_modified = $2, updated_at = now() WHERE path = $1",
        );
        sqlx::query(&stmt)
            .bind(key)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_store_noops_every_call() {
        let store = InventoryStore::disabled();
        let now = DateTime::<Utc>::from_timestamp(0, 0).unwrap();

        assert!(store.ensure_bucket("my-data").await.is_ok());
        assert!(store
            .record_put("my-data", "a/b.txt", 2, "text/plain", now)
            .await
            .is_ok());
        assert!(store.mark_backed_up("my-data", "a/b.txt").await.is_ok());
        assert!(store.record_delete("my-data", "a/b.txt", now).await.is_ok());
    }
}
