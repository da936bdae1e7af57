//! SQLite-backed key store.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use super::{KeyStore, KEY_STORE_NAME};

#[derive(Debug, thiserror::Error)]
pub enum SqliteKeyStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key store persisted in a SQLite database.
///
/// Records live in the `key_pairs` table, scoped by store name so several
///  stores can share one database file.
#[derive(Debug, Clone)]
pub struct SqliteKeyStore {
    pool: SqlitePool,
    store_name: String,
}

impl SqliteKeyStore {
    /// Open (or create) a key store database at `path`.
    pub async fn open(path: &Path) -> Result<Self, SqliteKeyStoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Create an in-memory key store.
    pub async fn in_memory() -> Result<Self, SqliteKeyStoreError> {
        let options = SqliteConnectOptions::new().filename(":memory:");

        // a single long-lived connection, since every connection to
        //  :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, SqliteKeyStoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            store_name: KEY_STORE_NAME.to_string(),
        })
    }

    /// Scope this handle to a different store name within the same database
    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = store_name.into();
        self
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
    type Error = SqliteKeyStoreError;

    async fn get(&self, id: &str) -> Result<Option<String>, Self::Error> {
        let record = sqlx::query_scalar::<_, String>(
            r#"
            SELECT record
            FROM key_pairs
            WHERE store_name = ?1 AND id = ?2
            "#,
        )
        .bind(&self.store_name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn put(&self, id: &str, record: String) -> Result<(), Self::Error> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO key_pairs (store_name, id, record, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(store_name, id) DO UPDATE SET
                record = excluded.record,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.store_name)
        .bind(id)
        .bind(record)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            DELETE FROM key_pairs
            WHERE store_name = ?1 AND id = ?2
            "#,
        )
        .bind(&self.store_name)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
