//! SQLite adapter.

use super::{Database, Dialect, SqlValue};
use crate::errors::StoreError;
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// A [`Database`] backed by a sqlx SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Opens (creating if missing) a database file.
    ///
    /// Configures `busy_timeout=5000ms` and `journal_mode=WAL`.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(5000))
            .pragma("journal_mode", "WAL");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StoreError::ConnectionFailed)?;

        tracing::debug!(db.path = %path.display(), "SQLite pool initialized");
        Ok(Self { pool })
    }

    /// Opens a private in-memory database.
    ///
    /// The pool keeps exactly one connection alive forever, since the data
    /// disappears with the connection.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(StoreError::ConnectionFailed)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::ConnectionFailed)?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params.iter().fold(query, |query, param| match param {
        SqlValue::Text(text) => query.bind(text.clone()),
        SqlValue::Date(date) => query.bind(*date),
    })
}

/// SQLITE_BUSY is a lock conflict worth retrying.
fn map_query_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.code().is_some_and(|code| code == "5") => {
            StoreError::Unavailable("database is busy".to_string())
        }
        _ => StoreError::QueryFailed(e),
    }
}

fn text_columns(row: &SqliteRow) -> Result<Vec<String>, StoreError> {
    (0..row.len())
        .map(|i| {
            row.try_get::<Option<String>, _>(i)
                .map(Option::unwrap_or_default)
                .map_err(|e| StoreError::InvalidRow(e.to_string()))
        })
        .collect()
}

#[async_trait]
impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<u64, StoreError> {
        let result = bind(sqlx::query(statement), params)
            .execute(&self.pool)
            .await
            .map_err(map_query_error)?;
        Ok(result.rows_affected())
    }

    async fn fetch_count(&self, statement: &str, params: &[SqlValue]) -> Result<i64, StoreError> {
        let row = bind(sqlx::query(statement), params)
            .fetch_one(&self.pool)
            .await
            .map_err(map_query_error)?;
        row.try_get::<i64, _>(0)
            .map_err(|e| StoreError::InvalidRow(e.to_string()))
    }

    async fn fetch_rows(
        &self,
        statement: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Vec<String>>, StoreError> {
        let rows = bind(sqlx::query(statement), params)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_error)?;
        rows.iter().map(text_columns).collect()
    }
}
