//! SQL store capability and adapters.
//!
//! The core only talks to the [`Database`] trait. Two sqlx-backed adapters
//! are provided: [`SqliteDatabase`] and [`PostgresDatabase`].

mod postgres;
mod sink;
mod sqlite;

pub use postgres::PostgresDatabase;
pub use sink::{IdempotentSink, TABLE_NAME};
pub use sqlite::SqliteDatabase;

use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt::Debug;

/// A statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// A text value.
    Text(String),
    /// A calendar date.
    Date(NaiveDate),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

/// SQL dialect spoken by a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite 3.24 or newer.
    Sqlite,
    /// PostgreSQL 9.5 or newer.
    Postgres,
}

impl Dialect {
    /// Returns the placeholder for the `n`-th (1-based) parameter.
    #[must_use]
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::Sqlite => "?".to_string(),
            Self::Postgres => format!("${n}"),
        }
    }

    /// Returns a comma-separated list of `count` placeholders.
    #[must_use]
    pub fn placeholders(self, count: usize) -> String {
        (1..=count)
            .map(|n| self.placeholder(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Column definition of an auto-incrementing surrogate key.
    #[must_use]
    pub fn surrogate_key(self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Self::Postgres => "SERIAL PRIMARY KEY",
        }
    }
}

/// The SQL execution capability consumed by the sink.
///
/// Each call acquires a pooled connection and releases it before returning,
/// on success and on error alike.
#[async_trait]
pub trait Database: Send + Sync + Debug {
    /// The dialect statements must be written in.
    fn dialect(&self) -> Dialect;

    /// Executes a statement and returns the number of affected rows.
    async fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<u64, StoreError>;

    /// Runs a query whose first column of the first row is an integer.
    async fn fetch_count(&self, statement: &str, params: &[SqlValue]) -> Result<i64, StoreError>;

    /// Runs a query whose columns are all text and returns every row.
    ///
    /// `NULL` columns read as empty strings.
    async fn fetch_rows(
        &self,
        statement: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Vec<String>>, StoreError>;
}
