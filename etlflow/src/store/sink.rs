//! Idempotent loader for APOD records.

use super::{Database, SqlValue};
use crate::apod::ApodRecord;
use crate::errors::StoreError;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// Target table of the loader.
pub const TABLE_NAME: &str = "apod_data";

/// Writes [`ApodRecord`]s keyed on their natural key `(date, media_type)`.
///
/// Loading the same record any number of times leaves exactly one row;
/// a later load with the same key overwrites title, explanation and url.
#[derive(Debug, Clone)]
pub struct IdempotentSink {
    db: Arc<dyn Database>,
}

impl IdempotentSink {
    /// Creates a sink writing through `db`.
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Creates the target table if it does not exist.
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {TABLE_NAME} (\
             id {key}, \
             title TEXT, \
             explanation TEXT, \
             url TEXT, \
             date DATE NOT NULL, \
             media_type TEXT NOT NULL, \
             UNIQUE (date, media_type))",
            key = self.db.dialect().surrogate_key(),
        );
        self.db.execute(&statement, &[]).await?;
        debug!(table = TABLE_NAME, "Ensured target table");
        Ok(())
    }

    /// Inserts `record`, or updates the row sharing its natural key.
    ///
    /// Returns the number of affected rows.
    pub async fn upsert(&self, record: &ApodRecord) -> Result<u64, StoreError> {
        let statement = format!(
            "INSERT INTO {TABLE_NAME} (title, explanation, url, date, media_type) \
             VALUES ({values}) \
             ON CONFLICT (date, media_type) DO UPDATE SET \
             title = excluded.title, \
             explanation = excluded.explanation, \
             url = excluded.url",
            values = self.db.dialect().placeholders(5),
        );
        let params = [
            SqlValue::from(record.title.as_str()),
            SqlValue::from(record.explanation.as_str()),
            SqlValue::from(record.url.as_str()),
            SqlValue::Date(record.date),
            SqlValue::from(record.media_type.as_str()),
        ];

        let affected = self.db.execute(&statement, &params).await?;
        debug!(
            date = %record.date,
            media_type = %record.media_type,
            fingerprint = %record.fingerprint(),
            affected,
            "Upserted record"
        );
        Ok(affected)
    }

    /// Counts rows with the given natural key.
    pub async fn count_by_natural_key(
        &self,
        date: NaiveDate,
        media_type: &str,
    ) -> Result<i64, StoreError> {
        let dialect = self.db.dialect();
        let statement = format!(
            "SELECT COUNT(*) FROM {TABLE_NAME} WHERE date = {} AND media_type = {}",
            dialect.placeholder(1),
            dialect.placeholder(2),
        );
        self.db
            .fetch_count(&statement, &[SqlValue::Date(date), SqlValue::from(media_type)])
            .await
    }

    /// Counts every row.
    pub async fn count(&self) -> Result<i64, StoreError> {
        self.db
            .fetch_count(&format!("SELECT COUNT(*) FROM {TABLE_NAME}"), &[])
            .await
    }

    /// Reads back the row with the given natural key.
    pub async fn find(
        &self,
        date: NaiveDate,
        media_type: &str,
    ) -> Result<Option<ApodRecord>, StoreError> {
        let dialect = self.db.dialect();
        let statement = format!(
            "SELECT title, explanation, url, CAST(date AS TEXT), media_type \
             FROM {TABLE_NAME} WHERE date = {} AND media_type = {}",
            dialect.placeholder(1),
            dialect.placeholder(2),
        );
        let rows = self
            .db
            .fetch_rows(&statement, &[SqlValue::Date(date), SqlValue::from(media_type)])
            .await?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let [title, explanation, url, date, media_type]: [String; 5] = row
            .try_into()
            .map_err(|row: Vec<String>| {
                StoreError::InvalidRow(format!("expected 5 columns, got {}", row.len()))
            })?;
        let date = date
            .parse()
            .map_err(|_| StoreError::InvalidRow(format!("invalid date '{date}'")))?;

        Ok(Some(ApodRecord {
            title,
            explanation,
            url,
            date,
            media_type,
        }))
    }
}
