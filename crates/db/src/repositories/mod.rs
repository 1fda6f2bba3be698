use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use solquote_core::ports::StoreError;

pub mod assignment;
pub mod contractor;
pub mod contractor_quote;
pub mod memory;
pub mod pricing_rules;
pub mod quote_request;

pub use assignment::SqlAssignmentRepository;
pub use contractor::SqlContractorDirectory;
pub use contractor_quote::SqlContractorQuoteRepository;
pub use memory::{
    InMemoryAssignmentRepository, InMemoryContractorDirectory, InMemoryContractorQuoteRepository,
    InMemoryPricingRulesRepository, InMemoryQuoteRequestRepository,
};
pub use pricing_rules::SqlPricingRulesRepository;
pub use quote_request::SqlQuoteRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("stale write: {0}")]
    Stale(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(sqlx::Error::Database(db_error))
                if db_error.is_unique_violation() =>
            {
                StoreError::Duplicate(db_error.message().to_string())
            }
            RepositoryError::Database(other) => StoreError::Unavailable(other.to_string()),
            RepositoryError::Decode(message) => StoreError::Corrupt(message),
            RepositoryError::Stale(message) => StoreError::Stale(message),
        }
    }
}

pub(crate) fn text(row: &SqliteRow, column: &str) -> Result<String, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn optional_text(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<String>, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

/// Decimals are stored as TEXT so no precision is lost to SQLite REAL.
pub(crate) fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal, RepositoryError> {
    let raw = text(row, column)?;
    Decimal::from_str(&raw)
        .map_err(|e| RepositoryError::Decode(format!("column `{column}`: {e} (`{raw}`)")))
}

pub(crate) fn timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    parse_timestamp(column, &text(row, column)?)
}

pub(crate) fn optional_timestamp(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    optional_text(row, column)?.map(|raw| parse_timestamp(column, &raw)).transpose()
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("column `{column}`: {e} (`{raw}`)")))
}

pub(crate) fn parse_enum<T>(column: &str, raw: &str) -> Result<T, RepositoryError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| RepositoryError::Decode(format!("column `{column}`: {e}")))
}

#[cfg(test)]
mod tests {
    use solquote_core::ports::StoreError;

    use super::RepositoryError;

    #[test]
    fn decode_failures_map_to_corrupt_store_errors() {
        let error = StoreError::from(RepositoryError::Decode("bad decimal".to_string()));
        assert_eq!(error, StoreError::Corrupt("bad decimal".to_string()));
    }

    #[test]
    fn connection_failures_map_to_unavailable() {
        let error = StoreError::from(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        assert!(matches!(error, StoreError::Unavailable(_)));
    }
}
