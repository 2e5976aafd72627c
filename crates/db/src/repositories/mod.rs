use std::str::FromStr;

use chrono::{DateTime, Utc};
use costgate_core::errors::ApplicationError;
use rust_decimal::Decimal;
use thiserror::Error;

pub mod cost_request;
pub mod ledger;
pub mod memory;

pub use cost_request::SqlCostRequestStore;
pub use ledger::SqlLedgerBook;
pub use memory::{InMemoryCostRequestStore, InMemoryLedgerBook};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("cost request `{id}` is no longer at version {expected}")]
    VersionConflict { id: String, expected: u32 },
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::VersionConflict { .. } => Self::Conflict(error.to_string()),
            RepositoryError::Database(_) | RepositoryError::Decode(_) => {
                Self::Persistence(error.to_string())
            }
        }
    }
}

/// Scale-free text form so `500` and `500.00` are stored, and compared, alike.
pub(crate) fn encode_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

pub(crate) fn decode_amount(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn encode_json<T: serde::Serialize>(
    column: &str,
    value: &T,
) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("could not encode `{column}`: {error}")))
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid json in `{column}`: {error}")))
}

#[cfg(test)]
mod tests {
    use costgate_core::errors::ApplicationError;
    use rust_decimal::Decimal;

    use super::{decode_amount, encode_amount, RepositoryError};

    #[test]
    fn amounts_are_stored_without_trailing_zeros() {
        assert_eq!(encode_amount(Decimal::new(50000, 2)), "500");
        assert_eq!(encode_amount(Decimal::new(12050, 2)), "120.5");
        assert_eq!(decode_amount("amount", "120.5").expect("decode"), Decimal::new(1205, 1));
        assert!(decode_amount("amount", "12,0").is_err());
    }

    #[test]
    fn version_conflict_maps_to_application_conflict() {
        let error = ApplicationError::from(RepositoryError::VersionConflict {
            id: "c-1".to_string(),
            expected: 3,
        });
        assert!(matches!(error, ApplicationError::Conflict(ref message) if message.contains("c-1")));

        let decode = ApplicationError::from(RepositoryError::Decode("bad status".to_string()));
        assert!(matches!(decode, ApplicationError::Persistence(_)));
    }
}
