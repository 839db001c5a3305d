//! Errors raised by the ledger.
//!
//! - [`Validation`] a write broke a ledger invariant (bad split, non-member...).
//! - [`NotFound`] a group or member reference did not resolve.
//! - [`Conflict`] a concurrent write invalidated the snapshot a write was
//!   based on, or the record already exists. Retrying is safe.
//! - [`Forbidden`] the caller is not allowed to touch the group.
//! - [`Storage`] the backing store failed.
//!
//!  [`Validation`]: LedgerError::Validation
//!  [`NotFound`]: LedgerError::NotFound
//!  [`Conflict`]: LedgerError::Conflict
//!  [`Forbidden`]: LedgerError::Forbidden
//!  [`Storage`]: LedgerError::Storage
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Storage failure: {0}")]
    Storage(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<mongodb::error::Error> for LedgerError {
    fn from(value: mongodb::error::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<bson::ser::Error> for LedgerError {
    fn from(value: bson::ser::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<bson::de::Error> for LedgerError {
    fn from(value: bson::de::Error) -> Self {
        Self::Storage(value.to_string())
    }
}
