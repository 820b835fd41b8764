//! Error types for the DCA execution core.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for scheduler, engine, and repository operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DcaError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Lock store error: {0}")]
    LockStoreError(String),
    #[error("Pricing error: {0}")]
    PricingError(String),
    #[error("Ledger error: {0}")]
    LedgerError(String),
    #[error("Plan not found: {0}")]
    PlanNotFound(Uuid),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<sqlx::Error> for DcaError {
    fn from(err: sqlx::Error) -> Self {
        DcaError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DcaError {
    fn from(err: serde_json::Error) -> Self {
        DcaError::ValidationError(format!("JSON serialization error: {err}"))
    }
}

impl From<crate::locking::LockStoreError> for DcaError {
    fn from(err: crate::locking::LockStoreError) -> Self {
        DcaError::LockStoreError(err.to_string())
    }
}

impl From<crate::pricing::PricingError> for DcaError {
    fn from(err: crate::pricing::PricingError) -> Self {
        DcaError::PricingError(err.to_string())
    }
}

impl From<crate::ledger::LedgerError> for DcaError {
    fn from(err: crate::ledger::LedgerError) -> Self {
        DcaError::LedgerError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DcaError>;
