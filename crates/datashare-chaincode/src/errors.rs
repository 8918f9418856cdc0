//! # Error Types
//!
//! All error types for record persistence and the consent workflow.

use thiserror::Error;

/// Result alias used across the crate.
pub type ChaincodeResult<T> = Result<T, ChaincodeError>;

// =============================================================================
// CHAINCODE ERRORS
// =============================================================================

/// Errors surfaced by state records, the repository and the contracts.
///
/// Every error aborts the invoking transaction; nothing here is retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChaincodeError {
    /// A required field was absent or falsy.
    #[error("Field is necessary: {field}")]
    MissingField { field: String },

    /// A field was present but had the wrong shape.
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    /// No chain-key field carried a value.
    #[error("Can not construct chainKey[{key_type}]")]
    ChainKey { key_type: String },

    /// Repository used without a bound record variant.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No record stored under the requested key or selector.
    #[error("{0} Not Found")]
    NotFound(String),

    /// Caller is not allowed to perform the mutation.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Two related records disagree (e.g. consent approver vs. data owner).
    #[error("mismatch: {0}")]
    Mismatch(String),

    /// Workflow transition attempted from the wrong state.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Parallel field/value arrays of different length.
    #[error("Fields And Values Length Not Matched: {fields} != {values}")]
    Arity { fields: usize, values: usize },

    /// Malformed caller input (query, key list, payload JSON).
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller credential could not be parsed.
    #[error("certificate parse error: {0}")]
    CertificateParse(String),

    /// Operation is deliberately disabled on this contract.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Persisted bytes could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failure reported by the host world state.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl ChaincodeError {
    /// Shorthand for [`ChaincodeError::MissingField`].
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Shorthand for [`ChaincodeError::InvalidField`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors caused by the caller's identity rather than
    /// by the data it submitted.
    #[must_use]
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }
}

// =============================================================================
// LEDGER ERRORS
// =============================================================================

/// Errors from the host world state (outbound port).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// The host store could not be reached.
    #[error("world state unavailable: {0}")]
    Unavailable(String),

    /// A query could not be executed (bad selector, bad bookmark).
    #[error("query failed: {0}")]
    Query(String),

    /// A result iterator failed while advancing or closing.
    #[error("iterator error: {0}")]
    Iterator(String),

    /// Other store error.
    #[error("ledger error: {0}")]
    Other(String),
}

// =============================================================================
// TESTS
// =============================================================================
