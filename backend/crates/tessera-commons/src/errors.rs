//! Shared error types for the Tessera metadata model.
//!
//! ## Example Usage
//!
//! ```rust
//! use tessera_commons::errors::{CommonError, Result};
//!
//! fn validate_table_name(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(CommonError::invalid_input("table name cannot be empty"));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

/// Common error type for metadata operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Invalid input provided to a function
    InvalidInput(String),

    /// Table, database or column not found
    NotFound(String),

    /// Resource already exists (duplicate registration)
    AlreadyExists(String),

    /// Partition group or column metadata breaks an invariant
    InvalidMetadata(String),

    /// Internal error (unexpected state)
    Internal(String),
}

impl CommonError {
    /// Creates an InvalidInput error with a message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates a NotFound error with a message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates an AlreadyExists error with a message.
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Creates an InvalidMetadata error with a message.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Creates an Internal error with a message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommonError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            CommonError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CommonError::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            CommonError::InvalidMetadata(msg) => write!(f, "Invalid metadata: {}", msg),
            CommonError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CommonError {}

/// Result type alias using CommonError.
pub type Result<T> = std::result::Result<T, CommonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CommonError::invalid_input("test");
        assert!(matches!(err, CommonError::InvalidInput(_)));
        assert_eq!(err.to_string(), "Invalid input: test");

        let err = CommonError::not_found("orders");
        assert_eq!(err.to_string(), "Not found: orders");

        let err = CommonError::invalid_metadata("link column missing");
        assert_eq!(err.to_string(), "Invalid metadata: link column missing");
    }

    #[test]
    fn test_result_type() {
        fn check(ok: bool) -> Result<u32> {
            if ok {
                Ok(7)
            } else {
                Err(CommonError::internal("boom"))
            }
        }

        assert_eq!(check(true), Ok(7));
        assert_eq!(check(false), Err(CommonError::Internal("boom".to_string())));
    }
}
