//! Error types for the rewrite engine.

use sqlparser::parser::ParserError;
use tessera_commons::CommonError;
use thiserror::Error;

/// Errors raised while parsing or rewriting one statement.
///
/// Every variant is recoverable at the statement boundary: the caller turns it
/// into an SQL error response and keeps the connection open.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RewriteError {
    /// Statement shape the engine refuses to rewrite
    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    /// An encrypted column was touched without an encryption key in the session
    #[error("Encryption key required: column '{column}' of table '{table}' is encrypted")]
    MissingEncryptionKey { table: String, column: String },

    /// A name that must be a table did not resolve
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Partitioned table definition that cannot be laid out
    #[error("Partition configuration error: {0}")]
    PartitionConfig(String),

    #[error("SQL parse error: {0}")]
    Parse(#[from] ParserError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] CommonError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable error category for protocol-level error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewriteErrorKind {
    BadSql,
    MissingKey,
    UnknownTable,
    Internal,
}

impl RewriteError {
    pub fn invalid_sql(msg: impl Into<String>) -> Self {
        Self::InvalidSql(msg.into())
    }

    pub fn partition_config(msg: impl Into<String>) -> Self {
        Self::PartitionConfig(msg.into())
    }

    pub fn missing_key(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingEncryptionKey {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn kind(&self) -> RewriteErrorKind {
        match self {
            RewriteError::InvalidSql(_) | RewriteError::PartitionConfig(_) | RewriteError::Parse(_) => {
                RewriteErrorKind::BadSql
            }
            RewriteError::MissingEncryptionKey { .. } => RewriteErrorKind::MissingKey,
            RewriteError::UnknownTable(_) => RewriteErrorKind::UnknownTable,
            RewriteError::Metadata(_) | RewriteError::Internal(_) => RewriteErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, RewriteError>;
