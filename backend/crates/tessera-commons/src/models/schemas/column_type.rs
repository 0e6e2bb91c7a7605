//! Column storage types, including the virtual encrypted type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyword clients use to declare an encrypted column.
pub const ENCRYPT_TYPE_NAME: &str = "ENCRYPT";

/// Cipher block size used to size the binary storage of encrypted columns.
pub const ENCRYPTION_BLOCK_SIZE: u64 = 16;

/// Declared type of a column.
///
/// `Sql` keeps the backend type text as declared (`VARCHAR(32)`, `BIGINT`, ...).
/// `Encrypted` is the virtual type: the backend stores opaque binary and every
/// statement touching the column gets encrypt/decrypt calls injected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnType {
    Sql { type_name: String },
    Encrypted { length: Option<u64> },
}

impl ColumnType {
    pub fn sql(type_name: impl Into<String>) -> Self {
        ColumnType::Sql {
            type_name: type_name.into(),
        }
    }

    pub fn encrypted(length: Option<u64>) -> Self {
        ColumnType::Encrypted { length }
    }

    /// Parses declared type text, recognising `ENCRYPT` and `ENCRYPT(n)`.
    pub fn parse_sql_type(text: &str) -> Self {
        let trimmed = text.trim();
        let upper = trimmed.to_uppercase();
        if upper == ENCRYPT_TYPE_NAME {
            return ColumnType::Encrypted { length: None };
        }
        if let Some(rest) = upper.strip_prefix(ENCRYPT_TYPE_NAME) {
            let rest = rest.trim();
            if let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
                if let Ok(length) = inner.trim().parse::<u64>() {
                    return ColumnType::Encrypted {
                        length: Some(length),
                    };
                }
            }
        }
        ColumnType::sql(trimmed)
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        matches!(self, ColumnType::Encrypted { .. })
    }

    /// Integer types usable as a link column.
    pub fn is_integer(&self) -> bool {
        match self {
            ColumnType::Sql { type_name } => {
                let upper = type_name.to_uppercase();
                let base = upper.split(|c: char| c == '(' || c.is_whitespace()).next().unwrap_or_default();
                matches!(
                    base,
                    "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT"
                )
            }
            ColumnType::Encrypted { .. } => false,
        }
    }
}

/// Binary length needed to store ciphertext for `length` plaintext bytes.
///
/// Block padding always adds at least one byte, so a full block grows by one block.
pub fn encrypted_storage_length(length: u64) -> u64 {
    ENCRYPTION_BLOCK_SIZE * (length / ENCRYPTION_BLOCK_SIZE + 1)
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Sql { type_name } => write!(f, "{}", type_name),
            ColumnType::Encrypted { length: None } => write!(f, "{}", ENCRYPT_TYPE_NAME),
            ColumnType::Encrypted {
                length: Some(length),
            } => write!(f, "{}({})", ENCRYPT_TYPE_NAME, length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encrypt_type() {
        assert_eq!(
            ColumnType::parse_sql_type("encrypt"),
            ColumnType::Encrypted { length: None }
        );
        assert_eq!(
            ColumnType::parse_sql_type("ENCRYPT(40)"),
            ColumnType::Encrypted { length: Some(40) }
        );
        assert_eq!(
            ColumnType::parse_sql_type("VARCHAR(20)"),
            ColumnType::sql("VARCHAR(20)")
        );
        assert_eq!(
            ColumnType::parse_sql_type("ENCRYPTED_BLOB"),
            ColumnType::sql("ENCRYPTED_BLOB")
        );
    }

    #[test]
    fn test_storage_length_pads_to_block() {
        assert_eq!(encrypted_storage_length(0), 16);
        assert_eq!(encrypted_storage_length(15), 16);
        assert_eq!(encrypted_storage_length(16), 32);
        assert_eq!(encrypted_storage_length(40), 48);
    }

    #[test]
    fn test_is_integer() {
        assert!(ColumnType::sql("BIGINT").is_integer());
        assert!(ColumnType::sql("int(11) unsigned").is_integer());
        assert!(!ColumnType::sql("VARCHAR(10)").is_integer());
        assert!(!ColumnType::encrypted(None).is_integer());
    }

    #[test]
    fn test_display() {
        assert_eq!(ColumnType::encrypted(Some(8)).to_string(), "ENCRYPT(8)");
        assert_eq!(ColumnType::sql("TEXT").to_string(), "TEXT");
    }
}
