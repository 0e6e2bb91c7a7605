//! Type-safe wrapper for table names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe wrapper for table names.
///
/// Names are normalized to lowercase so that `Orders` and `orders` address the
/// same metadata entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName(String);

impl TableName {
    /// Creates a new TableName from a string.
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    /// Returns the table name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner String.
    #[inline]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TableName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TableName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_case_insensitive() {
        let name1 = TableName::new("Orders");
        let name2 = TableName::from("ORDERS".to_string());
        let name3: TableName = "orders".into();

        assert_eq!(name1, name2);
        assert_eq!(name2, name3);
        assert_eq!(name1.as_str(), "orders");
    }

    #[test]
    fn test_table_name_keeps_extension_suffix() {
        let name = TableName::new("Orders$ext0");
        assert_eq!(name.to_string(), "orders$ext0");
        assert_eq!(name.into_string(), "orders$ext0");
    }
}
