//! Type-safe wrapper for database (schema) names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a database on a backend data source, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseName(String);

impl DatabaseName {
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DatabaseName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for DatabaseName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for DatabaseName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_name_normalized() {
        assert_eq!(DatabaseName::new("Shop").as_str(), "shop");
        assert_eq!(DatabaseName::from("SHOP"), DatabaseName::new("shop"));
    }
}
