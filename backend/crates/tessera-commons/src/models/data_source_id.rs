//! Identifier of a backend data source (one MySQL instance group).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe wrapper for data source identifiers.
///
/// Unlike table and database names, data source ids are kept verbatim; they are
/// configuration keys, not SQL identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataSourceId(String);

impl DataSourceId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DataSourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DataSourceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for DataSourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
