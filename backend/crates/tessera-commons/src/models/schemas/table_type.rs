//! Table type classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a physical table in the metadata model.
///
/// - **Standard**: ordinary table, stored as declared
/// - **Primary**: holds the non-offloaded columns of a partitioned logical table
/// - **Extension**: holds one block of offloaded columns, joined to its primary
///   table through the link column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TableType {
    #[default]
    Standard,
    Primary,
    Extension,
}

impl TableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::Standard => "STANDARD",
            TableType::Primary => "PRIMARY",
            TableType::Extension => "EXTENSION",
        }
    }

    /// Parse a table type from a string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "STANDARD" => Some(TableType::Standard),
            "PRIMARY" => Some(TableType::Primary),
            "EXTENSION" => Some(TableType::Extension),
            _ => None,
        }
    }

    /// True for tables that belong to a partition group.
    pub fn is_partition_member(&self) -> bool {
        matches!(self, TableType::Primary | TableType::Extension)
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
