//! Column definition for table schemas

use serde::{Deserialize, Serialize};

use super::ColumnType;
use crate::models::TableName;

/// Complete definition of a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name (case-insensitive, stored as lowercase)
    pub column_name: String,

    /// Declared type, `ColumnType::Encrypted` for virtual encrypted columns
    pub column_type: ColumnType,

    /// Ordinal position in table (1-indexed). Determines `SELECT *` ordering.
    pub ordinal_position: u32,

    pub is_nullable: bool,

    pub is_primary_key: bool,

    pub is_auto_increment: bool,

    /// Default expression as SQL text
    pub default_value: Option<String>,

    /// Owning table. Resolved through the database snapshot, never a pointer.
    pub table: TableName,

    /// Set on the link column of a partition group; builtin columns are never
    /// visible to clients.
    pub is_builtin: bool,
}

impl ColumnDefinition {
    /// Create a simple nullable column.
    pub fn simple(
        table: TableName,
        column_name: impl Into<String>,
        ordinal_position: u32,
        column_type: ColumnType,
    ) -> Self {
        Self {
            column_name: column_name.into().to_lowercase(),
            column_type,
            ordinal_position,
            is_nullable: true,
            is_primary_key: false,
            is_auto_increment: false,
            default_value: None,
            table,
            is_builtin: false,
        }
    }

    /// Create a primary key column (NOT NULL).
    pub fn primary_key(
        table: TableName,
        column_name: impl Into<String>,
        ordinal_position: u32,
        column_type: ColumnType,
    ) -> Self {
        Self {
            is_nullable: false,
            is_primary_key: true,
            ..Self::simple(table, column_name, ordinal_position, column_type)
        }
    }

    /// Create the hidden integer link column of a partition group.
    pub fn link_column(table: TableName, column_name: impl Into<String>, ordinal_position: u32) -> Self {
        Self {
            is_nullable: false,
            is_builtin: true,
            ..Self::simple(table, column_name, ordinal_position, ColumnType::sql("BIGINT"))
        }
    }

    pub fn with_nullable(mut self, is_nullable: bool) -> Self {
        self.is_nullable = is_nullable;
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn with_auto_increment(mut self, is_auto_increment: bool) -> Self {
        self.is_auto_increment = is_auto_increment;
        self
    }

    /// Case-insensitive name comparison.
    #[inline]
    pub fn is_named(&self, name: &str) -> bool {
        self.column_name.eq_ignore_ascii_case(name)
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.column_type.is_encrypted()
    }

    /// Columns a client can see in `SELECT *`.
    #[inline]
    pub fn is_visible(&self) -> bool {
        !self.is_builtin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_column_lowercases_name() {
        let col = ColumnDefinition::simple(TableName::new("t1"), "Email", 2, ColumnType::sql("TEXT"));
        assert_eq!(col.column_name, "email");
        assert!(col.is_nullable);
        assert!(col.is_named("EMAIL"));
        assert!(col.is_visible());
    }

    #[test]
    fn test_link_column_is_builtin() {
        let col = ColumnDefinition::link_column(TableName::new("t1"), "$_ext_id", 1);
        assert!(col.is_builtin);
        assert!(!col.is_visible());
        assert!(!col.is_nullable);
        assert!(col.column_type.is_integer());
    }

    #[test]
    fn test_encrypted_column() {
        let col = ColumnDefinition::simple(TableName::new("t1"), "ssn", 3, ColumnType::encrypted(Some(11)))
            .with_nullable(false);
        assert!(col.is_encrypted());
        assert!(!col.is_nullable);
    }
}
