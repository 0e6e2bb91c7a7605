//! Table definition: identity, type, columns and partition-group links.

use serde::{Deserialize, Serialize};

use super::{ColumnDefinition, TableType};
use crate::errors::{CommonError, Result};
use crate::models::{TableId, TableName};

/// Metadata of one physical table.
///
/// Partition groups are described by name references only: a PRIMARY table
/// lists its extension tables in order, every EXTENSION table names its
/// primary table, and all members share `link_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub table_id: TableId,

    /// Bumped on every schema change applied through the metadata store
    pub version: u64,

    pub table_type: TableType,

    /// Ordered by `ordinal_position`
    pub columns: Vec<ColumnDefinition>,

    /// Ordered extension tables (PRIMARY only). Addressed positionally.
    #[serde(default)]
    pub extension_tables: Vec<TableName>,

    /// Owning primary table (EXTENSION only)
    #[serde(default)]
    pub primary_table: Option<TableName>,

    /// Link column shared by the partition group
    #[serde(default)]
    pub link_column: Option<String>,
}

impl TableDefinition {
    /// Create a STANDARD table.
    pub fn new_standard(table_id: TableId, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            table_id,
            version: 1,
            table_type: TableType::Standard,
            columns,
            extension_tables: Vec::new(),
            primary_table: None,
            link_column: None,
        }
    }

    /// Create the PRIMARY table of a partition group.
    pub fn new_primary(
        table_id: TableId,
        columns: Vec<ColumnDefinition>,
        extension_tables: Vec<TableName>,
        link_column: impl Into<String>,
    ) -> Self {
        Self {
            table_type: TableType::Primary,
            extension_tables,
            link_column: Some(link_column.into().to_lowercase()),
            ..Self::new_standard(table_id, columns)
        }
    }

    /// Create an EXTENSION table of a partition group.
    pub fn new_extension(
        table_id: TableId,
        columns: Vec<ColumnDefinition>,
        primary_table: TableName,
        link_column: impl Into<String>,
    ) -> Self {
        Self {
            table_type: TableType::Extension,
            primary_table: Some(primary_table),
            link_column: Some(link_column.into().to_lowercase()),
            ..Self::new_standard(table_id, columns)
        }
    }

    #[inline]
    pub fn table_name(&self) -> &TableName {
        self.table_id.table_name()
    }

    #[inline]
    pub fn is_partitioned(&self) -> bool {
        self.table_type == TableType::Primary
    }

    /// Looks up a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.is_named(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Columns a client can see, in ordinal order.
    pub fn visible_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.is_visible())
    }

    pub fn has_encrypted_columns(&self) -> bool {
        self.columns.iter().any(|c| c.is_encrypted())
    }

    /// Returns the link column definition when the table belongs to a partition group.
    pub fn link_column_definition(&self) -> Option<&ColumnDefinition> {
        self.link_column.as_deref().and_then(|name| self.column(name))
    }

    /// Returns a copy under a new name, with column back references updated and
    /// the version bumped.
    pub fn renamed(&self, new_name: TableName) -> Self {
        let mut next = self.clone();
        next.table_id = self.table_id.with_table(new_name.clone());
        for column in &mut next.columns {
            column.table = new_name.clone();
        }
        next.version += 1;
        next
    }

    /// Checks structural invariants of this single table.
    ///
    /// Group-level consistency (extension tables exist and point back) is
    /// checked by `Database::partition_table`.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(CommonError::invalid_metadata(format!(
                "table {} has no columns",
                self.table_id
            )));
        }

        for (idx, column) in self.columns.iter().enumerate() {
            if self.columns[..idx].iter().any(|c| c.is_named(&column.column_name)) {
                return Err(CommonError::invalid_metadata(format!(
                    "duplicate column '{}' in table {}",
                    column.column_name, self.table_id
                )));
            }
            if &column.table != self.table_name() {
                return Err(CommonError::invalid_metadata(format!(
                    "column '{}' belongs to '{}' but is listed in table {}",
                    column.column_name, column.table, self.table_id
                )));
            }
        }

        match self.table_type {
            TableType::Standard => {
                if self.link_column.is_some() || !self.extension_tables.is_empty() {
                    return Err(CommonError::invalid_metadata(format!(
                        "standard table {} cannot carry partition links",
                        self.table_id
                    )));
                }
                if let Some(column) = self.columns.iter().find(|c| c.is_builtin) {
                    return Err(CommonError::invalid_metadata(format!(
                        "standard table {} has builtin column '{}'",
                        self.table_id, column.column_name
                    )));
                }
            }
            TableType::Primary | TableType::Extension => {
                if self.table_type == TableType::Primary && self.extension_tables.is_empty() {
                    return Err(CommonError::invalid_metadata(format!(
                        "primary table {} has no extension tables",
                        self.table_id
                    )));
                }
                if self.table_type == TableType::Extension && self.primary_table.is_none() {
                    return Err(CommonError::invalid_metadata(format!(
                        "extension table {} has no primary table",
                        self.table_id
                    )));
                }
                let link = self.link_column_definition().ok_or_else(|| {
                    CommonError::invalid_metadata(format!(
                        "table {} is missing its link column",
                        self.table_id
                    ))
                })?;
                if !link.is_builtin || !link.column_type.is_integer() {
                    return Err(CommonError::invalid_metadata(format!(
                        "link column '{}' of table {} must be a builtin integer column",
                        link.column_name, self.table_id
                    )));
                }
                if self.columns.iter().filter(|c| c.is_builtin).count() != 1 {
                    return Err(CommonError::invalid_metadata(format!(
                        "table {} must have exactly one builtin column",
                        self.table_id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schemas::ColumnType;

    fn id(name: &str) -> TableId {
        TableId::from_strings("ds0", "shop", name)
    }

    fn col(table: &str, name: &str, pos: u32) -> ColumnDefinition {
        ColumnDefinition::simple(TableName::new(table), name, pos, ColumnType::sql("INT"))
    }

    #[test]
    fn test_standard_table_validates() {
        let table = TableDefinition::new_standard(id("t"), vec![col("t", "a", 1), col("t", "b", 2)]);
        assert!(table.validate().is_ok());
        assert!(!table.is_partitioned());
        assert!(table.has_column("A"));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let table = TableDefinition::new_standard(id("t"), vec![col("t", "a", 1), col("t", "A", 2)]);
        assert!(matches!(table.validate(), Err(CommonError::InvalidMetadata(_))));
    }

    #[test]
    fn test_primary_requires_link_column() {
        let table = TableDefinition::new_primary(
            id("t"),
            vec![col("t", "a", 1)],
            vec![TableName::new("t$ext0")],
            "$_ext_id",
        );
        assert!(table.validate().is_err());

        let table = TableDefinition::new_primary(
            id("t"),
            vec![col("t", "a", 1), ColumnDefinition::link_column(TableName::new("t"), "$_ext_id", 2)],
            vec![TableName::new("t$ext0")],
            "$_ext_id",
        );
        assert!(table.validate().is_ok());
        assert!(table.is_partitioned());
        assert_eq!(table.visible_columns().count(), 1);
    }

    #[test]
    fn test_renamed_updates_back_references() {
        let table = TableDefinition::new_standard(id("t"), vec![col("t", "a", 1)]);
        let renamed = table.renamed(TableName::new("u"));
        assert_eq!(renamed.table_name().as_str(), "u");
        assert_eq!(renamed.columns[0].table.as_str(), "u");
        assert_eq!(renamed.version, table.version + 1);
        assert!(renamed.validate().is_ok());
    }
}
