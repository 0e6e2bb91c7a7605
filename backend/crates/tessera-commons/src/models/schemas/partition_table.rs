//! Logical view over a partition group.

use std::sync::Arc;

use super::{ColumnDefinition, TableDefinition};
use crate::models::TableName;

/// Where a logical column is physically stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnLocation {
    Primary,
    /// Position in the primary table's ordered extension list
    Extension(usize),
}

/// The client-visible table formed by a PRIMARY table and its EXTENSION tables.
///
/// Built from one database snapshot, so the extension list can never be
/// observed half-updated.
#[derive(Debug, Clone)]
pub struct PartitionTable {
    primary: Arc<TableDefinition>,
    extensions: Vec<Arc<TableDefinition>>,
    link_column: String,
}

impl PartitionTable {
    pub fn new(
        primary: Arc<TableDefinition>,
        extensions: Vec<Arc<TableDefinition>>,
        link_column: impl Into<String>,
    ) -> Self {
        Self {
            primary,
            extensions,
            link_column: link_column.into(),
        }
    }

    /// Name of the logical table (the primary table's name).
    pub fn name(&self) -> &TableName {
        self.primary.table_name()
    }

    pub fn primary(&self) -> &Arc<TableDefinition> {
        &self.primary
    }

    pub fn extensions(&self) -> &[Arc<TableDefinition>] {
        &self.extensions
    }

    pub fn extension(&self, index: usize) -> Option<&Arc<TableDefinition>> {
        self.extensions.get(index)
    }

    pub fn link_column(&self) -> &str {
        &self.link_column
    }

    /// Client-visible columns: primary first, then each extension in order.
    pub fn columns(&self) -> impl Iterator<Item = (ColumnLocation, &ColumnDefinition)> {
        let primary = self
            .primary
            .visible_columns()
            .map(|c| (ColumnLocation::Primary, c));
        let extensions = self.extensions.iter().enumerate().flat_map(|(idx, ext)| {
            ext.visible_columns()
                .map(move |c| (ColumnLocation::Extension(idx), c))
        });
        primary.chain(extensions)
    }

    /// Physical location of a visible column.
    pub fn column_location(&self, name: &str) -> Option<ColumnLocation> {
        self.columns()
            .find(|(_, c)| c.is_named(name))
            .map(|(location, _)| location)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns().find(|(_, c)| c.is_named(name)).map(|(_, c)| c)
    }

    pub fn has_encrypted_columns(&self) -> bool {
        self.primary.has_encrypted_columns()
            || self.extensions.iter().any(|ext| ext.has_encrypted_columns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schemas::ColumnType;
    use crate::models::TableId;

    fn table(name: &str, cols: &[&str], extensions: &[&str]) -> Arc<TableDefinition> {
        let mut columns: Vec<_> = cols
            .iter()
            .enumerate()
            .map(|(i, c)| {
                ColumnDefinition::simple(TableName::new(name), *c, i as u32 + 1, ColumnType::sql("INT"))
            })
            .collect();
        columns.push(ColumnDefinition::link_column(
            TableName::new(name),
            "$_ext_id",
            cols.len() as u32 + 1,
        ));
        let id = TableId::from_strings("ds0", "db", name);
        Arc::new(if extensions.is_empty() {
            TableDefinition::new_extension(id, columns, TableName::new("t1"), "$_ext_id")
        } else {
            TableDefinition::new_primary(
                id,
                columns,
                extensions.iter().map(|e| TableName::new(*e)).collect(),
                "$_ext_id",
            )
        })
    }

    #[test]
    fn test_column_location() {
        let partition = PartitionTable::new(
            table("t1", &["id", "col1"], &["ext1", "ext2"]),
            vec![table("ext1", &["col2"], &[]), table("ext2", &["col3"], &[])],
            "$_ext_id",
        );

        assert_eq!(partition.name().as_str(), "t1");
        assert_eq!(partition.column_location("id"), Some(ColumnLocation::Primary));
        assert_eq!(partition.column_location("COL2"), Some(ColumnLocation::Extension(0)));
        assert_eq!(partition.column_location("col3"), Some(ColumnLocation::Extension(1)));
        assert_eq!(partition.column_location("$_ext_id"), None);
        assert_eq!(partition.column_location("missing"), None);
    }

    #[test]
    fn test_columns_hide_link_column_and_keep_order() {
        let partition = PartitionTable::new(
            table("t1", &["id"], &["ext1"]),
            vec![table("ext1", &["b", "a"], &[])],
            "$_ext_id",
        );
        let names: Vec<_> = partition.columns().map(|(_, c)| c.column_name.as_str()).collect();
        assert_eq!(names, vec!["id", "b", "a"]);
    }
}
