//! Immutable database snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{CommonError, Result};
use crate::models::schemas::{PartitionTable, TableDefinition, TableType};
use crate::models::{DataSourceId, DatabaseName, TableName};

/// All tables of one database on one data source.
///
/// A `Database` is never mutated after it is published; the metadata store
/// swaps in a new snapshot built with [`Database::with_table`] and friends.
#[derive(Debug, Clone)]
pub struct Database {
    data_source: DataSourceId,
    name: DatabaseName,
    tables: HashMap<TableName, Arc<TableDefinition>>,
}

impl Database {
    pub fn new(data_source: DataSourceId, name: DatabaseName) -> Self {
        Self {
            data_source,
            name,
            tables: HashMap::new(),
        }
    }

    pub fn data_source(&self) -> &DataSourceId {
        &self.data_source
    }

    pub fn name(&self) -> &DatabaseName {
        &self.name
    }

    /// Looks up a table by name (case-insensitive).
    pub fn get_table(&self, name: &str) -> Option<&Arc<TableDefinition>> {
        self.tables.get(&TableName::new(name))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableDefinition>> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns a new snapshot containing `table`, replacing any previous entry.
    pub fn with_table(&self, table: TableDefinition) -> Self {
        self.with_tables(std::iter::once(table))
    }

    pub fn with_tables(&self, tables: impl IntoIterator<Item = TableDefinition>) -> Self {
        let mut next = self.clone();
        for table in tables {
            next.tables.insert(table.table_name().clone(), Arc::new(table));
        }
        next
    }

    /// Returns a new snapshot without `name`, plus the removed entry.
    pub fn without_table(&self, name: &TableName) -> (Self, Option<Arc<TableDefinition>>) {
        let mut next = self.clone();
        let removed = next.tables.remove(name);
        (next, removed)
    }

    /// Builds the logical view of a partitioned table, checking the group.
    pub fn resolve_partition_table(&self, name: &str) -> Result<PartitionTable> {
        let primary = self
            .get_table(name)
            .ok_or_else(|| CommonError::not_found(format!("table {}.{}", self.name, name)))?;
        if primary.table_type != TableType::Primary {
            return Err(CommonError::invalid_input(format!(
                "table {} is not partitioned",
                primary.table_id
            )));
        }
        let link_column = primary.link_column.clone().ok_or_else(|| {
            CommonError::invalid_metadata(format!("table {} has no link column", primary.table_id))
        })?;

        let mut extensions = Vec::with_capacity(primary.extension_tables.len());
        for ext_name in &primary.extension_tables {
            let ext = self.tables.get(ext_name).ok_or_else(|| {
                CommonError::invalid_metadata(format!(
                    "extension table {} of {} is missing",
                    ext_name, primary.table_id
                ))
            })?;
            if ext.table_type != TableType::Extension
                || ext.primary_table.as_ref() != Some(primary.table_name())
            {
                return Err(CommonError::invalid_metadata(format!(
                    "table {} is not an extension of {}",
                    ext.table_id, primary.table_id
                )));
            }
            if ext.link_column.as_deref() != Some(link_column.as_str()) {
                return Err(CommonError::invalid_metadata(format!(
                    "extension table {} does not share link column '{}'",
                    ext.table_id, link_column
                )));
            }
            extensions.push(Arc::clone(ext));
        }

        Ok(PartitionTable::new(Arc::clone(primary), extensions, link_column))
    }

    /// Logical view of a partitioned table; `None` for standard tables or a
    /// broken group.
    pub fn partition_table(&self, name: &str) -> Option<PartitionTable> {
        let table = self.get_table(name)?;
        if !table.is_partitioned() {
            return None;
        }
        match self.resolve_partition_table(name) {
            Ok(partition) => Some(partition),
            Err(e) => {
                log::warn!("Ignoring inconsistent partition group {}: {}", name, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schemas::{ColumnDefinition, ColumnType};
    use crate::models::TableId;

    fn db() -> Database {
        Database::new(DataSourceId::new("ds0"), DatabaseName::new("db"))
    }

    fn columns(table: &str, names: &[&str], link: bool) -> Vec<ColumnDefinition> {
        let mut cols: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, n)| {
                ColumnDefinition::simple(TableName::new(table), *n, i as u32 + 1, ColumnType::sql("INT"))
            })
            .collect();
        if link {
            cols.push(ColumnDefinition::link_column(TableName::new(table), "$_ext_id", 99));
        }
        cols
    }

    fn group() -> Vec<TableDefinition> {
        vec![
            TableDefinition::new_primary(
                TableId::from_strings("ds0", "db", "t1"),
                columns("t1", &["id"], true),
                vec![TableName::new("ext1")],
                "$_ext_id",
            ),
            TableDefinition::new_extension(
                TableId::from_strings("ds0", "db", "ext1"),
                columns("ext1", &["col2"], true),
                TableName::new("t1"),
                "$_ext_id",
            ),
        ]
    }

    #[test]
    fn test_with_table_is_copy_on_write() {
        let empty = db();
        let one = empty.with_tables(group());
        assert!(empty.is_empty());
        assert_eq!(one.len(), 2);
        assert!(one.get_table("T1").is_some());
    }

    #[test]
    fn test_partition_table_resolves_group() {
        let db = db().with_tables(group());
        let partition = db.partition_table("t1").expect("partitioned");
        assert_eq!(partition.extensions().len(), 1);
        assert_eq!(partition.link_column(), "$_ext_id");
        assert!(db.partition_table("ext1").is_none());
    }

    #[test]
    fn test_missing_extension_is_reported() {
        let mut tables = group();
        tables.pop();
        let db = db().with_tables(tables);
        assert!(matches!(
            db.resolve_partition_table("t1"),
            Err(CommonError::InvalidMetadata(_))
        ));
        assert!(db.partition_table("t1").is_none());
    }

    #[test]
    fn test_without_table() {
        let db = db().with_tables(group());
        let (next, removed) = db.without_table(&TableName::new("ext1"));
        assert!(removed.is_some());
        assert_eq!(next.len(), 1);
        assert_eq!(db.len(), 2);
    }
}
