//! Fully-qualified table identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DataSourceId, DatabaseName, TableName};

/// Identity of one physical table: data source, database and table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId {
    data_source: DataSourceId,
    database: DatabaseName,
    table: TableName,
}

impl TableId {
    pub fn new(data_source: DataSourceId, database: DatabaseName, table: TableName) -> Self {
        Self {
            data_source,
            database,
            table,
        }
    }

    /// Convenience constructor from string parts.
    pub fn from_strings(data_source: &str, database: &str, table: &str) -> Self {
        Self::new(
            DataSourceId::new(data_source),
            DatabaseName::new(database),
            TableName::new(table),
        )
    }

    #[inline]
    pub fn data_source(&self) -> &DataSourceId {
        &self.data_source
    }

    #[inline]
    pub fn database(&self) -> &DatabaseName {
        &self.database
    }

    #[inline]
    pub fn table_name(&self) -> &TableName {
        &self.table
    }

    /// Returns a sibling id in the same database with another table name.
    pub fn with_table(&self, table: TableName) -> Self {
        Self {
            data_source: self.data_source.clone(),
            database: self.database.clone(),
            table,
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.data_source, self.database, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_id_display() {
        let id = TableId::from_strings("ds0", "Shop", "Orders");
        assert_eq!(id.to_string(), "ds0:shop.orders");
    }

    #[test]
    fn test_with_table_keeps_database() {
        let id = TableId::from_strings("ds0", "shop", "orders");
        let ext = id.with_table(TableName::new("orders$ext0"));
        assert_eq!(ext.database().as_str(), "shop");
        assert_eq!(ext.data_source().as_str(), "ds0");
        assert_eq!(ext.table_name().as_str(), "orders$ext0");
    }
}
