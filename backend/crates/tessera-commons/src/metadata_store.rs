//! Shared, concurrently-read metadata store.
//!
//! **Architecture**:
//! - `DashMap<(DataSourceId, DatabaseName), Arc<Database>>`
//! - Copy-on-write: every change builds a new `Database` snapshot and swaps
//!   the `Arc` while holding the shard lock
//! - Readers clone the `Arc<Database>` once per statement and resolve every
//!   table against that snapshot

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::errors::{CommonError, Result};
use crate::models::{DataSourceId, Database, DatabaseName, TableDefinition, TableId, TableName, TableType};

type DatabaseKey = (DataSourceId, DatabaseName);

/// Process-wide table metadata, updated by the DDL watcher and read by every
/// connection's rewrite pass.
pub struct MetadataStore {
    databases: DashMap<DatabaseKey, Arc<Database>>,

    /// Incremented on every applied change
    generation: AtomicU64,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("databases", &self.databases.len())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore {
    pub fn new() -> Self {
        Self {
            databases: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Current snapshot of one database.
    pub fn get_database(&self, data_source: &DataSourceId, database: &DatabaseName) -> Option<Arc<Database>> {
        self.databases
            .get(&(data_source.clone(), database.clone()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Publishes a whole database snapshot, replacing the previous one.
    pub fn put_database(&self, database: Database) {
        let key = (database.data_source().clone(), database.name().clone());
        self.databases.insert(key, Arc::new(database));
        self.bump();
    }

    pub fn drop_database(&self, data_source: &DataSourceId, database: &DatabaseName) -> Option<Arc<Database>> {
        let removed = self
            .databases
            .remove(&(data_source.clone(), database.clone()))
            .map(|(_, db)| db);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Registers or replaces one table.
    pub fn put_table(&self, table: TableDefinition) -> Result<()> {
        self.put_tables(vec![table])
    }

    /// Registers a group of tables of one database in a single snapshot swap.
    ///
    /// A partition group must be published this way so readers see either the
    /// old group or the complete new one.
    pub fn put_tables(&self, tables: Vec<TableDefinition>) -> Result<()> {
        let Some(first) = tables.first() else {
            return Ok(());
        };
        let key = (
            first.table_id.data_source().clone(),
            first.table_id.database().clone(),
        );
        for table in &tables {
            if table.table_id.data_source() != &key.0 || table.table_id.database() != &key.1 {
                return Err(CommonError::invalid_input(format!(
                    "table {} is not in database {}:{}",
                    table.table_id, key.0, key.1
                )));
            }
            table.validate()?;
        }

        let count = tables.len();
        let mut entry = self
            .databases
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Database::new(key.0.clone(), key.1.clone())));
        let next = entry.value().with_tables(tables);
        *entry.value_mut() = Arc::new(next);
        drop(entry);

        self.bump();
        log::debug!("Published {} table(s) into {}:{}", count, key.0, key.1);
        Ok(())
    }

    /// Drops a table. Dropping a primary table drops its extension tables too.
    pub fn drop_table(&self, table_id: &TableId) -> Option<Arc<TableDefinition>> {
        let key = (table_id.data_source().clone(), table_id.database().clone());
        let mut entry = self.databases.get_mut(&key)?;

        let (mut next, removed) = entry.value().without_table(table_id.table_name());
        let removed = removed?;
        if removed.table_type == TableType::Primary {
            for ext in &removed.extension_tables {
                next = next.without_table(ext).0;
            }
        }
        *entry.value_mut() = Arc::new(next);
        drop(entry);

        self.bump();
        Some(removed)
    }

    /// Renames a table, keeping partition-group links and extension order intact.
    pub fn rename_table(&self, table_id: &TableId, new_name: TableName) -> Result<()> {
        let key = (table_id.data_source().clone(), table_id.database().clone());
        let mut entry = self
            .databases
            .get_mut(&key)
            .ok_or_else(|| CommonError::not_found(format!("database {}:{}", key.0, key.1)))?;

        let current = entry.value();
        if current.get_table(new_name.as_str()).is_some() {
            return Err(CommonError::already_exists(format!("table {}.{}", key.1, new_name)));
        }
        let (without, removed) = current.without_table(table_id.table_name());
        let table = removed.ok_or_else(|| CommonError::not_found(format!("table {}", table_id)))?;

        let renamed = table.renamed(new_name.clone());
        let mut updated = vec![renamed];
        match table.table_type {
            TableType::Primary => {
                for ext_name in &table.extension_tables {
                    if let Some(ext) = without.get_table(ext_name.as_str()) {
                        let mut ext = (**ext).clone();
                        ext.primary_table = Some(new_name.clone());
                        ext.version += 1;
                        updated.push(ext);
                    }
                }
            }
            TableType::Extension => {
                if let Some(primary) = table
                    .primary_table
                    .as_ref()
                    .and_then(|p| without.get_table(p.as_str()))
                {
                    let mut primary = (**primary).clone();
                    for ext in &mut primary.extension_tables {
                        if ext == table_id.table_name() {
                            *ext = new_name.clone();
                        }
                    }
                    primary.version += 1;
                    updated.push(primary);
                }
            }
            TableType::Standard => {}
        }

        *entry.value_mut() = Arc::new(without.with_tables(updated));
        drop(entry);

        self.bump();
        log::debug!("Renamed table {} to {}", table_id, new_name);
        Ok(())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDefinition, ColumnType};

    fn cols(table: &str, names: &[&str], link: bool) -> Vec<ColumnDefinition> {
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
                cols("t1", &["id"], true),
                vec![TableName::new("t1$ext0"), TableName::new("t1$ext1")],
                "$_ext_id",
            ),
            TableDefinition::new_extension(
                TableId::from_strings("ds0", "db", "t1$ext0"),
                cols("t1$ext0", &["a"], true),
                TableName::new("t1"),
                "$_ext_id",
            ),
            TableDefinition::new_extension(
                TableId::from_strings("ds0", "db", "t1$ext1"),
                cols("t1$ext1", &["b"], true),
                TableName::new("t1"),
                "$_ext_id",
            ),
        ]
    }

    fn key() -> (DataSourceId, DatabaseName) {
        (DataSourceId::new("ds0"), DatabaseName::new("db"))
    }

    #[test]
    fn test_put_tables_publishes_group() {
        let store = MetadataStore::new();
        store.put_tables(group()).unwrap();
        let db = store.get_database(&key().0, &key().1).unwrap();
        assert_eq!(db.len(), 3);
        assert!(db.partition_table("t1").is_some());
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_snapshot_survives_later_change() {
        let store = MetadataStore::new();
        store.put_tables(group()).unwrap();
        let before = store.get_database(&key().0, &key().1).unwrap();

        store.drop_table(&TableId::from_strings("ds0", "db", "t1"));

        assert_eq!(before.len(), 3);
        let after = store.get_database(&key().0, &key().1).unwrap();
        assert!(after.is_empty());
    }

    #[test]
    fn test_invalid_table_rejected() {
        let store = MetadataStore::new();
        let mut tables = group();
        tables[0].link_column = None;
        tables[0].columns.retain(|c| !c.is_builtin);
        tables[0].table_type = TableType::Primary;
        assert!(store.put_tables(tables).is_err());
        assert!(store.get_database(&key().0, &key().1).is_none());
    }

    #[test]
    fn test_rename_primary_keeps_extension_order() {
        let store = MetadataStore::new();
        store.put_tables(group()).unwrap();
        store
            .rename_table(&TableId::from_strings("ds0", "db", "t1"), TableName::new("orders"))
            .unwrap();

        let db = store.get_database(&key().0, &key().1).unwrap();
        assert!(db.get_table("t1").is_none());
        let partition = db.partition_table("orders").unwrap();
        let ext_names: Vec<_> = partition
            .extensions()
            .iter()
            .map(|e| e.table_name().as_str().to_string())
            .collect();
        assert_eq!(ext_names, vec!["t1$ext0", "t1$ext1"]);
    }

    #[test]
    fn test_rename_to_existing_name_fails() {
        let store = MetadataStore::new();
        store.put_tables(group()).unwrap();
        let err = store
            .rename_table(&TableId::from_strings("ds0", "db", "t1"), TableName::new("t1$ext0"))
            .unwrap_err();
        assert!(matches!(err, CommonError::AlreadyExists(_)));
    }

    #[test]
    fn test_concurrent_readers_see_complete_groups() {
        let store = Arc::new(MetadataStore::new());
        store.put_tables(group()).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let db = store.get_database(&key().0, &key().1).unwrap();
                        if let Some(partition) = db.partition_table("t1") {
                            assert_eq!(partition.extensions().len(), 2);
                        }
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            store.put_tables(group()).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
