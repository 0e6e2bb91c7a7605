//! Metadata model shared by the rewrite engine and the metadata watcher.
//!
//! Ownership follows the backend layout: a [`Database`] owns its tables and a
//! table owns its columns. Partition-group membership is a name reference.

pub mod data_source_id;
pub mod database;
pub mod database_name;
pub mod schemas;
pub mod table_id;
pub mod table_name;

pub use data_source_id::DataSourceId;
pub use database::Database;
pub use database_name::DatabaseName;
pub use schemas::{
    ColumnDefinition, ColumnLocation, ColumnType, PartitionTable, TableDefinition, TableType,
};
pub use table_id::TableId;
pub use table_name::TableName;
