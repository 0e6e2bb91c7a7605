//! # tessera-commons
//!
//! Metadata model and shared helpers for the Tessera SQL proxy.
//!
//! ## Metadata Model
//!
//! - `TableName`, `DatabaseName`, `DataSourceId`, `TableId`: identifiers
//! - `TableType`: STANDARD / PRIMARY / EXTENSION
//! - `ColumnType`: declared type, including the virtual `ENCRYPT` type
//! - `TableDefinition`, `ColumnDefinition`: one physical table
//! - `PartitionTable`: logical view over a primary table and its extensions
//! - `Database`: immutable snapshot of one database's tables
//! - `MetadataStore`: concurrently-read, copy-on-write store of snapshots
//!
//! ## Example Usage
//!
//! ```rust
//! use tessera_commons::models::{ColumnDefinition, ColumnType, TableDefinition, TableId, TableName};
//! use tessera_commons::MetadataStore;
//!
//! let store = MetadataStore::new();
//! let table = TableDefinition::new_standard(
//!     TableId::from_strings("ds0", "shop", "orders"),
//!     vec![ColumnDefinition::primary_key(TableName::new("orders"), "id", 1, ColumnType::sql("BIGINT"))],
//! );
//! store.put_table(table).unwrap();
//! ```

pub mod errors;
pub mod helpers;
pub mod metadata_store;
pub mod models;

pub use errors::{CommonError, Result};
pub use metadata_store::MetadataStore;
pub use models::{
    ColumnDefinition, ColumnLocation, ColumnType, DataSourceId, Database, DatabaseName,
    PartitionTable, TableDefinition, TableId, TableName, TableType,
};
