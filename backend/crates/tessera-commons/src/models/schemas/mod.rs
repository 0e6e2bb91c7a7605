//! Table schema model: table types, column types and definitions, and the
//! partition-group view.

pub mod column_definition;
pub mod column_type;
pub mod partition_table;
pub mod table_definition;
pub mod table_type;

pub use column_definition::ColumnDefinition;
pub use column_type::{encrypted_storage_length, ColumnType, ENCRYPTION_BLOCK_SIZE, ENCRYPT_TYPE_NAME};
pub use partition_table::{ColumnLocation, PartitionTable};
pub use table_definition::TableDefinition;
pub use table_type::TableType;
