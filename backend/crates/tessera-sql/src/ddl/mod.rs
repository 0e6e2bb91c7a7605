//! DDL processing for the virtual `ENCRYPT` column type.

pub mod encrypt_column;

pub use encrypt_column::{EncryptColumnInfo, EncryptColumnProcessor, EncryptType, MigrationDirection};
