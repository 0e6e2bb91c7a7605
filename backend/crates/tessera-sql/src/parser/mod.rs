//! Parser front: MySQL statement parsing, the statement model, and leading
//! hint attributes.

pub mod attributes;
pub mod statement;
pub mod utils;

pub use attributes::{ExtensionColumns, StatementAttributes};
pub use statement::{AlterTableStatement, SqlStatement, SqlStatementKind, UpdateStatement};
pub use utils::parse_single_statement;
