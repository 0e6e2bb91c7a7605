//! # tessera-sql
//!
//! SQL rewrite engine of the Tessera MySQL proxy. It makes two storage-level
//! transformations invisible to clients:
//!
//! - **Table partitioning**: a logical table wider than the backend column
//!   limit is stored as a primary table plus extension tables joined on a
//!   hidden link column.
//! - **Column encryption**: columns declared `ENCRYPT` are stored as binary
//!   ciphertext; reads get `DECRYPT(...)` and writes get `ENCRYPT(...)`.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_commons::models::DataSourceId;
//! use tessera_commons::MetadataStore;
//! use tessera_sql::{RewriteEngine, SessionContext, SqlStatement};
//!
//! let session = SessionContext::new(Arc::new(MetadataStore::new()), DataSourceId::new("ds0"))
//!     .with_database("shop");
//! let engine = RewriteEngine::default();
//!
//! let mut statement = SqlStatement::parse("SELECT id FROM orders WHERE id = 1").unwrap();
//! let outcome = engine.rewrite(&mut statement, &session).unwrap();
//! assert!(!outcome.changed);
//! ```

pub mod ddl;
pub mod error;
pub mod parser;
pub mod planner;
pub mod rewrite;
pub mod scope;
pub mod session;

pub use error::{Result, RewriteError, RewriteErrorKind};
pub use parser::{SqlStatement, SqlStatementKind, StatementAttributes};
pub use planner::{PartitionPlan, TablePartitionPlanner};
pub use rewrite::{PreparedPartition, RewriteEngine, RewriteOutcome};
pub use session::SessionContext;
