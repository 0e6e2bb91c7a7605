//! Table Scope Resolver: per-statement name resolution, the subquery tree,
//! and the rewrite context that owns them.

pub mod context;
pub mod subquery_tree;
pub mod table_scope;

pub use context::{ResolvedTable, RewriteContext};
pub use subquery_tree::{ColumnOrigin, ProjectedColumn, ResolvedColumn, ScopeId, SubQueryTree, SubQueryTreeNode};
pub use table_scope::{ScopeEntry, ScopeSource, TableScope};
