//! Arena of nested query blocks and their scopes.
//!
//! Every SELECT block (and every DML statement) gets one node. A node's
//! projection records, per output column, whether the value leaves the block
//! as ciphertext and which physical column backs it. Derived tables point at
//! their node so an outer reference like `sub.y` can be traced back to the
//! encrypted column `y` was selected from.

use tessera_commons::models::TableName;

use super::table_scope::{ScopeEntry, ScopeSource, TableScope};

/// Index of a node in the [`SubQueryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// Physical column behind a projected or referenced value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnOrigin {
    pub table: TableName,
    pub column: String,
    pub encrypted: bool,
}

/// One output column of a query block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    /// Output name, lower-cased
    pub name: String,
    /// Value is still ciphertext when it leaves the block
    pub ciphertext: bool,
    pub origin: Option<ColumnOrigin>,
}

impl ProjectedColumn {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            ciphertext: false,
            origin: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubQueryTreeNode {
    /// Enclosing block for correlated lookups; `None` for top-level blocks,
    /// derived tables and CTEs
    pub parent: Option<ScopeId>,
    pub scope: TableScope,
    pub projection: Vec<ProjectedColumn>,
    /// Projection contains columns that could not be enumerated
    pub opaque: bool,
}

/// Result of resolving a column reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    /// Node whose scope declared the column's table
    pub scope: ScopeId,
    /// Entry index within that scope
    pub entry: usize,
    /// Canonical (lower-cased) column name
    pub column: String,
    /// Extension join alias to re-qualify the reference with
    pub extension_alias: Option<sqlparser::ast::Ident>,
    /// The referenced value is ciphertext
    pub encrypted: bool,
    pub origin: Option<ColumnOrigin>,
    /// Column is known to the metadata of its source
    pub known: bool,
}

#[derive(Debug, Default)]
pub struct SubQueryTree {
    nodes: Vec<SubQueryTreeNode>,
}

impl SubQueryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, parent: Option<ScopeId>, scope: TableScope) -> ScopeId {
        self.nodes.push(SubQueryTreeNode {
            parent,
            scope,
            projection: Vec::new(),
            opaque: false,
        });
        ScopeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: ScopeId) -> &SubQueryTreeNode {
        &self.nodes[id.0]
    }

    pub fn scope(&self, id: ScopeId) -> &TableScope {
        &self.nodes[id.0].scope
    }

    pub fn set_projection(&mut self, id: ScopeId, projection: Vec<ProjectedColumn>, opaque: bool) {
        let node = &mut self.nodes[id.0];
        node.projection = projection;
        node.opaque = opaque;
    }

    pub fn projection(&self, id: ScopeId) -> &[ProjectedColumn] {
        &self.nodes[id.0].projection
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolves `[schema.]table.column` (or a bare `column`) starting at `id`
    /// and walking up through enclosing blocks.
    ///
    /// A bare column only continues outward when every source of the current
    /// block has a known column list; otherwise it may belong to the unknown
    /// source and resolution stops.
    pub fn resolve_column(
        &self,
        id: ScopeId,
        qualifier: Option<(Option<&str>, &str)>,
        column: &str,
    ) -> Option<ResolvedColumn> {
        let mut current = Some(id);
        while let Some(scope_id) = current {
            if let Some(resolved) = self.resolve_in_scope(scope_id, qualifier, column) {
                return Some(resolved);
            }
            if qualifier.is_none() && !self.is_enumerable(scope_id) {
                return None;
            }
            current = self.nodes[scope_id.0].parent;
        }
        None
    }

    /// Every source of the block has a known column list.
    pub fn is_enumerable(&self, id: ScopeId) -> bool {
        self.scope(id).entries().iter().all(|entry| match &entry.source {
            ScopeSource::Table(_) | ScopeSource::Partitioned { .. } => true,
            ScopeSource::Derived(node) => !self.nodes[node.0].opaque,
            ScopeSource::Unknown => false,
        })
    }

    /// Resolution limited to one block.
    pub fn resolve_in_scope(
        &self,
        id: ScopeId,
        qualifier: Option<(Option<&str>, &str)>,
        column: &str,
    ) -> Option<ResolvedColumn> {
        let scope = self.scope(id);
        match qualifier {
            Some((schema, table)) => {
                let entry = scope.position(schema, table)?;
                Some(
                    self.resolve_in_entry(id, entry, &scope.entries()[entry], column)
                        .unwrap_or_else(|| ResolvedColumn {
                            scope: id,
                            entry,
                            column: column.to_lowercase(),
                            extension_alias: None,
                            encrypted: false,
                            origin: None,
                            known: false,
                        }),
                )
            }
            None => scope
                .entries()
                .iter()
                .enumerate()
                .find_map(|(idx, entry)| self.resolve_in_entry(id, idx, entry, column)),
        }
    }

    fn resolve_in_entry(
        &self,
        id: ScopeId,
        index: usize,
        entry: &ScopeEntry,
        column: &str,
    ) -> Option<ResolvedColumn> {
        let canonical = column.to_lowercase();
        match &entry.source {
            ScopeSource::Table(def) => {
                let col = def.column(column)?;
                Some(ResolvedColumn {
                    scope: id,
                    entry: index,
                    column: canonical,
                    extension_alias: None,
                    encrypted: col.is_encrypted(),
                    origin: Some(ColumnOrigin {
                        table: def.table_name().clone(),
                        column: col.column_name.clone(),
                        encrypted: col.is_encrypted(),
                    }),
                    known: true,
                })
            }
            ScopeSource::Partitioned { table, .. } => {
                let col = table.column(column)?;
                Some(ResolvedColumn {
                    scope: id,
                    entry: index,
                    column: canonical,
                    extension_alias: entry.extension_alias_for_column(column).cloned(),
                    encrypted: col.is_encrypted(),
                    origin: Some(ColumnOrigin {
                        table: col.table.clone(),
                        column: col.column_name.clone(),
                        encrypted: col.is_encrypted(),
                    }),
                    known: true,
                })
            }
            ScopeSource::Derived(node) => {
                let projected = self
                    .projection(*node)
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(column))?;
                Some(ResolvedColumn {
                    scope: id,
                    entry: index,
                    column: canonical,
                    extension_alias: None,
                    encrypted: projected.ciphertext,
                    origin: projected.origin.clone(),
                    known: true,
                })
            }
            ScopeSource::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::ast::Ident;
    use std::sync::Arc;
    use tessera_commons::models::{ColumnDefinition, ColumnType, TableDefinition, TableId};

    fn table_entry(name: &str, columns: &[(&str, bool)]) -> ScopeEntry {
        let table = TableName::new(name);
        let cols = columns
            .iter()
            .enumerate()
            .map(|(i, (c, enc))| {
                let ty = if *enc { ColumnType::encrypted(None) } else { ColumnType::sql("INT") };
                ColumnDefinition::simple(table.clone(), *c, i as u32 + 1, ty)
            })
            .collect();
        ScopeEntry {
            schema: None,
            name: Some(name.to_string()),
            alias: None,
            qualifier: vec![Ident::new(name)],
            source: ScopeSource::Table(Arc::new(TableDefinition::new_standard(
                TableId::from_strings("ds", "db", name),
                cols,
            ))),
        }
    }

    #[test]
    fn test_resolve_through_derived_projection() {
        let mut tree = SubQueryTree::new();

        let mut inner = TableScope::new(None);
        inner.push(table_entry("t2", &[("y", true)]));
        let inner_id = tree.add_node(None, inner);
        tree.set_projection(
            inner_id,
            vec![ProjectedColumn {
                name: "y".to_string(),
                ciphertext: true,
                origin: Some(ColumnOrigin {
                    table: TableName::new("t2"),
                    column: "y".to_string(),
                    encrypted: true,
                }),
            }],
            false,
        );

        let mut outer = TableScope::new(None);
        outer.push(table_entry("t1", &[("x", false)]));
        outer.push(ScopeEntry {
            schema: None,
            name: None,
            alias: Some("sub".to_string()),
            qualifier: vec![Ident::new("sub")],
            source: ScopeSource::Derived(inner_id),
        });
        let outer_id = tree.add_node(None, outer);

        let resolved = tree.resolve_column(outer_id, Some((None, "sub")), "Y").unwrap();
        assert!(resolved.encrypted);
        assert_eq!(resolved.entry, 1);
        assert_eq!(resolved.origin.unwrap().table.as_str(), "t2");

        let resolved = tree.resolve_column(outer_id, None, "x").unwrap();
        assert!(!resolved.encrypted);
        assert_eq!(resolved.entry, 0);
    }

    #[test]
    fn test_correlated_lookup_walks_parents() {
        let mut tree = SubQueryTree::new();
        let mut outer = TableScope::new(None);
        outer.push(table_entry("t1", &[("secret", true)]));
        let outer_id = tree.add_node(None, outer);

        let mut inner = TableScope::new(None);
        inner.push(table_entry("t2", &[("a", false)]));
        let inner_id = tree.add_node(Some(outer_id), inner);

        let resolved = tree.resolve_column(inner_id, Some((None, "t1")), "secret").unwrap();
        assert_eq!(resolved.scope, outer_id);
        assert!(resolved.encrypted);

        assert!(tree.resolve_in_scope(inner_id, Some((None, "t1")), "secret").is_none());
        assert!(tree.resolve_column(inner_id, None, "nope").is_none());
    }

    #[test]
    fn test_unknown_source_stops_bare_lookup() {
        let mut tree = SubQueryTree::new();
        let mut outer = TableScope::new(None);
        outer.push(table_entry("t1", &[("secret", true)]));
        let outer_id = tree.add_node(None, outer);

        let mut inner = TableScope::new(None);
        inner.push(ScopeEntry {
            schema: None,
            name: Some("legacy".to_string()),
            alias: None,
            qualifier: vec![Ident::new("legacy")],
            source: ScopeSource::Unknown,
        });
        let inner_id = tree.add_node(Some(outer_id), inner);

        assert!(tree.resolve_column(inner_id, None, "secret").is_none());
        assert!(tree.resolve_column(inner_id, Some((None, "t1")), "secret").is_some());
    }
}
