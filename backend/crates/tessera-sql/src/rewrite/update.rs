//! UPDATE rewriting.

use std::collections::BTreeMap;

use sqlparser::ast::{Assignment, AssignmentTarget, Ident, ObjectName, TableWithJoins};

use super::exprs::{qualified, ColumnRef};
use super::query::QueryRewriter;
use crate::error::{RewriteError, Result};
use crate::parser::UpdateStatement;
use crate::scope::ScopeId;

/// Which parts of a partitioned table an UPDATE assigns to.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Touched {
    primary: bool,
    extension: bool,
}

impl QueryRewriter<'_, '_> {
    pub(crate) fn rewrite_update(&mut self, update: &mut UpdateStatement) -> Result<()> {
        let limited = !update.order_by.is_empty() || update.limit.is_some();
        if limited && update.is_multi_table() {
            return Err(RewriteError::invalid_sql(
                "ORDER BY and LIMIT are not allowed in a multi-table UPDATE",
            ));
        }
        let partition = if limited {
            self.partitioned_factor(&update.table.relation)
        } else {
            None
        };
        if let Some(partition) = partition {
            let order_by = std::mem::take(&mut update.order_by);
            let limit = update.limit.take();
            let link = Ident::new(partition.link_column());
            self.join_limited_rows(&mut update.table, link, &mut update.selection, order_by, limit)?;
        }

        let node = {
            let mut sources: Vec<&mut TableWithJoins> = std::iter::once(&mut update.table)
                .chain(update.from.as_mut())
                .collect();
            self.enter_sources(&mut sources, None)?
        };

        let mut touched: BTreeMap<usize, Touched> = BTreeMap::new();
        for assignment in &mut update.assignments {
            self.rewrite_assignment(assignment, node, &mut touched)?;
        }
        self.add_link_self_assignments(&mut update.assignments, node, &touched);

        if let Some(selection) = &mut update.selection {
            self.rewrite_expr(selection, node)?;
        }
        for item in &mut update.order_by {
            self.rewrite_expr(&mut item.expr, node)?;
        }
        Ok(())
    }

    /// Rewrites one `SET target = value`. Shared with `ON DUPLICATE KEY UPDATE`.
    pub(crate) fn rewrite_assignment(
        &mut self,
        assignment: &mut Assignment,
        node: ScopeId,
        touched: &mut BTreeMap<usize, Touched>,
    ) -> Result<()> {
        let names = match &mut assignment.target {
            AssignmentTarget::ColumnName(name) => std::slice::from_mut(name),
            AssignmentTarget::Tuple(names) => names.as_mut_slice(),
        };

        let mut encrypted_target = None;
        for name in names.iter_mut() {
            let Some(column) = ColumnRef::from_parts(&name.0) else {
                continue;
            };
            let Some(resolved) =
                self.ctx
                    .tree
                    .resolve_in_scope(node, column.qualifier(), &column.column.value)
            else {
                continue;
            };

            let entry = self.ctx.tree.scope(node).entry(resolved.entry);
            if entry.is_some_and(|e| e.is_partitioned()) {
                let state = touched.entry(resolved.entry).or_default();
                match &resolved.extension_alias {
                    Some(alias) => {
                        state.extension = true;
                        let column = column.column.clone();
                        *name = ObjectName(vec![alias.clone(), column]);
                    }
                    None => state.primary = true,
                }
            }
            if resolved.encrypted {
                encrypted_target = resolved.origin.clone();
            }
        }

        match (&assignment.target, encrypted_target) {
            (AssignmentTarget::ColumnName(_), Some(target)) => {
                self.rewrite_written_value(&mut assignment.value, node, Some(&target))
            }
            _ => self.rewrite_expr(&mut assignment.value, node),
        }
    }

    /// Row-based replication only logs the primary row when one of its
    /// columns is assigned, so extension-only updates also assign the link
    /// column to itself.
    fn add_link_self_assignments(
        &self,
        assignments: &mut Vec<Assignment>,
        node: ScopeId,
        touched: &BTreeMap<usize, Touched>,
    ) {
        let scope = self.ctx.tree.scope(node);
        for (index, state) in touched {
            if !state.extension || state.primary {
                continue;
            }
            let Some(entry) = scope.entry(*index) else {
                continue;
            };
            let Some((partition, _)) = entry.partition() else {
                continue;
            };
            let link = Ident::new(partition.link_column());
            let mut target = entry.qualifier.clone();
            target.push(link.clone());
            log::trace!("Adding link self-assignment for {}", entry.display_name());
            assignments.push(Assignment {
                target: AssignmentTarget::ColumnName(ObjectName(target)),
                value: qualified(&entry.qualifier, link.clone()),
            });
        }
    }
}
