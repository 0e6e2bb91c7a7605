//! DELETE rewriting.
//!
//! A DELETE on a partitioned table must also delete the extension rows, so
//! it always ends up in the multi-table form with every extension alias in
//! the target list.

use sqlparser::ast::{Delete, FromTable, Ident, ObjectName, TableFactor, TableWithJoins};

use super::exprs::table_factor;
use super::query::QueryRewriter;
use crate::error::{RewriteError, Result};
use crate::parser::utils::split_object_name;
use crate::scope::ScopeId;

impl QueryRewriter<'_, '_> {
    pub(crate) fn rewrite_delete(&mut self, delete: &mut Delete) -> Result<()> {
        let limited = !delete.order_by.is_empty() || delete.limit.is_some();
        let single_table = {
            let sources = from_tables(&delete.from);
            delete.tables.is_empty()
                && delete.using.is_none()
                && sources.len() == 1
                && sources[0].joins.is_empty()
        };
        if limited && !single_table {
            return Err(RewriteError::invalid_sql(
                "ORDER BY and LIMIT are not allowed in a multi-table DELETE",
            ));
        }

        let partition = if single_table {
            self.partitioned_factor(&from_tables(&delete.from)[0].relation)
        } else {
            None
        };
        if let Some(partition) = partition {
            let target = &mut from_tables_mut(&mut delete.from)[0];
            delete.tables = vec![target_name(&target.relation)];
            if limited {
                let order_by = std::mem::take(&mut delete.order_by);
                let limit = delete.limit.take();
                let link = Ident::new(partition.link_column());
                self.join_limited_rows(target, link, &mut delete.selection, order_by, limit)?;
            }
            delete.from = FromTable::WithFromKeyword(std::mem::take(from_tables_mut(&mut delete.from)));
        }

        let node = match &mut delete.using {
            Some(using) => {
                let mut sources: Vec<&mut TableWithJoins> = using.iter_mut().collect();
                self.enter_sources(&mut sources, None)?
            }
            None => {
                let mut sources: Vec<&mut TableWithJoins> =
                    from_tables_mut(&mut delete.from).iter_mut().collect();
                self.enter_sources(&mut sources, None)?
            }
        };

        if delete.using.is_some() {
            // `DELETE FROM a, b USING ...`: the FROM list names the targets
            let targets: Vec<ObjectName> = from_tables(&delete.from)
                .iter()
                .filter_map(|t| match &t.relation {
                    TableFactor::Table { name, .. } => Some(name.clone()),
                    _ => None,
                })
                .collect();
            let extra = self.extension_targets(&targets, node);
            from_tables_mut(&mut delete.from).extend(extra.into_iter().map(|alias| TableWithJoins {
                relation: table_factor(ObjectName(vec![alias]), None),
                joins: vec![],
            }));
        } else {
            let extra = self.extension_targets(&delete.tables, node);
            delete
                .tables
                .extend(extra.into_iter().map(|alias| ObjectName(vec![alias])));
        }

        if let Some(selection) = &mut delete.selection {
            self.rewrite_expr(selection, node)?;
        }
        for item in &mut delete.order_by {
            self.rewrite_expr(&mut item.expr, node)?;
        }
        Ok(())
    }

    /// Extension aliases of every partitioned delete target, minus the ones
    /// already listed.
    fn extension_targets(&self, targets: &[ObjectName], node: ScopeId) -> Vec<Ident> {
        let scope = self.ctx.tree.scope(node);
        let mut extra: Vec<Ident> = Vec::new();
        for target in targets {
            let (schema, Some(table)) = split_object_name(target) else {
                continue;
            };
            let Some(aliases) = scope.extension_aliases_for(schema.map(|s| s.value.as_str()), &table.value)
            else {
                continue;
            };
            for alias in aliases {
                let listed = targets
                    .iter()
                    .any(|t| t.0.len() == 1 && t.0[0].value.eq_ignore_ascii_case(&alias.value));
                if !listed && !extra.contains(alias) {
                    extra.push(alias.clone());
                }
            }
        }
        extra
    }
}

fn from_tables(from: &FromTable) -> &Vec<TableWithJoins> {
    match from {
        FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
    }
}

fn from_tables_mut(from: &mut FromTable) -> &mut Vec<TableWithJoins> {
    match from {
        FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
    }
}

/// Name a multi-table DELETE lists a target under: its alias when it has one.
fn target_name(factor: &TableFactor) -> ObjectName {
    match factor {
        TableFactor::Table { alias: Some(alias), .. } => ObjectName(vec![alias.name.clone()]),
        TableFactor::Table { name, .. } => name.clone(),
        _ => ObjectName(vec![]),
    }
}
