//! INSERT / REPLACE rewriting: values stored into encrypted columns are
//! encrypted on the way in.

use std::collections::BTreeMap;

use sqlparser::ast::{Expr, Ident, Insert, OnInsert};
use tessera_commons::models::{ColumnDefinition, TableDefinition};

use super::query::{ProjectionMode, QueryRewriter};
use crate::error::{RewriteError, Result};
use crate::parser::utils::split_object_name;
use crate::scope::{ColumnOrigin, ResolvedTable, ScopeEntry, ScopeSource, TableScope};

impl QueryRewriter<'_, '_> {
    pub(crate) fn rewrite_insert(&mut self, insert: &mut Insert) -> Result<()> {
        let (schema, table) = split_object_name(&insert.table_name);
        let Some(table) = table else {
            return Ok(());
        };
        let schema_name = schema.map(|s| s.value.to_lowercase());
        let table_name = table.value.to_lowercase();

        let definition = match self.ctx.lookup_table(schema_name.as_deref(), &table_name) {
            Some(ResolvedTable::Partitioned(_)) => {
                return Err(RewriteError::invalid_sql(format!(
                    "INSERT into partitioned table '{table_name}' is not supported"
                )));
            }
            Some(ResolvedTable::Standard(def)) => Some(def),
            None => None,
        };

        let targets = match &definition {
            Some(def) if def.has_encrypted_columns() => target_columns(def, &insert.columns),
            _ => Vec::new(),
        };
        if let Some(source) = &mut insert.source {
            self.rewrite_query(source, &ProjectionMode::EncryptInto(targets), None)?;
        }

        if let Some(OnInsert::DuplicateKeyUpdate(assignments)) = &mut insert.on {
            let mut scope = TableScope::new(self.ctx.default_database());
            scope.push(ScopeEntry {
                schema: schema_name,
                name: Some(table_name),
                alias: insert.table_alias.as_ref().map(|a| a.value.to_lowercase()),
                qualifier: match &insert.table_alias {
                    Some(alias) => vec![alias.clone()],
                    None => insert.table_name.0.clone(),
                },
                source: definition.map_or(ScopeSource::Unknown, ScopeSource::Table),
            });
            let node = self.ctx.tree.add_node(None, scope);

            let mut touched = BTreeMap::new();
            for assignment in assignments {
                // VALUES(col) already carries the encrypted row value
                if is_values_call(&assignment.value) {
                    continue;
                }
                self.rewrite_assignment(assignment, node, &mut touched)?;
            }
        }
        Ok(())
    }
}

/// Encrypted target per value position.
fn target_columns(def: &TableDefinition, columns: &[Ident]) -> Vec<Option<ColumnOrigin>> {
    let origin = |column: &ColumnDefinition| {
        column.is_encrypted().then(|| ColumnOrigin {
            table: def.table_name().clone(),
            column: column.column_name.clone(),
            encrypted: true,
        })
    };
    if columns.is_empty() {
        def.visible_columns().map(origin).collect()
    } else {
        columns
            .iter()
            .map(|ident| def.column(&ident.value).and_then(origin))
            .collect()
    }
}

fn is_values_call(expr: &Expr) -> bool {
    matches!(expr, Expr::Function(function) if function.name.to_string().eq_ignore_ascii_case("values"))
}
