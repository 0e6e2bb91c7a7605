//! SELECT rewriting.
//!
//! [`QueryRewriter`] is the base pass: it builds a scope per query block,
//! injects extension joins for partitioned tables, re-qualifies extension
//! columns and wraps encrypted columns in `ENCRYPT`/`DECRYPT`. The UPDATE,
//! DELETE and INSERT rewriters specialise it.

use std::ops::ControlFlow;

use sqlparser::ast::{
    BinaryOperator, Expr, GroupByExpr, Ident, Join, ObjectName, Query, Select, SelectItem,
    SetExpr, TableAliasColumnDef, TableFactor, TableWithJoins, VisitMut, VisitorMut,
};
use tessera_commons::models::{PartitionTable, TableName};

use super::exprs::{
    compound, constraint_expr_mut, eq, is_default_keyword, join_on, qualified, qualified_wildcard,
    table_factor, take_expr, ColumnRef,
};
use crate::error::{RewriteError, Result};
use crate::parser::utils::{qualified_object_name, split_object_name};
use crate::scope::{
    ColumnOrigin, ProjectedColumn, ResolvedColumn, ResolvedTable, RewriteContext, ScopeEntry,
    ScopeId, ScopeSource, TableScope,
};

/// How a query block hands its output columns to the consumer.
#[derive(Debug, Clone)]
pub(crate) enum ProjectionMode {
    /// Output reaches the client: encrypted values are decrypted
    Decrypt,
    /// Derived table or CTE body: ciphertext passes through to the outer block
    PassThrough,
    /// INSERT source: position `i` feeds `targets[i]`, `Some` when that
    /// target column is encrypted
    EncryptInto(Vec<Option<ColumnOrigin>>),
}

impl ProjectionMode {
    fn for_set_operand(&self) -> ProjectionMode {
        match self {
            ProjectionMode::EncryptInto(targets) => ProjectionMode::EncryptInto(targets.clone()),
            _ => ProjectionMode::Decrypt,
        }
    }

    fn target(&self, position: usize) -> Option<&ColumnOrigin> {
        match self {
            ProjectionMode::EncryptInto(targets) => targets.get(position).and_then(Option::as_ref),
            _ => None,
        }
    }

    fn passes_ciphertext(&self) -> bool {
        matches!(self, ProjectionMode::PassThrough)
    }
}

/// What a projected expression turned into.
struct ProjectedValue {
    ciphertext: bool,
    origin: Option<ColumnOrigin>,
    /// A bare column reference was wrapped in a call and lost its output name
    wrapped: bool,
}

pub(crate) struct QueryRewriter<'c, 'a> {
    pub(crate) ctx: &'c mut RewriteContext<'a>,
    /// CTE names visible at the current point, innermost last
    ctes: Vec<(String, ScopeId)>,
}

impl<'c, 'a> QueryRewriter<'c, 'a> {
    pub(crate) fn new(ctx: &'c mut RewriteContext<'a>) -> Self {
        Self { ctx, ctes: Vec::new() }
    }

    /// Rewrites one query (WITH, body, ORDER BY) and returns the node whose
    /// projection describes its output.
    pub(crate) fn rewrite_query(
        &mut self,
        query: &mut Query,
        mode: &ProjectionMode,
        parent: Option<ScopeId>,
    ) -> Result<ScopeId> {
        let visible_ctes = self.ctes.len();

        if let Some(with) = &mut query.with {
            for cte in &mut with.cte_tables {
                let node = self.rewrite_query(&mut cte.query, &ProjectionMode::PassThrough, None)?;
                self.rename_projection(node, &cte.alias.columns);
                self.ctes.push((cte.alias.name.value.to_lowercase(), node));
            }
        }

        let node = self.rewrite_set_expr(&mut query.body, mode, parent)?;

        if let Some(order_by) = &mut query.order_by {
            for item in &mut order_by.exprs {
                self.rewrite_expr(&mut item.expr, node)?;
            }
        }

        self.ctes.truncate(visible_ctes);
        Ok(node)
    }

    fn rewrite_set_expr(
        &mut self,
        body: &mut SetExpr,
        mode: &ProjectionMode,
        parent: Option<ScopeId>,
    ) -> Result<ScopeId> {
        match body {
            SetExpr::Select(select) => self.rewrite_select(select, mode, parent),
            SetExpr::Query(query) => self.rewrite_query(query, mode, parent),
            SetExpr::SetOperation { left, right, .. } => {
                let operand_mode = mode.for_set_operand();
                let first = self.rewrite_set_expr(left, &operand_mode, parent)?;
                self.rewrite_set_expr(right, &operand_mode, parent)?;

                // Column names come from the first operand; values are plaintext
                let projection = self
                    .ctx
                    .tree
                    .projection(first)
                    .iter()
                    .map(|p| ProjectedColumn::plain(p.name.clone()))
                    .collect();
                let opaque = self.ctx.tree.node(first).opaque;
                let node = self.new_node(parent);
                self.ctx.tree.set_projection(node, projection, opaque);
                Ok(node)
            }
            SetExpr::Values(values) => {
                let node = self.new_node(parent);
                for row in &mut values.rows {
                    for (position, value) in row.iter_mut().enumerate() {
                        let target = mode.target(position).cloned();
                        self.rewrite_written_value(value, node, target.as_ref())?;
                    }
                }
                self.ctx.tree.set_projection(node, Vec::new(), true);
                Ok(node)
            }
            SetExpr::Insert(_) | SetExpr::Update(_) | SetExpr::Table(_) => {
                let node = self.new_node(parent);
                self.ctx.tree.set_projection(node, Vec::new(), true);
                Ok(node)
            }
        }
    }

    fn rewrite_select(
        &mut self,
        select: &mut Select,
        mode: &ProjectionMode,
        parent: Option<ScopeId>,
    ) -> Result<ScopeId> {
        let node = {
            let mut sources: Vec<&mut TableWithJoins> = select.from.iter_mut().collect();
            self.enter_sources(&mut sources, parent)?
        };

        let (projection, opaque) = self.rewrite_projection(&mut select.projection, node, mode)?;

        if let Some(selection) = &mut select.selection {
            self.rewrite_expr(selection, node)?;
        }
        if let GroupByExpr::Expressions(exprs, _) = &mut select.group_by {
            for expr in exprs {
                self.rewrite_expr(expr, node)?;
            }
        }
        if let Some(having) = &mut select.having {
            self.rewrite_expr(having, node)?;
        }
        if let Some(qualify) = &mut select.qualify {
            self.rewrite_expr(qualify, node)?;
        }

        self.ctx.tree.set_projection(node, projection, opaque);
        Ok(node)
    }

    fn new_node(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let scope = TableScope::new(self.ctx.default_database());
        self.ctx.tree.add_node(parent, scope)
    }

    fn rename_projection(&mut self, node: ScopeId, columns: &[TableAliasColumnDef]) {
        if columns.is_empty() {
            return;
        }
        let mut projection = self.ctx.tree.projection(node).to_vec();
        for (projected, column) in projection.iter_mut().zip(columns) {
            projected.name = column.name.value.to_lowercase();
        }
        let opaque = self.ctx.tree.node(node).opaque;
        self.ctx.tree.set_projection(node, projection, opaque);
    }

    // ---------------------------------------------------------------------
    // Table sources
    // ---------------------------------------------------------------------

    /// Builds the scope of one block from its table sources, injects the
    /// extension joins and rewrites the join conditions.
    pub(crate) fn enter_sources(
        &mut self,
        sources: &mut [&mut TableWithJoins],
        parent: Option<ScopeId>,
    ) -> Result<ScopeId> {
        let mut scope = TableScope::new(self.ctx.default_database());
        for source in sources.iter_mut() {
            self.collect_factor(&mut source.relation, &mut scope)?;
            for join in &mut source.joins {
                self.collect_factor(&mut join.relation, &mut scope)?;
            }
        }
        let node = self.ctx.tree.add_node(parent, scope);

        let mut cursor = 0;
        for source in sources.iter_mut() {
            self.inject_extension_joins(source, node, &mut cursor)?;
        }
        for source in sources.iter_mut() {
            self.rewrite_join_constraints(source, node)?;
        }
        Ok(node)
    }

    /// Adds one scope entry per table factor, in FROM order. Nested joins
    /// contribute their members.
    fn collect_factor(&mut self, factor: &mut TableFactor, scope: &mut TableScope) -> Result<()> {
        match factor {
            TableFactor::Table {
                name, alias, args, ..
            } if args.is_none() => {
                let (schema, table) = split_object_name(name);
                let Some(table) = table else {
                    scope.push(unknown_entry(None));
                    return Ok(());
                };
                let schema_name = schema.map(|s| s.value.to_lowercase());
                let table_name = table.value.to_lowercase();
                let qualifier = match alias {
                    Some(alias) => vec![alias.name.clone()],
                    None => name.0.clone(),
                };

                let cte = if schema_name.is_none() {
                    self.cte(&table_name)
                } else {
                    None
                };
                let source = match cte {
                    Some(node) => ScopeSource::Derived(node),
                    None => match self.ctx.lookup_table(schema_name.as_deref(), &table_name) {
                        Some(ResolvedTable::Partitioned(table)) => {
                            let ext_aliases = table
                                .extensions()
                                .iter()
                                .map(|_| self.ctx.allocate_extension_alias())
                                .collect();
                            ScopeSource::Partitioned { table, ext_aliases }
                        }
                        Some(ResolvedTable::Standard(def)) => ScopeSource::Table(def),
                        None => ScopeSource::Unknown,
                    },
                };

                scope.push(ScopeEntry {
                    schema: schema_name,
                    name: Some(table_name),
                    alias: alias.as_ref().map(|a| a.name.value.to_lowercase()),
                    qualifier,
                    source,
                });
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let node = self.rewrite_query(subquery, &ProjectionMode::PassThrough, None)?;
                if let Some(alias) = alias {
                    self.rename_projection(node, &alias.columns);
                }
                scope.push(ScopeEntry {
                    schema: None,
                    name: None,
                    alias: alias.as_ref().map(|a| a.name.value.to_lowercase()),
                    qualifier: alias.iter().map(|a| a.name.clone()).collect(),
                    source: ScopeSource::Derived(node),
                });
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.collect_factor(&mut table_with_joins.relation, scope)?;
                for join in &mut table_with_joins.joins {
                    self.collect_factor(&mut join.relation, scope)?;
                }
            }
            TableFactor::Table { alias, .. } => {
                scope.push(unknown_entry(alias.as_ref().map(|a| &a.name)));
            }
            _ => {
                scope.push(unknown_entry(None));
            }
        }
        Ok(())
    }

    fn cte(&self, name: &str) -> Option<ScopeId> {
        self.ctes
            .iter()
            .rev()
            .find(|(cte, _)| cte == name)
            .map(|(_, node)| *node)
    }

    /// Walks the sources in the same order as [`Self::collect_factor`] and
    /// adds the extension joins of each partitioned entry.
    ///
    /// A partitioned leading table gets its joins at the front of the join
    /// list; a partitioned join operand is wrapped in a nested join so the
    /// original ON condition can still see the extension aliases.
    fn inject_extension_joins(
        &mut self,
        source: &mut TableWithJoins,
        node: ScopeId,
        cursor: &mut usize,
    ) -> Result<()> {
        let mut joins = self.inject_into_factor(&mut source.relation, node, cursor)?;
        for mut join in std::mem::take(&mut source.joins) {
            let extension_joins = self.inject_into_factor(&mut join.relation, node, cursor)?;
            if !extension_joins.is_empty() {
                let relation = std::mem::replace(&mut join.relation, placeholder_factor());
                join.relation = TableFactor::NestedJoin {
                    table_with_joins: Box::new(TableWithJoins {
                        relation,
                        joins: extension_joins,
                    }),
                    alias: None,
                };
            }
            joins.push(join);
        }
        source.joins = joins;
        Ok(())
    }

    fn inject_into_factor(
        &mut self,
        factor: &mut TableFactor,
        node: ScopeId,
        cursor: &mut usize,
    ) -> Result<Vec<Join>> {
        match factor {
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.inject_extension_joins(table_with_joins, node, cursor)?;
                Ok(Vec::new())
            }
            _ => {
                let index = *cursor;
                *cursor += 1;
                let entry = self
                    .ctx
                    .tree
                    .scope(node)
                    .entry(index)
                    .ok_or_else(|| RewriteError::Internal(format!("no scope entry {index}")))?;
                Ok(self.extension_joins(entry))
            }
        }
    }

    /// `LEFT JOIN ext AS $ext_k ON q.link = $ext_k.link` for every extension table.
    fn extension_joins(&self, entry: &ScopeEntry) -> Vec<Join> {
        let Some((table, aliases)) = entry.partition() else {
            return Vec::new();
        };
        let link = Ident::new(table.link_column());
        let schema = entry.schema.as_deref().map(Ident::new);
        table
            .extensions()
            .iter()
            .zip(aliases)
            .map(|(extension, alias)| {
                let name = qualified_object_name(schema.as_ref(), extension.table_name().as_str());
                join_on(
                    table_factor(name, Some(alias.clone())),
                    true,
                    eq(
                        qualified(&entry.qualifier, link.clone()),
                        qualified(std::slice::from_ref(alias), link.clone()),
                    ),
                )
            })
            .collect()
    }

    fn rewrite_join_constraints(&mut self, source: &mut TableWithJoins, node: ScopeId) -> Result<()> {
        if let TableFactor::NestedJoin {
            table_with_joins, ..
        } = &mut source.relation
        {
            self.rewrite_join_constraints(table_with_joins, node)?;
        }
        for join in &mut source.joins {
            if let TableFactor::NestedJoin {
                table_with_joins, ..
            } = &mut join.relation
            {
                self.rewrite_join_constraints(table_with_joins, node)?;
            }
            if let Some(constraint) = constraint_expr_mut(&mut join.join_operator) {
                self.rewrite_expr(constraint, node)?;
            }
        }
        Ok(())
    }

    /// Partition group behind a target factor, if it is a partitioned table.
    pub(crate) fn partitioned_factor(&mut self, factor: &TableFactor) -> Option<PartitionTable> {
        let TableFactor::Table { name, .. } = factor else {
            return None;
        };
        let (schema, Some(table)) = split_object_name(name) else {
            return None;
        };
        let schema = schema.map(|s| s.value.to_lowercase());
        match self.ctx.lookup_table(schema.as_deref(), &table.value.to_lowercase()) {
            Some(ResolvedTable::Partitioned(table)) => Some(table),
            _ => None,
        }
    }

    // ---------------------------------------------------------------------
    // Projection
    // ---------------------------------------------------------------------

    fn rewrite_projection(
        &mut self,
        items: &mut Vec<SelectItem>,
        node: ScopeId,
        mode: &ProjectionMode,
    ) -> Result<(Vec<ProjectedColumn>, bool)> {
        if self.needs_wildcard_expansion(items, node, mode) {
            let expanded = self.expand_wildcards(items, node);
            *items = expanded;
        }

        let mut projection = Vec::with_capacity(items.len());
        let mut opaque = false;
        for (position, item) in items.iter_mut().enumerate() {
            let target = mode.target(position).cloned();
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    let name = ColumnRef::from_expr(expr).map(|r| r.column.clone());
                    let output_name = name
                        .as_ref()
                        .map_or_else(|| expr.to_string(), |n| n.value.clone())
                        .to_lowercase();
                    let value = self.rewrite_projected_expr(expr, node, target.as_ref(), mode)?;
                    projection.push(ProjectedColumn {
                        name: output_name,
                        ciphertext: value.ciphertext,
                        origin: value.origin,
                    });
                    if let (true, Some(alias)) = (value.wrapped, name) {
                        let expr = take_expr(expr);
                        *item = SelectItem::ExprWithAlias { expr, alias };
                    }
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    let value = self.rewrite_projected_expr(expr, node, target.as_ref(), mode)?;
                    projection.push(ProjectedColumn {
                        name: alias.value.to_lowercase(),
                        ciphertext: value.ciphertext,
                        origin: value.origin,
                    });
                }
                SelectItem::Wildcard(_) => match self.wildcard_columns(node, None) {
                    Some(columns) => projection.extend(columns),
                    None => opaque = true,
                },
                SelectItem::QualifiedWildcard(name, _) => {
                    match self.wildcard_columns(node, Some(name)) {
                        Some(columns) => projection.extend(columns),
                        None => opaque = true,
                    }
                }
            }
        }
        Ok((projection, opaque))
    }

    fn rewrite_projected_expr(
        &mut self,
        expr: &mut Expr,
        node: ScopeId,
        target: Option<&ColumnOrigin>,
        mode: &ProjectionMode,
    ) -> Result<ProjectedValue> {
        if let Some(resolved) = self.resolve(expr, node) {
            self.requalify(expr, &resolved);
            let origin = resolved.origin.clone();
            if resolved.encrypted {
                if target.is_some() || mode.passes_ciphertext() {
                    return Ok(ProjectedValue {
                        ciphertext: true,
                        origin,
                        wrapped: false,
                    });
                }
                self.decrypt_in_place(expr, &resolved)?;
                return Ok(ProjectedValue {
                    ciphertext: false,
                    origin,
                    wrapped: true,
                });
            }
            let wrapped = match target {
                Some(target) => {
                    self.encrypt_in_place(expr, target)?;
                    true
                }
                None => false,
            };
            return Ok(ProjectedValue {
                ciphertext: false,
                origin,
                wrapped,
            });
        }

        self.rewrite_expr(expr, node)?;
        if let Some(target) = target {
            self.encrypt_in_place(expr, target)?;
        }
        Ok(ProjectedValue {
            ciphertext: false,
            origin: None,
            wrapped: false,
        })
    }

    fn needs_wildcard_expansion(&self, items: &[SelectItem], node: ScopeId, mode: &ProjectionMode) -> bool {
        let positional = matches!(mode, ProjectionMode::EncryptInto(targets) if targets.iter().any(Option::is_some));
        let scope = self.ctx.tree.scope(node);
        items.iter().any(|item| match item {
            SelectItem::Wildcard(_) => {
                positional || scope.entries().iter().any(|e| self.entry_needs_expansion(e))
            }
            SelectItem::QualifiedWildcard(name, _) => {
                let (schema, table) = split_object_name(name);
                table
                    .and_then(|t| scope.resolve_table(schema.map(|s| s.value.as_str()), &t.value))
                    .is_some_and(|e| positional || self.entry_needs_expansion(e))
            }
            _ => false,
        })
    }

    fn entry_needs_expansion(&self, entry: &ScopeEntry) -> bool {
        match &entry.source {
            ScopeSource::Table(def) => def.has_encrypted_columns(),
            ScopeSource::Partitioned { .. } => true,
            ScopeSource::Derived(node) => self.ctx.tree.projection(*node).iter().any(|p| p.ciphertext),
            ScopeSource::Unknown => false,
        }
    }

    /// Replaces `*` and `q.*` with explicit, qualified column lists. The
    /// link column stays hidden; sources without a known column list keep
    /// `q.*`.
    fn expand_wildcards(&self, items: &[SelectItem], node: ScopeId) -> Vec<SelectItem> {
        let scope = self.ctx.tree.scope(node);
        let mut expanded = Vec::with_capacity(items.len());
        for item in items {
            match item {
                SelectItem::Wildcard(_) => {
                    let columns: Option<Vec<Vec<SelectItem>>> = scope
                        .entries()
                        .iter()
                        .map(|entry| self.entry_select_items(entry))
                        .collect();
                    match columns {
                        Some(columns) => expanded.extend(columns.into_iter().flatten()),
                        None => expanded.push(item.clone()),
                    }
                }
                SelectItem::QualifiedWildcard(name, _) => {
                    let (schema, table) = split_object_name(name);
                    let columns = table
                        .and_then(|t| scope.resolve_table(schema.map(|s| s.value.as_str()), &t.value))
                        .and_then(|entry| self.entry_select_items(entry));
                    match columns {
                        Some(columns) => expanded.extend(columns),
                        None => expanded.push(item.clone()),
                    }
                }
                other => expanded.push(other.clone()),
            }
        }
        expanded
    }

    fn entry_select_items(&self, entry: &ScopeEntry) -> Option<Vec<SelectItem>> {
        let column_item =
            |column: &str| SelectItem::UnnamedExpr(qualified(&entry.qualifier, Ident::new(column)));
        match &entry.source {
            ScopeSource::Table(def) => {
                Some(def.visible_columns().map(|c| column_item(&c.column_name)).collect())
            }
            ScopeSource::Partitioned { table, .. } => {
                Some(table.columns().map(|(_, c)| column_item(&c.column_name)).collect())
            }
            _ if entry.qualifier.is_empty() => None,
            ScopeSource::Derived(node) if !self.ctx.tree.node(*node).opaque => Some(
                self.ctx
                    .tree
                    .projection(*node)
                    .iter()
                    .map(|p| column_item(&p.name))
                    .collect(),
            ),
            ScopeSource::Derived(_) | ScopeSource::Unknown => {
                Some(vec![qualified_wildcard(&entry.qualifier)])
            }
        }
    }

    /// Output columns of an unexpanded wildcard, or `None` when they cannot
    /// be enumerated.
    fn wildcard_columns(&self, node: ScopeId, qualifier: Option<&ObjectName>) -> Option<Vec<ProjectedColumn>> {
        let scope = self.ctx.tree.scope(node);
        let entries: Vec<&ScopeEntry> = match qualifier {
            None => scope.entries().iter().collect(),
            Some(name) => {
                let (schema, table) = split_object_name(name);
                vec![scope.resolve_table(schema.map(|s| s.value.as_str()), &table?.value)?]
            }
        };
        let mut columns = Vec::new();
        for entry in entries {
            match &entry.source {
                ScopeSource::Table(def) => {
                    columns.extend(def.visible_columns().map(|c| ProjectedColumn::plain(&*c.column_name)))
                }
                ScopeSource::Partitioned { table, .. } => {
                    columns.extend(table.columns().map(|(_, c)| ProjectedColumn::plain(&*c.column_name)))
                }
                ScopeSource::Derived(id) if !self.ctx.tree.node(*id).opaque => {
                    columns.extend(self.ctx.tree.projection(*id).iter().cloned())
                }
                _ => return None,
            }
        }
        Some(columns)
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    /// Resolves a bare or qualified column reference.
    pub(crate) fn resolve(&self, expr: &Expr, node: ScopeId) -> Option<ResolvedColumn> {
        let column = ColumnRef::from_expr(expr)?;
        self.ctx
            .tree
            .resolve_column(node, column.qualifier(), &column.column.value)
    }

    /// Points an extension column at its join alias.
    pub(crate) fn requalify(&self, expr: &mut Expr, resolved: &ResolvedColumn) {
        let Some(alias) = &resolved.extension_alias else {
            return;
        };
        let column = ColumnRef::from_expr(expr).map(|r| r.column.clone());
        if let Some(column) = column {
            *expr = compound(vec![alias.clone(), column]);
        }
    }

    pub(crate) fn decrypt_in_place(&self, expr: &mut Expr, resolved: &ResolvedColumn) -> Result<()> {
        let origin = cipher_origin(resolved);
        let inner = take_expr(expr);
        *expr = self
            .ctx
            .decrypt_call(inner, origin.table.as_str(), &origin.column)?;
        Ok(())
    }

    pub(crate) fn encrypt_in_place(&self, expr: &mut Expr, target: &ColumnOrigin) -> Result<()> {
        let inner = take_expr(expr);
        *expr = self
            .ctx
            .encrypt_call(inner, target.table.as_str(), &target.column)?;
        Ok(())
    }

    /// Rewrites an expression whose value is consumed as plaintext.
    pub(crate) fn rewrite_expr(&mut self, expr: &mut Expr, node: ScopeId) -> Result<()> {
        match expr {
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => self.rewrite_column_read(expr, node),
            Expr::BinaryOp { left, op, right } => {
                if matches!(
                    op,
                    BinaryOperator::Eq | BinaryOperator::NotEq | BinaryOperator::Spaceship
                ) {
                    self.rewrite_comparison(left, right, node)
                } else {
                    self.rewrite_expr(left, node)?;
                    self.rewrite_expr(right, node)
                }
            }
            Expr::Nested(inner) | Expr::UnaryOp { expr: inner, .. } => self.rewrite_expr(inner, node),
            Expr::InList { expr: target, list, .. } => {
                let cipher = self.rewrite_operand(target, node)?;
                for item in list {
                    self.rewrite_expr(item, node)?;
                    if let Some(origin) = &cipher {
                        self.encrypt_in_place(item, origin)?;
                    }
                }
                Ok(())
            }
            Expr::InSubquery {
                expr: target,
                subquery,
                ..
            } => {
                self.rewrite_expr(target, node)?;
                self.rewrite_query(subquery, &ProjectionMode::Decrypt, Some(node))?;
                Ok(())
            }
            Expr::Subquery(subquery) | Expr::Exists { subquery, .. } => {
                self.rewrite_query(subquery, &ProjectionMode::Decrypt, Some(node))?;
                Ok(())
            }
            _ => self.rewrite_nested(expr, node),
        }
    }

    fn rewrite_column_read(&mut self, expr: &mut Expr, node: ScopeId) -> Result<()> {
        if let Some(resolved) = self.resolve(expr, node) {
            self.requalify(expr, &resolved);
            if resolved.encrypted {
                self.decrypt_in_place(expr, &resolved)?;
            }
        }
        Ok(())
    }

    /// Rewrites an operand that may be compared as ciphertext. Returns the
    /// encrypted column it refers to, left undecrypted.
    pub(crate) fn rewrite_operand(&mut self, expr: &mut Expr, node: ScopeId) -> Result<Option<ColumnOrigin>> {
        if let Some(resolved) = self.resolve(expr, node) {
            self.requalify(expr, &resolved);
            return Ok(resolved.encrypted.then(|| cipher_origin(&resolved)));
        }
        self.rewrite_expr(expr, node)?;
        Ok(None)
    }

    /// `enc = value` compares ciphertext: the plaintext side is encrypted.
    fn rewrite_comparison(&mut self, left: &mut Expr, right: &mut Expr, node: ScopeId) -> Result<()> {
        let left_cipher = self.rewrite_operand(left, node)?;
        let right_cipher = self.rewrite_operand(right, node)?;
        match (left_cipher, right_cipher) {
            (Some(origin), None) => self.encrypt_in_place(right, &origin),
            (None, Some(origin)) => self.encrypt_in_place(left, &origin),
            _ => Ok(()),
        }
    }

    /// A value stored into a column: encrypted targets get `ENCRYPT(value)`
    /// unless the value already is ciphertext of an encrypted column.
    pub(crate) fn rewrite_written_value(
        &mut self,
        value: &mut Expr,
        node: ScopeId,
        target: Option<&ColumnOrigin>,
    ) -> Result<()> {
        let Some(target) = target else {
            return self.rewrite_expr(value, node);
        };
        if is_default_keyword(value) {
            return Ok(());
        }
        if self.rewrite_operand(value, node)?.is_none() {
            self.encrypt_in_place(value, target)?;
        }
        Ok(())
    }

    /// Generic walk for expression shapes without a dedicated rule: every
    /// column reference is a read, every subquery is correlated to `node`.
    fn rewrite_nested(&mut self, expr: &mut Expr, node: ScopeId) -> Result<()> {
        let mut visitor = NestedExprRewriter {
            rewriter: self,
            node,
            depth: 0,
        };
        match expr.visit(&mut visitor) {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(err) => Err(err),
        }
    }
}

struct NestedExprRewriter<'r, 'c, 'a> {
    rewriter: &'r mut QueryRewriter<'c, 'a>,
    node: ScopeId,
    /// Nesting depth of queries; only depth 0 belongs to `node`
    depth: usize,
}

impl VisitorMut for NestedExprRewriter<'_, '_, '_> {
    type Break = RewriteError;

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<Self::Break> {
        if self.depth == 0 {
            if let Err(err) = self
                .rewriter
                .rewrite_query(query, &ProjectionMode::Decrypt, Some(self.node))
            {
                return ControlFlow::Break(err);
            }
        }
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &mut Query) -> ControlFlow<Self::Break> {
        self.depth -= 1;
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        if self.depth == 0 && matches!(expr, Expr::Identifier(_) | Expr::CompoundIdentifier(_)) {
            if let Err(err) = self.rewriter.rewrite_column_read(expr, self.node) {
                return ControlFlow::Break(err);
            }
        }
        ControlFlow::Continue(())
    }
}

fn unknown_entry(alias: Option<&Ident>) -> ScopeEntry {
    ScopeEntry {
        schema: None,
        name: None,
        alias: alias.map(|a| a.value.to_lowercase()),
        qualifier: alias.cloned().into_iter().collect(),
        source: ScopeSource::Unknown,
    }
}

fn placeholder_factor() -> TableFactor {
    table_factor(ObjectName(vec![]), None)
}

/// Physical column behind an encrypted reference, for key errors.
fn cipher_origin(resolved: &ResolvedColumn) -> ColumnOrigin {
    resolved.origin.clone().unwrap_or_else(|| ColumnOrigin {
        table: TableName::new(""),
        column: resolved.column.clone(),
        encrypted: true,
    })
}
