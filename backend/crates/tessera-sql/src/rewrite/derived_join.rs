//! `ORDER BY` / `LIMIT` on a single-table UPDATE or DELETE of a partitioned
//! table.
//!
//! MySQL forbids both clauses in the multi-table form the extension joins
//! require. The rows are selected in a derived table instead:
//!
//! ```sql
//! DELETE FROM t1 WHERE a = 1 ORDER BY id DESC LIMIT 10
//! -- becomes
//! DELETE ... FROM t1 ... JOIN (SELECT t1.$_ext_id FROM t1 WHERE a = 1 ORDER BY id DESC LIMIT 10) AS $sub_0
//!   ON t1.$_ext_id = $sub_0.$_ext_id
//! ```

use sqlparser::ast::{
    helpers::attached_token::AttachedToken, Expr, GroupByExpr, Ident, OrderBy, OrderByExpr, Query,
    Select, SelectItem, SetExpr, TableFactor, TableWithJoins,
};

use super::exprs::{alias, eq, factor_qualifier, join_on, qualified};
use super::query::QueryRewriter;
use crate::error::{RewriteError, Result};

impl QueryRewriter<'_, '_> {
    /// Moves `selection`, `order_by` and `limit` into a derived table joined
    /// to `target` on `link`, the group's link column. Runs before scope building so the
    /// derived table is rewritten like any other.
    pub(crate) fn join_limited_rows(
        &mut self,
        target: &mut TableWithJoins,
        link: Ident,
        selection: &mut Option<Expr>,
        order_by: Vec<OrderByExpr>,
        limit: Option<Expr>,
    ) -> Result<()> {
        let qualifier = factor_qualifier(&target.relation)
            .ok_or_else(|| RewriteError::Internal("limited DML target is not a table".to_string()))?;
        let derived_alias = self.ctx.allocate_derived_alias();

        let select = Select {
            select_token: AttachedToken::empty(),
            distinct: None,
            top: None,
            top_before_distinct: false,
            projection: vec![SelectItem::UnnamedExpr(qualified(&qualifier, link.clone()))],
            into: None,
            from: vec![TableWithJoins {
                relation: target.relation.clone(),
                joins: vec![],
            }],
            lateral_views: vec![],
            prewhere: None,
            selection: selection.take(),
            group_by: GroupByExpr::Expressions(vec![], vec![]),
            cluster_by: vec![],
            distribute_by: vec![],
            sort_by: vec![],
            having: None,
            named_window: vec![],
            qualify: None,
            window_before_qualify: false,
            value_table_mode: None,
            connect_by: None,
        };
        let subquery = Query {
            with: None,
            body: Box::new(SetExpr::Select(Box::new(select))),
            order_by: (!order_by.is_empty()).then_some(OrderBy {
                exprs: order_by,
                interpolate: None,
            }),
            limit,
            limit_by: vec![],
            offset: None,
            fetch: None,
            locks: vec![],
            for_clause: None,
            settings: None,
            format_clause: None,
        };

        let on = eq(
            qualified(&qualifier, link.clone()),
            qualified(std::slice::from_ref(&derived_alias), link),
        );
        target.joins.push(join_on(
            TableFactor::Derived {
                lateral: false,
                subquery: Box::new(subquery),
                alias: Some(alias(derived_alias)),
            },
            false,
            on,
        ));
        Ok(())
    }
}
