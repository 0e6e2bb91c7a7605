//! Small AST builders and inspectors shared by the rewriters.

use sqlparser::ast::{
    BinaryOperator, Expr, Ident, Join, JoinConstraint, JoinOperator, ObjectName, SelectItem,
    TableAlias, TableFactor, Value, WildcardAdditionalOptions,
};

/// A column reference split into its parts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ColumnRef<'e> {
    pub schema: Option<&'e Ident>,
    pub table: Option<&'e Ident>,
    pub column: &'e Ident,
}

impl<'e> ColumnRef<'e> {
    pub fn from_parts(parts: &'e [Ident]) -> Option<Self> {
        match parts {
            [column] => Some(Self {
                schema: None,
                table: None,
                column,
            }),
            [table, column] => Some(Self {
                schema: None,
                table: Some(table),
                column,
            }),
            [schema, table, column] => Some(Self {
                schema: Some(schema),
                table: Some(table),
                column,
            }),
            _ => None,
        }
    }

    pub fn from_expr(expr: &'e Expr) -> Option<Self> {
        match expr {
            Expr::Identifier(ident) => Self::from_parts(std::slice::from_ref(ident)),
            Expr::CompoundIdentifier(parts) => Self::from_parts(parts),
            _ => None,
        }
    }

    /// `(schema, table)` in the shape `SubQueryTree::resolve_column` expects.
    pub fn qualifier(&self) -> Option<(Option<&'e str>, &'e str)> {
        self.table
            .map(|table| (self.schema.map(|s| s.value.as_str()), table.value.as_str()))
    }
}

/// `a.b.c` as an expression; a single part stays a plain identifier.
pub(crate) fn compound(mut parts: Vec<Ident>) -> Expr {
    if parts.len() == 1 {
        Expr::Identifier(parts.remove(0))
    } else {
        Expr::CompoundIdentifier(parts)
    }
}

/// `qualifier.column`
pub(crate) fn qualified(qualifier: &[Ident], column: Ident) -> Expr {
    let mut parts = qualifier.to_vec();
    parts.push(column);
    compound(parts)
}

pub(crate) fn eq(left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op: BinaryOperator::Eq,
        right: Box::new(right),
    }
}

pub(crate) fn alias(name: Ident) -> TableAlias {
    TableAlias {
        name,
        columns: vec![],
    }
}

pub(crate) fn table_factor(name: ObjectName, alias_name: Option<Ident>) -> TableFactor {
    TableFactor::Table {
        name,
        alias: alias_name.map(alias),
        args: None,
        with_hints: vec![],
        version: None,
        with_ordinality: false,
        partitions: vec![],
        json_path: None,
    }
}

/// `<operator> JOIN relation ON constraint`
pub(crate) fn join_on(relation: TableFactor, left_outer: bool, constraint: Expr) -> Join {
    let constraint = JoinConstraint::On(constraint);
    Join {
        relation,
        global: false,
        join_operator: if left_outer {
            JoinOperator::LeftOuter(constraint)
        } else {
            JoinOperator::Inner(constraint)
        },
    }
}

/// Qualifier columns of a FROM table are written with: its alias, or its name.
pub(crate) fn factor_qualifier(factor: &TableFactor) -> Option<Vec<Ident>> {
    match factor {
        TableFactor::Table { alias: Some(a), .. }
        | TableFactor::Derived { alias: Some(a), .. } => Some(vec![a.name.clone()]),
        TableFactor::Table { name, .. } => Some(name.0.clone()),
        _ => None,
    }
}

pub(crate) fn qualified_wildcard(qualifier: &[Ident]) -> SelectItem {
    SelectItem::QualifiedWildcard(
        ObjectName(qualifier.to_vec()),
        WildcardAdditionalOptions::default(),
    )
}

/// Moves the expression out, leaving `NULL` behind.
pub(crate) fn take_expr(expr: &mut Expr) -> Expr {
    std::mem::replace(expr, Expr::Value(Value::Null))
}

/// `DEFAULT` inside a VALUES row.
pub(crate) fn is_default_keyword(expr: &Expr) -> bool {
    matches!(expr, Expr::Identifier(ident) if ident.quote_style.is_none() && ident.value.eq_ignore_ascii_case("default"))
}

pub(crate) fn constraint_expr_mut(operator: &mut JoinOperator) -> Option<&mut Expr> {
    let constraint = match operator {
        JoinOperator::Inner(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::FullOuter(c)
        | JoinOperator::Semi(c)
        | JoinOperator::LeftSemi(c)
        | JoinOperator::RightSemi(c)
        | JoinOperator::Anti(c)
        | JoinOperator::LeftAnti(c)
        | JoinOperator::RightAnti(c)
        | JoinOperator::AsOf { constraint: c, .. } => c,
        JoinOperator::CrossJoin | JoinOperator::CrossApply | JoinOperator::OuterApply => return None,
    };
    match constraint {
        JoinConstraint::On(expr) => Some(expr),
        _ => None,
    }
}
