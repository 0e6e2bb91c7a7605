//! Common parsing utilities

use sqlparser::ast::{Expr, Ident, ObjectName, OrderByExpr, Statement};
use sqlparser::dialect::MySqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::{Parser, ParserError, ParserOptions};
use sqlparser::tokenizer::Token;

const DEFAULT_SQL_RECURSION_LIMIT: usize = 512;

/// Default sqlparser options for client SQL
pub fn parser_options() -> ParserOptions {
    ParserOptions::new().with_trailing_commas(false)
}

/// One parsed statement plus the MySQL-only tail the AST does not model.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub statement: Statement,
    /// `ORDER BY` of a single-table UPDATE
    pub update_order_by: Vec<OrderByExpr>,
    /// `LIMIT` of a single-table UPDATE
    pub update_limit: Option<Expr>,
}

/// Parse exactly one MySQL statement.
///
/// `UPDATE ... ORDER BY ... LIMIT n` is accepted: sqlparser stops before the
/// tail, which is read here with the same parser.
pub fn parse_single_statement(sql: &str) -> Result<ParsedStatement, ParserError> {
    let dialect = MySqlDialect {};
    let mut parser = Parser::new(&dialect)
        .with_options(parser_options())
        .with_recursion_limit(DEFAULT_SQL_RECURSION_LIMIT)
        .try_with_sql(sql)?;

    let statement = parser.parse_statement()?;

    let mut update_order_by = Vec::new();
    let mut update_limit = None;
    if matches!(statement, Statement::Update { .. }) {
        if parser.parse_keywords(&[Keyword::ORDER, Keyword::BY]) {
            update_order_by = parser.parse_comma_separated(Parser::parse_order_by_expr)?;
        }
        if parser.parse_keyword(Keyword::LIMIT) {
            update_limit = parser.parse_limit()?;
        }
    }

    while parser.consume_token(&Token::SemiColon) {}
    let next = parser.peek_token();
    if next.token != Token::EOF {
        return parser.expected("end of statement", next);
    }

    Ok(ParsedStatement {
        statement,
        update_order_by,
        update_limit,
    })
}

/// Splits a table name into `(schema, table)`.
pub fn split_object_name(name: &ObjectName) -> (Option<&Ident>, Option<&Ident>) {
    match name.0.as_slice() {
        [table] => (None, Some(table)),
        [.., schema, table] => (Some(schema), Some(table)),
        [] => (None, None),
    }
}

/// Builds a single-part object name.
pub fn object_name(name: impl Into<String>) -> ObjectName {
    ObjectName(vec![Ident::new(name)])
}

/// Builds `schema.name` when a schema is given.
pub fn qualified_object_name(schema: Option<&Ident>, name: impl Into<String>) -> ObjectName {
    match schema {
        Some(schema) => ObjectName(vec![schema.clone(), Ident::new(name)]),
        None => object_name(name),
    }
}
