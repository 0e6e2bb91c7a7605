//! Statement model handed to the rewrite engine.

use std::fmt;

use sqlparser::ast::{
    display_comma_separated, AlterTableOperation, Assignment, CreateTable, Delete, Expr,
    HiveSetLocation, Ident, Insert, ObjectName, OrderByExpr, Query, SelectItem, SqliteOnConflict,
    Statement, TableWithJoins,
};

use super::attributes::StatementAttributes;
use super::utils::parse_single_statement;
use crate::error::Result;

/// Parsed SQL statement with its original text and leading attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// Original SQL text (for logging)
    pub sql_text: String,
    pub kind: SqlStatementKind,
    pub attributes: StatementAttributes,
}

/// Closed set of statement shapes the engine distinguishes.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlStatementKind {
    Select(Box<Query>),
    Insert(Insert),
    Update(UpdateStatement),
    Delete(Delete),
    CreateTable(CreateTable),
    AlterTable(AlterTableStatement),
    /// Anything else; never rewritten
    Other(Box<Statement>),
}

/// MySQL UPDATE, including the single-table `ORDER BY` / `LIMIT` tail.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: TableWithJoins,
    pub assignments: Vec<Assignment>,
    pub from: Option<TableWithJoins>,
    pub selection: Option<Expr>,
    pub returning: Option<Vec<SelectItem>>,
    pub or: Option<SqliteOnConflict>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<Expr>,
}

impl UpdateStatement {
    /// Multi-table form: a join in the target list or an extra FROM.
    pub fn is_multi_table(&self) -> bool {
        !self.table.joins.is_empty() || self.from.is_some()
    }
}

/// ALTER TABLE, lifted out of the `Statement` variant so it can be edited.
#[derive(Debug, Clone, PartialEq)]
pub struct AlterTableStatement {
    pub name: ObjectName,
    pub if_exists: bool,
    pub only: bool,
    pub operations: Vec<AlterTableOperation>,
    pub location: Option<HiveSetLocation>,
    pub on_cluster: Option<Ident>,
}

impl SqlStatement {
    /// Parse one statement and its leading attributes.
    pub fn parse(sql: &str) -> Result<Self> {
        let parsed = parse_single_statement(sql)?;
        let kind = match parsed.statement {
            Statement::Query(query) => SqlStatementKind::Select(query),
            Statement::Insert(insert) => SqlStatementKind::Insert(insert),
            Statement::Update {
                table,
                assignments,
                from,
                selection,
                returning,
                or,
            } => SqlStatementKind::Update(UpdateStatement {
                table,
                assignments,
                from,
                selection,
                returning,
                or,
                order_by: parsed.update_order_by,
                limit: parsed.update_limit,
            }),
            Statement::Delete(delete) => SqlStatementKind::Delete(delete),
            Statement::CreateTable(create) => SqlStatementKind::CreateTable(create),
            Statement::AlterTable {
                name,
                if_exists,
                only,
                operations,
                location,
                on_cluster,
            } => SqlStatementKind::AlterTable(AlterTableStatement {
                name,
                if_exists,
                only,
                operations,
                location,
                on_cluster,
            }),
            other => SqlStatementKind::Other(Box::new(other)),
        };

        Ok(Self {
            sql_text: sql.to_string(),
            kind,
            attributes: StatementAttributes::parse(sql),
        })
    }

    /// Short label used in log lines and spans.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            SqlStatementKind::Select(_) => "SELECT",
            SqlStatementKind::Insert(insert) if insert.replace_into => "REPLACE",
            SqlStatementKind::Insert(_) => "INSERT",
            SqlStatementKind::Update(_) => "UPDATE",
            SqlStatementKind::Delete(_) => "DELETE",
            SqlStatementKind::CreateTable(_) => "CREATE TABLE",
            SqlStatementKind::AlterTable(_) => "ALTER TABLE",
            SqlStatementKind::Other(_) => "OTHER",
        }
    }
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for SqlStatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlStatementKind::Select(query) => write!(f, "{}", query),
            SqlStatementKind::Insert(insert) => write!(f, "{}", insert),
            SqlStatementKind::Update(update) => write!(f, "{}", update),
            SqlStatementKind::Delete(delete) => write!(f, "{}", delete),
            SqlStatementKind::CreateTable(create) => write!(f, "{}", create),
            SqlStatementKind::AlterTable(alter) => write!(f, "{}", alter),
            SqlStatementKind::Other(statement) => write!(f, "{}", statement),
        }
    }
}

impl fmt::Display for UpdateStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UPDATE ")?;
        if let Some(or) = &self.or {
            write!(f, "{} ", or)?;
        }
        write!(f, "{}", self.table)?;
        if !self.assignments.is_empty() {
            write!(f, " SET {}", display_comma_separated(&self.assignments))?;
        }
        if let Some(from) = &self.from {
            write!(f, " FROM {}", from)?;
        }
        if let Some(selection) = &self.selection {
            write!(f, " WHERE {}", selection)?;
        }
        if let Some(returning) = &self.returning {
            write!(f, " RETURNING {}", display_comma_separated(returning))?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", display_comma_separated(&self.order_by))?;
        }
        if let Some(limit) = &self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        Ok(())
    }
}

impl fmt::Display for AlterTableStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ALTER TABLE ")?;
        if self.if_exists {
            write!(f, "IF EXISTS ")?;
        }
        if self.only {
            write!(f, "ONLY ")?;
        }
        write!(f, "{} ", self.name)?;
        if let Some(cluster) = &self.on_cluster {
            write!(f, "ON CLUSTER {} ", cluster)?;
        }
        write!(f, "{}", display_comma_separated(&self.operations))?;
        if let Some(location) = &self.location {
            write!(f, " {}", location)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_statements() {
        let cases = [
            ("SELECT * FROM t1", "SELECT"),
            ("INSERT INTO t1 (a) VALUES (1)", "INSERT"),
            ("REPLACE INTO t1 (a) VALUES (1)", "REPLACE"),
            ("UPDATE t1 SET a = 1", "UPDATE"),
            ("DELETE FROM t1", "DELETE"),
            ("CREATE TABLE t1 (a INT)", "CREATE TABLE"),
            ("ALTER TABLE t1 ADD COLUMN b INT", "ALTER TABLE"),
            ("SHOW TABLES", "OTHER"),
        ];
        for (sql, expected) in cases {
            let statement = SqlStatement::parse(sql).unwrap();
            assert_eq!(statement.kind_name(), expected, "{sql}");
        }
    }

    #[test]
    fn test_update_display_round_trips_tail() {
        let sql = "UPDATE t1 SET a = 1 WHERE b = 2 ORDER BY id DESC LIMIT 10";
        let statement = SqlStatement::parse(sql).unwrap();
        assert_eq!(statement.to_string(), sql);
    }

    #[test]
    fn test_alter_display() {
        let sql = "ALTER TABLE t1 ADD COLUMN b INT, DROP COLUMN c";
        let statement = SqlStatement::parse(sql).unwrap();
        assert_eq!(statement.to_string(), sql);
    }

    #[test]
    fn test_attributes_are_attached() {
        let statement = SqlStatement::parse("/*+ PARTITION(*) */ CREATE TABLE t1 (a INT)").unwrap();
        assert!(statement.attributes.is_partitioned());
    }
}
