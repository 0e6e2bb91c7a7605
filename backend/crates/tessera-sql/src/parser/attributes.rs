//! Declarative statement attributes carried in leading hint comments.
//!
//! ```sql
//! /*+ PARTITION(notes, extra_1, extra_2) */ CREATE TABLE wide (...)
//! /*+ PARTITION(*) */ CREATE TABLE wide (...)
//! /*+ KEY='s3cr3t' */ SELECT ssn FROM people
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_HINT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^\s*/\*\+(.*?)\*/").unwrap());
static LEADING_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*(?:/\*.*?\*/|--[^\n]*(?:\n|$)|#[^\n]*(?:\n|$))").unwrap());
static PARTITION_HINT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bPARTITION\s*\(([^)]*)\)").unwrap());
static KEY_HINT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bKEY\s*=\s*'((?:[^'\\]|\\.|'')*)'").unwrap());

/// Which columns of a partitioned CREATE TABLE may be moved to extension tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionColumns {
    /// Every non-key column
    All,
    /// Named columns, lower-cased
    Named(Vec<String>),
}

impl ExtensionColumns {
    pub fn is_eligible(&self, column: &str) -> bool {
        match self {
            ExtensionColumns::All => true,
            ExtensionColumns::Named(names) => names.iter().any(|n| n.eq_ignore_ascii_case(column)),
        }
    }
}

/// Attributes parsed from `/*+ ... */` comments preceding a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementAttributes {
    /// Set when the statement is marked partitioned
    pub partition: Option<ExtensionColumns>,
    /// Per-statement encryption key, overriding the session key
    pub encryption_key: Option<String>,
}

impl StatementAttributes {
    /// Collects hints from every comment that precedes the statement text.
    /// Unknown hints are ignored.
    pub fn parse(sql: &str) -> Self {
        let mut attributes = StatementAttributes::default();
        let mut rest = sql;
        loop {
            if let Some(hint) = LEADING_HINT_RE.captures(rest) {
                if let Some(body) = hint.get(1) {
                    attributes.apply_hint(body.as_str());
                }
            }
            match LEADING_COMMENT_RE.find(rest) {
                Some(comment) => rest = &rest[comment.end()..],
                None => break,
            }
        }
        attributes
    }

    fn apply_hint(&mut self, body: &str) {
        if let Some(caps) = PARTITION_HINT_RE.captures(body) {
            let list = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let names: Vec<String> = list
                .split(',')
                .map(|n| n.trim().trim_matches('`').to_lowercase())
                .filter(|n| !n.is_empty())
                .collect();
            self.partition = Some(if names.iter().any(|n| n == "*") {
                ExtensionColumns::All
            } else {
                ExtensionColumns::Named(names)
            });
        }
        if let Some(caps) = KEY_HINT_RE.captures(body) {
            if let Some(key) = caps.get(1) {
                self.encryption_key = Some(key.as_str().replace("''", "'"));
            }
        }
    }

    pub fn is_partitioned(&self) -> bool {
        self.partition.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_named_columns() {
        let attrs = StatementAttributes::parse("/*+ PARTITION(Notes, `extra_1`) */ CREATE TABLE t (id INT)");
        assert_eq!(
            attrs.partition,
            Some(ExtensionColumns::Named(vec!["notes".to_string(), "extra_1".to_string()]))
        );
        assert!(attrs.partition.unwrap().is_eligible("NOTES"));
    }

    #[test]
    fn test_partition_all_columns() {
        let attrs = StatementAttributes::parse("  /*+ partition(*) */\nCREATE TABLE t (id INT)");
        assert_eq!(attrs.partition, Some(ExtensionColumns::All));
    }

    #[test]
    fn test_multiple_comments_and_unknown_hints() {
        let sql = "/* plain comment */ /*+ NO_CACHE */ -- note\n/*+ KEY='it''s' */ SELECT 1";
        let attrs = StatementAttributes::parse(sql);
        assert!(!attrs.is_partitioned());
        assert_eq!(attrs.encryption_key.as_deref(), Some("it's"));
    }

    #[test]
    fn test_hints_after_statement_start_are_ignored() {
        let attrs = StatementAttributes::parse("CREATE TABLE t (id INT) /*+ PARTITION(*) */");
        assert_eq!(attrs, StatementAttributes::default());
    }
}
