//! Name resolution for one statement's table-source tree.

use std::sync::Arc;

use sqlparser::ast::Ident;
use tessera_commons::models::{ColumnLocation, PartitionTable, TableDefinition, TableName};

use super::subquery_tree::ScopeId;

/// What a name in a FROM clause resolves to.
#[derive(Debug, Clone)]
pub enum ScopeSource {
    /// Plain physical table known to the metadata model
    Table(Arc<TableDefinition>),
    /// Partitioned table with the extension aliases allocated for this occurrence
    Partitioned {
        table: PartitionTable,
        ext_aliases: Vec<Ident>,
    },
    /// Derived table or CTE; its columns are the projection of that node
    Derived(ScopeId),
    /// Table not described by metadata
    Unknown,
}

/// One entry of a scope: a table, alias or derived table in FROM.
#[derive(Debug, Clone)]
pub struct ScopeEntry {
    /// Explicit schema, lower-cased
    pub schema: Option<String>,
    /// Physical or CTE name, lower-cased
    pub name: Option<String>,
    /// Declared alias, lower-cased
    pub alias: Option<String>,
    /// Qualifier to use for this entry's columns in generated SQL
    pub qualifier: Vec<Ident>,
    pub source: ScopeSource,
}

impl ScopeEntry {
    /// Whether `schema.name` refers to this entry.
    ///
    /// An alias shadows the table name. A schema qualifier only matches a
    /// physical name, compared against the explicit or default database.
    pub fn matches(&self, schema: Option<&str>, name: &str, default_database: Option<&str>) -> bool {
        if let Some(alias) = &self.alias {
            return schema.is_none() && alias.eq_ignore_ascii_case(name);
        }
        let Some(own_name) = &self.name else {
            return false;
        };
        if !own_name.eq_ignore_ascii_case(name) {
            return false;
        }
        match schema {
            None => true,
            Some(schema) => {
                let own_schema = self.schema.as_deref().or(default_database);
                own_schema.is_some_and(|s| s.eq_ignore_ascii_case(schema))
            }
        }
    }

    pub fn is_partitioned(&self) -> bool {
        matches!(self.source, ScopeSource::Partitioned { .. })
    }

    pub fn partition(&self) -> Option<(&PartitionTable, &[Ident])> {
        match &self.source {
            ScopeSource::Partitioned { table, ext_aliases } => Some((table, ext_aliases.as_slice())),
            _ => None,
        }
    }

    /// Extension join alias owning `column`, if the column lives in an extension table.
    pub fn extension_alias_for_column(&self, column: &str) -> Option<&Ident> {
        let (table, aliases) = self.partition()?;
        match table.column_location(column)? {
            ColumnLocation::Primary => None,
            ColumnLocation::Extension(idx) => aliases.get(idx),
        }
    }

    /// Physical table name when the entry is a metadata-backed table.
    pub fn table_name(&self) -> Option<&TableName> {
        match &self.source {
            ScopeSource::Table(def) => Some(def.table_name()),
            ScopeSource::Partitioned { table, .. } => Some(table.name()),
            _ => None,
        }
    }

    /// Display name for error messages.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.alias.clone())
            .unwrap_or_else(|| "<derived>".to_string())
    }
}

/// Aliases and names resolvable in one SELECT block or DML statement.
#[derive(Debug, Clone, Default)]
pub struct TableScope {
    entries: Vec<ScopeEntry>,
    default_database: Option<String>,
}

impl TableScope {
    pub fn new(default_database: Option<String>) -> Self {
        Self {
            entries: Vec::new(),
            default_database,
        }
    }

    pub fn push(&mut self, entry: ScopeEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn entries(&self) -> &[ScopeEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&ScopeEntry> {
        self.entries.get(index)
    }

    pub fn default_database(&self) -> Option<&str> {
        self.default_database.as_deref()
    }

    /// Index of the entry `schema.name_or_alias` refers to. Returns `None`
    /// for names not declared in this scope.
    pub fn position(&self, schema: Option<&str>, name_or_alias: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.matches(schema, name_or_alias, self.default_database()))
    }

    pub fn resolve_table(&self, schema: Option<&str>, name_or_alias: &str) -> Option<&ScopeEntry> {
        self.position(schema, name_or_alias).map(|idx| &self.entries[idx])
    }

    pub fn is_partitioned(&self, schema: Option<&str>, name_or_alias: &str) -> bool {
        self.resolve_table(schema, name_or_alias)
            .is_some_and(ScopeEntry::is_partitioned)
    }

    pub fn extension_aliases_for(&self, schema: Option<&str>, name_or_alias: &str) -> Option<&[Ident]> {
        self.resolve_table(schema, name_or_alias)
            .and_then(|e| e.partition())
            .map(|(_, aliases)| aliases)
    }
}
