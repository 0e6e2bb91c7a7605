//! Per-statement rewrite state: pinned metadata snapshots, alias counters
//! and the subquery tree.

use std::collections::HashMap;
use std::sync::Arc;

use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArgumentList, FunctionArguments, Ident,
    ObjectName, Value,
};
use tessera_commons::models::{Database, PartitionTable, TableDefinition};
use tessera_configs::RewriteConfig;

use super::subquery_tree::SubQueryTree;
use crate::error::{RewriteError, Result};
use crate::session::SessionContext;

/// A FROM-clause table resolved against metadata.
#[derive(Debug, Clone)]
pub enum ResolvedTable {
    Standard(Arc<TableDefinition>),
    Partitioned(PartitionTable),
}

impl ResolvedTable {
    pub fn needs_rewrite(&self) -> bool {
        match self {
            ResolvedTable::Standard(def) => def.has_encrypted_columns(),
            ResolvedTable::Partitioned(_) => true,
        }
    }
}

/// State owned by one rewrite call. Never shared across statements.
pub struct RewriteContext<'a> {
    session: &'a SessionContext,
    config: &'a RewriteConfig,
    encryption_key: Option<&'a str>,
    /// One snapshot per database for the whole statement
    databases: HashMap<Option<String>, Option<Arc<Database>>>,
    next_extension_alias: usize,
    next_derived_alias: usize,
    pub tree: SubQueryTree,
}

impl<'a> RewriteContext<'a> {
    pub fn new(session: &'a SessionContext, config: &'a RewriteConfig, statement_key: Option<&'a str>) -> Self {
        Self {
            session,
            config,
            encryption_key: statement_key.or(session.encryption_key()),
            databases: HashMap::new(),
            next_extension_alias: 0,
            next_derived_alias: 0,
            tree: SubQueryTree::new(),
        }
    }

    pub fn config(&self) -> &'a RewriteConfig {
        self.config
    }

    pub fn session(&self) -> &'a SessionContext {
        self.session
    }

    pub fn default_database(&self) -> Option<String> {
        self.session.default_database().map(|d| d.as_str().to_string())
    }

    fn database(&mut self, schema: Option<&str>) -> Option<Arc<Database>> {
        let key = schema.map(str::to_lowercase).or_else(|| self.default_database());
        let session = self.session;
        self.databases
            .entry(key)
            .or_insert_with(|| session.database(schema))
            .clone()
    }

    /// Looks up `schema.table` in the pinned snapshot.
    pub fn lookup_table(&mut self, schema: Option<&str>, table: &str) -> Option<ResolvedTable> {
        let database = self.database(schema)?;
        let def = database.get_table(table)?;
        if def.is_partitioned() {
            database.partition_table(table).map(ResolvedTable::Partitioned)
        } else {
            Some(ResolvedTable::Standard(Arc::clone(def)))
        }
    }

    /// Next `$ext_<n>` alias.
    pub fn allocate_extension_alias(&mut self) -> Ident {
        let alias = format!(
            "{}{}",
            self.config.partitioning.extension_alias_prefix, self.next_extension_alias
        );
        self.next_extension_alias += 1;
        Ident::new(alias)
    }

    /// Next `$sub_<n>` alias.
    pub fn allocate_derived_alias(&mut self) -> Ident {
        let alias = format!(
            "{}{}",
            self.config.partitioning.derived_alias_prefix, self.next_derived_alias
        );
        self.next_derived_alias += 1;
        Ident::new(alias)
    }

    fn key_for(&self, table: &str, column: &str) -> Result<&'a str> {
        self.encryption_key
            .ok_or_else(|| RewriteError::missing_key(table, column))
    }

    /// `ENCRYPT(expr, 'key')`
    pub fn encrypt_call(&self, expr: Expr, table: &str, column: &str) -> Result<Expr> {
        let key = self.key_for(table, column)?;
        Ok(cipher_call(&self.config.encryption.encrypt_function, expr, key))
    }

    /// `DECRYPT(expr, 'key')`
    pub fn decrypt_call(&self, expr: Expr, table: &str, column: &str) -> Result<Expr> {
        let key = self.key_for(table, column)?;
        Ok(cipher_call(&self.config.encryption.decrypt_function, expr, key))
    }
}

fn cipher_call(function: &str, expr: Expr, key: &str) -> Expr {
    Expr::Function(Function {
        name: ObjectName(vec![Ident::new(function)]),
        uses_odbc_syntax: false,
        parameters: FunctionArguments::None,
        args: FunctionArguments::List(FunctionArgumentList {
            duplicate_treatment: None,
            args: vec![
                FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)),
                FunctionArg::Unnamed(FunctionArgExpr::Expr(Expr::Value(Value::SingleQuotedString(
                    key.to_string(),
                )))),
            ],
            clauses: vec![],
        }),
        filter: None,
        null_treatment: None,
        over: None,
        within_group: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_commons::models::DataSourceId;
    use tessera_commons::MetadataStore;

    #[test]
    fn test_alias_counters_are_per_context() {
        let session = SessionContext::new(Arc::new(MetadataStore::new()), DataSourceId::new("ds"));
        let config = RewriteConfig::default();

        let mut ctx = RewriteContext::new(&session, &config, None);
        assert_eq!(ctx.allocate_extension_alias().value, "$ext_0");
        assert_eq!(ctx.allocate_extension_alias().value, "$ext_1");
        assert_eq!(ctx.allocate_derived_alias().value, "$sub_0");

        let mut fresh = RewriteContext::new(&session, &config, None);
        assert_eq!(fresh.allocate_extension_alias().value, "$ext_0");
    }

    #[test]
    fn test_cipher_calls_require_key() {
        let session = SessionContext::new(Arc::new(MetadataStore::new()), DataSourceId::new("ds"));
        let config = RewriteConfig::default();
        let ctx = RewriteContext::new(&session, &config, None);
        let err = ctx
            .decrypt_call(Expr::Identifier(Ident::new("c")), "t1", "c")
            .unwrap_err();
        assert!(matches!(err, RewriteError::MissingEncryptionKey { .. }));

        let session = session.with_encryption_key("k");
        let ctx = RewriteContext::new(&session, &config, None);
        let call = ctx.encrypt_call(Expr::Identifier(Ident::new("c")), "t1", "c").unwrap();
        assert_eq!(call.to_string(), "ENCRYPT(c, 'k')");

        let ctx = RewriteContext::new(&session, &config, Some("override"));
        let call = ctx.decrypt_call(Expr::Identifier(Ident::new("c")), "t1", "c").unwrap();
        assert_eq!(call.to_string(), "DECRYPT(c, 'override')");
    }
}
