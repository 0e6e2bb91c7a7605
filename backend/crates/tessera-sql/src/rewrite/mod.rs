//! Query Rewrite Visitors and the [`RewriteEngine`] entry point.

pub(crate) mod exprs;

mod delete;
mod derived_join;
mod insert;
mod query;
mod update;

use std::ops::ControlFlow;

use sqlparser::ast::{visit_relations, ObjectName, Visit};
use tessera_commons::helpers::security::redact_sensitive_sql;
use tessera_commons::models::{DatabaseName, TableDefinition};
use tessera_configs::RewriteConfig;

use self::query::{ProjectionMode, QueryRewriter};
use crate::ddl::EncryptColumnProcessor;
use crate::error::{RewriteError, Result};
use crate::parser::utils::split_object_name;
use crate::parser::{SqlStatement, SqlStatementKind};
use crate::planner::{PartitionPlan, TablePartitionPlanner};
use crate::scope::RewriteContext;
use crate::session::SessionContext;

/// Result of [`RewriteEngine::rewrite`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    /// The statement tree was modified
    pub changed: bool,
    /// Statements to run after the rewritten one, in order, on the same
    /// backend connection
    pub additional_statements: Vec<String>,
}

impl RewriteOutcome {
    pub fn unchanged() -> Self {
        Self::default()
    }
}

/// A partitioned CREATE TABLE ready to execute.
#[derive(Debug, Clone)]
pub struct PreparedPartition {
    pub plan: PartitionPlan,
    /// CREATE TABLE texts, primary first, storage types substituted
    pub statements: Vec<String>,
    /// Metadata to register once the statements succeed
    pub tables: Vec<TableDefinition>,
}

/// Stateless rewrite entry point. One instance serves every connection;
/// all per-statement state lives in a [`RewriteContext`].
#[derive(Debug, Clone, Default)]
pub struct RewriteEngine {
    config: RewriteConfig,
}

impl RewriteEngine {
    pub fn new(config: RewriteConfig) -> Self {
        log::debug!(
            "Rewrite engine configured: max_columns_per_table={}, log filter '{}'",
            config.partitioning.max_columns_per_table,
            config.logging.filter_directives()
        );
        Self { config }
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// Rewrites `statement` in place.
    ///
    /// The rewrite runs on a copy of the tree and replaces the original only
    /// when it succeeds, so an error leaves `statement` untouched.
    /// Partitioned CREATE TABLE goes through [`Self::prepare_partition`].
    #[tracing::instrument(name = "sql.rewrite", skip_all, fields(kind = statement.kind_name()))]
    pub fn rewrite(&self, statement: &mut SqlStatement, session: &SessionContext) -> Result<RewriteOutcome> {
        let statement_key = statement.attributes.encryption_key.clone();
        let mut ctx = RewriteContext::new(session, &self.config, statement_key.as_deref());

        if !needs_rewrite(&statement.kind, &mut ctx) {
            log::trace!("No partitioned or encrypted table in {}", statement.kind_name());
            return Ok(RewriteOutcome::unchanged());
        }

        let mut working = statement.kind.clone();
        let additional_statements = match &mut working {
            SqlStatementKind::Select(query) => {
                QueryRewriter::new(&mut ctx).rewrite_query(query, &ProjectionMode::Decrypt, None)?;
                Vec::new()
            }
            SqlStatementKind::Insert(insert) => {
                QueryRewriter::new(&mut ctx).rewrite_insert(insert)?;
                Vec::new()
            }
            SqlStatementKind::Update(update) => {
                QueryRewriter::new(&mut ctx).rewrite_update(update)?;
                Vec::new()
            }
            SqlStatementKind::Delete(delete) => {
                QueryRewriter::new(&mut ctx).rewrite_delete(delete)?;
                Vec::new()
            }
            SqlStatementKind::CreateTable(create) => {
                EncryptColumnProcessor::new(&mut ctx).process_create_table(create)?;
                Vec::new()
            }
            SqlStatementKind::AlterTable(alter) => EncryptColumnProcessor::new(&mut ctx).process_alter_table(alter)?,
            SqlStatementKind::Other(_) => Vec::new(),
        };

        let changed = working != statement.kind;
        if changed {
            log::debug!(
                "Rewrote {} ({} scope node(s)): {}",
                statement.kind_name(),
                ctx.tree.len(),
                self.redact(&working.to_string())
            );
            statement.kind = working;
        }
        for extra in &additional_statements {
            log::debug!("Follow-up statement: {}", self.redact(extra));
        }

        Ok(RewriteOutcome {
            changed,
            additional_statements,
        })
    }

    /// SQL text safe to log: keys in calls to the configured cipher
    /// functions are masked.
    fn redact(&self, sql: &str) -> String {
        let encryption = &self.config.encryption;
        redact_sensitive_sql(
            sql,
            &[encryption.encrypt_function.as_str(), encryption.decrypt_function.as_str()],
        )
    }

    /// Plans a `/*+ PARTITION(...) */ CREATE TABLE`. `None` for any other
    /// statement.
    #[tracing::instrument(name = "sql.partition", skip_all)]
    pub fn prepare_partition(
        &self,
        statement: &SqlStatement,
        session: &SessionContext,
    ) -> Result<Option<PreparedPartition>> {
        let SqlStatementKind::CreateTable(create) = &statement.kind else {
            return Ok(None);
        };
        let planner = TablePartitionPlanner::new(&self.config.partitioning);
        let Some(mut plan) = planner.prepare(create, &statement.attributes)? else {
            return Ok(None);
        };

        let database = match split_object_name(&create.name).0 {
            Some(schema) => DatabaseName::new(schema.value.as_str()),
            None => session.default_database().cloned().ok_or_else(|| {
                RewriteError::UnknownTable(format!("no database selected for table '{}'", create.name))
            })?,
        };
        // Metadata keeps the declared ENCRYPT types
        let tables = plan.table_definitions(session.data_source(), &database);

        let statement_key = statement.attributes.encryption_key.clone();
        let mut ctx = RewriteContext::new(session, &self.config, statement_key.as_deref());
        let processor = EncryptColumnProcessor::new(&mut ctx);
        for create in plan.create_tables_mut() {
            processor.process_create_table(create)?;
        }
        let statements = plan.create_statements();

        Ok(Some(PreparedPartition {
            plan,
            statements,
            tables,
        }))
    }
}

/// Fast path: does any referenced relation need rewriting?
fn needs_rewrite(kind: &SqlStatementKind, ctx: &mut RewriteContext<'_>) -> bool {
    match kind {
        SqlStatementKind::Select(query) => references_rewritable_table(query.as_ref(), ctx),
        SqlStatementKind::Insert(insert) => references_rewritable_table(insert, ctx),
        SqlStatementKind::Delete(delete) => references_rewritable_table(delete, ctx),
        SqlStatementKind::Update(update) => {
            references_rewritable_table(&update.table, ctx)
                || references_rewritable_table(&update.from, ctx)
                || references_rewritable_table(&update.assignments, ctx)
                || references_rewritable_table(&update.selection, ctx)
        }
        SqlStatementKind::CreateTable(create) => EncryptColumnProcessor::create_needs_processing(create),
        SqlStatementKind::AlterTable(alter) => EncryptColumnProcessor::new(ctx).alter_needs_processing(alter),
        SqlStatementKind::Other(_) => false,
    }
}

fn references_rewritable_table<V: Visit>(node: &V, ctx: &mut RewriteContext<'_>) -> bool {
    let found = visit_relations(node, |name: &ObjectName| {
        let (schema, Some(table)) = split_object_name(name) else {
            return ControlFlow::Continue(());
        };
        let schema = schema.map(|s| s.value.to_lowercase());
        match ctx.lookup_table(schema.as_deref(), &table.value.to_lowercase()) {
            Some(resolved) if resolved.needs_rewrite() => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    });
    found.is_break()
}
