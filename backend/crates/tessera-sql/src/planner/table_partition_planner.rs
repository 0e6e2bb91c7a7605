//! Splits a `/*+ PARTITION(...) */ CREATE TABLE` into one primary table and
//! its extension tables.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use sqlparser::ast::{
    visit_expressions, ColumnDef, ColumnOption, ColumnOptionDef, CreateTable, DataType, Expr, Ident,
    KeyOrIndexDisplay, NullsDistinctOption, ObjectName, TableConstraint,
};
use sqlparser::tokenizer::Token;
use tessera_commons::models::{
    ColumnDefinition, ColumnType, DataSourceId, DatabaseName, TableDefinition, TableId, TableName,
};
use tessera_configs::PartitioningSettings;

use super::layout::{plan, ColumnLayout, PlanColumn, PlanError};
use crate::parser::utils::{qualified_object_name, split_object_name};
use crate::parser::{ExtensionColumns, StatementAttributes};

const AUTO_INCREMENT: &str = "AUTO_INCREMENT";

/// The physical tables of one partitioned CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionPlan {
    /// Logical (and primary) table name
    pub table: TableName,
    pub layout: ColumnLayout,
    pub link_column: Ident,
    pub primary: CreateTable,
    /// In extension order
    pub extensions: Vec<CreateTable>,
}

impl PartitionPlan {
    /// Primary first, then every extension table.
    pub fn create_tables(&self) -> impl Iterator<Item = &CreateTable> {
        std::iter::once(&self.primary).chain(self.extensions.iter())
    }

    pub fn create_tables_mut(&mut self) -> impl Iterator<Item = &mut CreateTable> {
        std::iter::once(&mut self.primary).chain(self.extensions.iter_mut())
    }

    pub fn create_statements(&self) -> Vec<String> {
        self.create_tables().map(|create| create.to_string()).collect()
    }

    /// Metadata entries for the whole partition group.
    pub fn table_definitions(&self, data_source: &DataSourceId, database: &DatabaseName) -> Vec<TableDefinition> {
        let table_id = |create: &CreateTable| {
            let name = split_object_name(&create.name)
                .1
                .map(|ident| ident.value.clone())
                .unwrap_or_default();
            TableId::new(data_source.clone(), database.clone(), TableName::new(name))
        };
        let primary_id = table_id(&self.primary);
        let extension_ids: Vec<TableId> = self.extensions.iter().map(table_id).collect();

        let mut definitions = Vec::with_capacity(self.extensions.len() + 1);
        definitions.push(TableDefinition::new_primary(
            primary_id.clone(),
            self.column_definitions(&self.primary, primary_id.table_name()),
            extension_ids.iter().map(|id| id.table_name().clone()).collect(),
            self.link_column.value.clone(),
        ));
        for (create, id) in self.extensions.iter().zip(extension_ids) {
            let columns = self.column_definitions(create, id.table_name());
            definitions.push(TableDefinition::new_extension(
                id,
                columns,
                primary_id.table_name().clone(),
                self.link_column.value.clone(),
            ));
        }
        definitions
    }

    fn column_definitions(&self, create: &CreateTable, table: &TableName) -> Vec<ColumnDefinition> {
        let keys = primary_key_columns(create);
        create
            .columns
            .iter()
            .zip(1u32..)
            .map(|(column, position)| {
                if column.name.value.eq_ignore_ascii_case(&self.link_column.value) {
                    let link = ColumnDefinition::link_column(table.clone(), &column.name.value, position);
                    return link.with_auto_increment(is_auto_increment(column));
                }
                column_definition(column, table, position, keys.contains(&column.name.value.to_lowercase()))
            })
            .collect()
    }
}

/// Builds [`PartitionPlan`]s from a CREATE TABLE and its statement attributes.
pub struct TablePartitionPlanner<'a> {
    settings: &'a PartitioningSettings,
}

impl<'a> TablePartitionPlanner<'a> {
    pub fn new(settings: &'a PartitioningSettings) -> Self {
        Self { settings }
    }

    /// `None` when the statement is not marked partitioned.
    #[tracing::instrument(name = "sql.partition.prepare", skip_all)]
    pub fn prepare(
        &self,
        create: &CreateTable,
        attributes: &StatementAttributes,
    ) -> Result<Option<PartitionPlan>, PlanError> {
        let Some(eligible) = &attributes.partition else {
            return Ok(None);
        };
        if create.temporary {
            return Err(PlanError::Unsupported(
                "a temporary table cannot be partitioned".to_string(),
            ));
        }
        if create.query.is_some() || create.like.is_some() || create.clone.is_some() {
            return Err(PlanError::Unsupported(
                "a partitioned table needs explicit column definitions".to_string(),
            ));
        }

        let link = Ident::new(self.settings.link_column.clone());
        if let Some(column) = create
            .columns
            .iter()
            .find(|c| c.name.value.eq_ignore_ascii_case(&link.value))
        {
            return Err(PlanError::LinkColumnCollision(column.name.value.clone()));
        }
        if let ExtensionColumns::Named(names) = eligible {
            if let Some(missing) = names
                .iter()
                .find(|name| !create.columns.iter().any(|c| c.name.value.eq_ignore_ascii_case(name)))
            {
                return Err(PlanError::UnknownColumn(missing.clone()));
            }
        }

        let keys = primary_key_columns(create);
        let columns: Vec<PlanColumn> = create
            .columns
            .iter()
            .map(|column| {
                let name = column.name.value.to_lowercase();
                let pinned = keys.contains(&name) || is_auto_increment(column);
                PlanColumn::new(name.clone(), !pinned && eligible.is_eligible(&name))
            })
            .collect();
        let layout = plan(&columns, self.settings.max_columns_per_table, self.settings.watermark)?;

        let mut constraints: Vec<Vec<TableConstraint>> = vec![Vec::new(); layout.extensions.len() + 1];
        for constraint in &create.constraints {
            let target = constraint_table(constraint, &layout)?;
            constraints[target].push(constraint.clone());
        }
        let mut constraints = constraints.into_iter();

        let table_name = split_object_name(&create.name)
            .1
            .map(|ident| ident.value.clone())
            .unwrap_or_default();
        let columns_of = |names: &[String]| -> Vec<ColumnDef> {
            create
                .columns
                .iter()
                .filter(|c| names.iter().any(|n| c.name.value.eq_ignore_ascii_case(n)))
                .cloned()
                .collect()
        };

        let mut primary_columns = columns_of(&layout.primary);
        primary_columns.push(link_column_def(&link, !create.columns.iter().any(is_auto_increment)));
        let mut primary_constraints = constraints.next().unwrap_or_default();
        primary_constraints.push(unique_key(&link));
        let primary = CreateTable {
            columns: primary_columns,
            constraints: primary_constraints,
            ..create.clone()
        };

        let extensions = layout
            .extensions
            .iter()
            .zip(constraints)
            .enumerate()
            .map(|(index, (names, moved))| {
                let mut columns = vec![link_column_def(&link, false)];
                columns.extend(columns_of(names));
                let mut extension_constraints = vec![primary_key(&link)];
                extension_constraints.extend(moved);
                CreateTable {
                    name: extension_table_name(&create.name, &self.settings.extension_table_suffix, index),
                    columns,
                    constraints: extension_constraints,
                    auto_increment_offset: None,
                    ..create.clone()
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Partitioning {} into {} extension table(s) ({} primary columns)",
            table_name,
            extensions.len(),
            layout.primary.len()
        );

        Ok(Some(PartitionPlan {
            table: TableName::new(table_name),
            layout,
            link_column: link,
            primary,
            extensions,
        }))
    }
}

/// Table a constraint belongs to (0 = primary).
fn constraint_table(constraint: &TableConstraint, layout: &ColumnLayout) -> Result<usize, PlanError> {
    let columns: Vec<String> = match constraint {
        TableConstraint::Unique { columns, .. }
        | TableConstraint::PrimaryKey { columns, .. }
        | TableConstraint::ForeignKey { columns, .. }
        | TableConstraint::Index { columns, .. }
        | TableConstraint::FulltextOrSpatial { columns, .. } => {
            columns.iter().map(|c| c.value.to_lowercase()).collect()
        }
        TableConstraint::Check { expr, .. } => referenced_columns(expr),
    };

    let tables: BTreeSet<usize> = columns.iter().filter_map(|c| layout.table_of(c)).collect();
    match tables.len() {
        0 => Ok(0),
        1 => Ok(tables.into_iter().next().unwrap_or_default()),
        _ => Err(PlanError::SpanningConstraint(constraint.to_string())),
    }
}

fn referenced_columns(expr: &Expr) -> Vec<String> {
    let mut names = Vec::new();
    let _ = visit_expressions(expr, |e| {
        match e {
            Expr::Identifier(ident) => names.push(ident.value.to_lowercase()),
            Expr::CompoundIdentifier(parts) => {
                if let Some(last) = parts.last() {
                    names.push(last.value.to_lowercase());
                }
            }
            _ => {}
        }
        ControlFlow::<()>::Continue(())
    });
    names
}

/// Lower-cased names of the primary key columns, column-level or table-level.
fn primary_key_columns(create: &CreateTable) -> BTreeSet<String> {
    let mut keys: BTreeSet<String> = create
        .columns
        .iter()
        .filter(|column| {
            column
                .options
                .iter()
                .any(|o| matches!(o.option, ColumnOption::Unique { is_primary: true, .. }))
        })
        .map(|column| column.name.value.to_lowercase())
        .collect();
    for constraint in &create.constraints {
        if let TableConstraint::PrimaryKey { columns, .. } = constraint {
            keys.extend(columns.iter().map(|c| c.value.to_lowercase()));
        }
    }
    keys
}

fn is_auto_increment(column: &ColumnDef) -> bool {
    column.options.iter().any(|o| match &o.option {
        ColumnOption::DialectSpecific(tokens) => tokens
            .iter()
            .any(|t| t.to_string().eq_ignore_ascii_case(AUTO_INCREMENT)),
        _ => false,
    })
}

/// `link BIGINT NOT NULL [AUTO_INCREMENT]`
fn link_column_def(link: &Ident, auto_increment: bool) -> ColumnDef {
    let mut options = vec![ColumnOptionDef {
        name: None,
        option: ColumnOption::NotNull,
    }];
    if auto_increment {
        options.push(ColumnOptionDef {
            name: None,
            option: ColumnOption::DialectSpecific(vec![Token::make_keyword(AUTO_INCREMENT)]),
        });
    }
    ColumnDef {
        name: link.clone(),
        data_type: DataType::BigInt(None),
        collation: None,
        options,
    }
}

/// `UNIQUE KEY (link)`
fn unique_key(link: &Ident) -> TableConstraint {
    TableConstraint::Unique {
        name: None,
        index_name: None,
        index_type_display: KeyOrIndexDisplay::Key,
        index_type: None,
        columns: vec![link.clone()],
        index_options: vec![],
        characteristics: None,
        nulls_distinct: NullsDistinctOption::None,
    }
}

/// `PRIMARY KEY (link)`
fn primary_key(link: &Ident) -> TableConstraint {
    TableConstraint::PrimaryKey {
        name: None,
        index_name: None,
        index_type: None,
        columns: vec![link.clone()],
        index_options: vec![],
        characteristics: None,
    }
}

fn column_definition(column: &ColumnDef, table: &TableName, position: u32, is_key: bool) -> ColumnDefinition {
    let column_type = ColumnType::parse_sql_type(&column.data_type.to_string());
    let mut definition = if is_key {
        ColumnDefinition::primary_key(table.clone(), &column.name.value, position, column_type)
    } else {
        ColumnDefinition::simple(table.clone(), &column.name.value, position, column_type)
    };
    for option in &column.options {
        match &option.option {
            ColumnOption::NotNull => definition = definition.with_nullable(false),
            ColumnOption::Unique { is_primary: true, .. } => definition = definition.with_nullable(false),
            ColumnOption::Default(expr) => definition = definition.with_default(expr.to_string()),
            _ => {}
        }
    }
    definition.with_auto_increment(is_auto_increment(column))
}

/// Name under which the planner registers extension table `index` of `table`.
pub fn extension_table_name(table: &ObjectName, suffix: &str, index: usize) -> ObjectName {
    let (schema, name) = split_object_name(table);
    let name = name.map(|ident| ident.value.as_str()).unwrap_or_default();
    qualified_object_name(schema, format!("{name}{suffix}{index}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{SqlStatement, SqlStatementKind};
    use tessera_commons::models::TableType;

    fn prepare(sql: &str, settings: &PartitioningSettings) -> Result<Option<PartitionPlan>, PlanError> {
        let statement = SqlStatement::parse(sql).unwrap();
        let SqlStatementKind::CreateTable(create) = &statement.kind else {
            panic!("not a CREATE TABLE: {sql}");
        };
        TablePartitionPlanner::new(settings).prepare(create, &statement.attributes)
    }

    fn narrow_settings() -> PartitioningSettings {
        PartitioningSettings {
            max_columns_per_table: 4,
            watermark: 0.5,
            ..PartitioningSettings::default()
        }
    }

    #[test]
    fn test_unmarked_table_is_not_partitioned() {
        let plan = prepare("CREATE TABLE t (id INT PRIMARY KEY, a INT)", &narrow_settings()).unwrap();
        assert!(plan.is_none());
    }

    #[test]
    fn test_prepare_named_columns() {
        let sql = "/*+ PARTITION(a, b, c) */ CREATE TABLE wide (id INT NOT NULL AUTO_INCREMENT, name VARCHAR(20), a INT, b TEXT, c INT, PRIMARY KEY (id), KEY idx_c (c))";
        let plan = prepare(sql, &narrow_settings()).unwrap().unwrap();

        assert_eq!(plan.layout.primary, vec!["id", "name"]);
        assert_eq!(plan.layout.extensions, vec![vec!["a", "b"], vec!["c"]]);

        let statements = plan.create_statements();
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[0],
            "CREATE TABLE wide (id INT NOT NULL AUTO_INCREMENT, name VARCHAR(20), $_ext_id BIGINT NOT NULL, PRIMARY KEY (id), UNIQUE KEY ($_ext_id))"
        );
        assert_eq!(
            statements[1],
            "CREATE TABLE wide$ext0 ($_ext_id BIGINT NOT NULL, a INT, b TEXT, PRIMARY KEY ($_ext_id))"
        );
        assert_eq!(
            statements[2],
            "CREATE TABLE wide$ext1 ($_ext_id BIGINT NOT NULL, c INT, PRIMARY KEY ($_ext_id), KEY idx_c (c))"
        );
    }

    #[test]
    fn test_link_column_is_auto_increment_without_other_counter() {
        let sql = "/*+ PARTITION(*) */ CREATE TABLE t (code VARCHAR(8) PRIMARY KEY, a INT)";
        let plan = prepare(sql, &narrow_settings()).unwrap().unwrap();
        assert!(plan.primary.to_string().contains("$_ext_id BIGINT NOT NULL AUTO_INCREMENT"));
        assert_eq!(plan.layout.primary, vec!["code"]);
    }

    #[test]
    fn test_spanning_constraint_is_rejected() {
        let sql = "/*+ PARTITION(a) */ CREATE TABLE t (id INT PRIMARY KEY, name INT, a INT, UNIQUE KEY (name, a))";
        let err = prepare(sql, &narrow_settings()).unwrap_err();
        assert!(matches!(err, PlanError::SpanningConstraint(_)));
    }

    #[test]
    fn test_check_constraint_follows_its_columns() {
        let sql = "/*+ PARTITION(a) */ CREATE TABLE t (id INT PRIMARY KEY, a INT, CHECK (a > 0))";
        let plan = prepare(sql, &narrow_settings()).unwrap().unwrap();
        assert!(plan.extensions[0].to_string().contains("CHECK (a > 0)"));
        assert!(!plan.primary.to_string().contains("CHECK"));
    }

    #[test]
    fn test_prepare_errors() {
        let settings = narrow_settings();
        assert!(matches!(
            prepare("/*+ PARTITION(zz) */ CREATE TABLE t (id INT, a INT)", &settings),
            Err(PlanError::UnknownColumn(name)) if name == "zz"
        ));
        assert!(matches!(
            prepare("/*+ PARTITION(*) */ CREATE TABLE t (id INT, `$_ext_id` INT)", &settings),
            Err(PlanError::LinkColumnCollision(_))
        ));
        assert!(matches!(
            prepare("/*+ PARTITION(*) */ CREATE TEMPORARY TABLE t (id INT, a INT)", &settings),
            Err(PlanError::Unsupported(_))
        ));
        assert_eq!(
            prepare("/*+ PARTITION(*) */ CREATE TABLE t (id INT PRIMARY KEY)", &settings),
            Err(PlanError::NoEligibleColumns)
        );
    }

    #[test]
    fn test_table_definitions() {
        let sql = "/*+ PARTITION(secret) */ CREATE TABLE shop.people (id INT PRIMARY KEY, secret ENCRYPT(20) NOT NULL)";
        let plan = prepare(sql, &narrow_settings()).unwrap().unwrap();
        assert_eq!(plan.extensions[0].name.to_string(), "shop.people$ext0");

        let defs = plan.table_definitions(&DataSourceId::new("ds"), &DatabaseName::new("shop"));
        assert_eq!(defs.len(), 2);
        let primary = &defs[0];
        assert_eq!(primary.table_type, TableType::Primary);
        assert_eq!(primary.extension_tables, vec![TableName::new("people$ext0")]);
        assert!(primary.column("id").unwrap().is_primary_key);
        assert!(primary.validate().is_ok());

        let extension = &defs[1];
        assert_eq!(extension.primary_table, Some(TableName::new("people")));
        let secret = extension.column("secret").unwrap();
        assert_eq!(secret.column_type, ColumnType::encrypted(Some(20)));
        assert!(!secret.is_nullable);
        assert!(extension.validate().is_ok());
    }

    #[test]
    fn test_extension_table_name() {
        let name = ObjectName(vec![Ident::new("db"), Ident::new("t")]);
        assert_eq!(extension_table_name(&name, "$ext", 2).to_string(), "db.t$ext2");
    }
}
