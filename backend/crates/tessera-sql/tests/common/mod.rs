//! Shared metadata fixture for the rewrite integration tests.
//!
//! Database `db` of data source `ds0`:
//! - `t1`: partitioned, primary `t1(id)` plus extension `ext1(col2)`
//! - `t2`: plain table
//! - `people`, `archive`: tables with an encrypted `ssn` column
//! - `t`: plain table used by the ALTER tests
//! - `p`: partitioned, primary `p(id)` plus extension `p_ext(x, secret)`, joined on `rid`

#![allow(dead_code)]

use std::sync::Arc;

use tessera_commons::models::{
    ColumnDefinition, ColumnType, DataSourceId, TableDefinition, TableId, TableName,
};
use tessera_commons::MetadataStore;
use tessera_sql::{RewriteEngine, RewriteOutcome, SessionContext, SqlStatement};

pub const DATA_SOURCE: &str = "ds0";
pub const DATABASE: &str = "db";
pub const KEY: &str = "k";
pub const LINK: &str = "$_ext_id";

fn id(table: &str) -> TableId {
    TableId::from_strings(DATA_SOURCE, DATABASE, table)
}

fn partitioned_t1() -> Vec<TableDefinition> {
    let t1 = TableName::new("t1");
    let ext1 = TableName::new("ext1");
    vec![
        TableDefinition::new_primary(
            id("t1"),
            vec![
                ColumnDefinition::primary_key(t1.clone(), "id", 1, ColumnType::sql("BIGINT")),
                ColumnDefinition::link_column(t1.clone(), LINK, 2).with_auto_increment(true),
            ],
            vec![ext1.clone()],
            LINK,
        ),
        TableDefinition::new_extension(
            id("ext1"),
            vec![
                ColumnDefinition::link_column(ext1.clone(), LINK, 1),
                ColumnDefinition::simple(ext1, "col2", 2, ColumnType::sql("VARCHAR(10)")),
            ],
            t1,
            LINK,
        ),
    ]
}

/// Partition group whose link column differs from the configured default.
fn partitioned_p() -> Vec<TableDefinition> {
    let p = TableName::new("p");
    let p_ext = TableName::new("p_ext");
    vec![
        TableDefinition::new_primary(
            id("p"),
            vec![
                ColumnDefinition::primary_key(p.clone(), "id", 1, ColumnType::sql("INT")),
                ColumnDefinition::link_column(p.clone(), "rid", 2).with_auto_increment(true),
            ],
            vec![p_ext.clone()],
            "rid",
        ),
        TableDefinition::new_extension(
            id("p_ext"),
            vec![
                ColumnDefinition::link_column(p_ext.clone(), "rid", 1),
                ColumnDefinition::simple(p_ext.clone(), "x", 2, ColumnType::sql("INT")),
                ColumnDefinition::simple(p_ext, "secret", 3, ColumnType::encrypted(Some(8))),
            ],
            p,
            "rid",
        ),
    ]
}

fn encrypted_table(name: &str, plain_column: &str) -> TableDefinition {
    let table = TableName::new(name);
    TableDefinition::new_standard(
        id(name),
        vec![
            ColumnDefinition::primary_key(table.clone(), "id", 1, ColumnType::sql("INT")),
            ColumnDefinition::simple(table.clone(), plain_column, 2, ColumnType::sql("TEXT")),
            ColumnDefinition::simple(table, "ssn", 3, ColumnType::encrypted(Some(20))),
        ],
    )
}

fn plain_table(name: &str, columns: &[&str]) -> TableDefinition {
    let table = TableName::new(name);
    let columns = columns
        .iter()
        .zip(1u32..)
        .map(|(column, position)| ColumnDefinition::simple(table.clone(), *column, position, ColumnType::sql("INT")))
        .collect();
    TableDefinition::new_standard(id(name), columns)
}

pub fn metadata() -> Arc<MetadataStore> {
    let store = MetadataStore::new();
    store.put_tables(partitioned_t1()).unwrap();
    store.put_tables(partitioned_p()).unwrap();
    store.put_table(plain_table("t2", &["id", "v"])).unwrap();
    store.put_table(plain_table("t", &["id", "c"])).unwrap();
    store.put_table(encrypted_table("people", "name")).unwrap();
    store.put_table(encrypted_table("archive", "note")).unwrap();
    Arc::new(store)
}

/// Session on `db` holding the encryption key.
pub fn session() -> SessionContext {
    SessionContext::new(metadata(), DataSourceId::new(DATA_SOURCE))
        .with_database(DATABASE)
        .with_encryption_key(KEY)
}

/// Session on `db` without a key.
pub fn keyless_session() -> SessionContext {
    SessionContext::new(metadata(), DataSourceId::new(DATA_SOURCE)).with_database(DATABASE)
}

/// Parses and rewrites `sql`, returning the rewritten text and the outcome.
pub fn rewrite_with(session: &SessionContext, sql: &str) -> tessera_sql::Result<(String, RewriteOutcome)> {
    let engine = RewriteEngine::default();
    let mut statement = SqlStatement::parse(sql)?;
    let outcome = engine.rewrite(&mut statement, session)?;
    Ok((statement.to_string(), outcome))
}

pub fn rewrite(sql: &str) -> String {
    rewrite_with(&session(), sql).unwrap().0
}
