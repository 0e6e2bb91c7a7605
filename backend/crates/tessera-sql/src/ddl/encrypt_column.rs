//! ENCRYPT-typed columns in CREATE TABLE and ALTER TABLE.
//!
//! `ENCRYPT` is a virtual type. New columns get the binary storage type in
//! place. Changing the type of a populated column to or from `ENCRYPT` needs
//! a data migration that runs after the rewritten ALTER:
//!
//! 1. the ALTER itself adds `c$enc_tmp` next to `c`;
//! 2. `UPDATE t SET c$enc_tmp = ENCRYPT(c, 'key')` (one SET per column);
//! 3. `ALTER TABLE t DROP COLUMN c, RENAME COLUMN c$enc_tmp TO c`.

use sqlparser::ast::{
    AlterTableOperation, Assignment, AssignmentTarget, ColumnDef, ColumnOption, ColumnOptionDef,
    CreateTable, DataType, Expr, Ident, MySQLColumnPosition, ObjectName, TableWithJoins,
};
use tessera_commons::models::schemas::{encrypted_storage_length, ColumnLocation, ENCRYPT_TYPE_NAME};
use tessera_configs::EncryptionSettings;

use crate::error::{RewriteError, Result};
use crate::parser::utils::split_object_name;
use crate::parser::{AlterTableStatement, UpdateStatement};
use crate::rewrite::exprs::table_factor;
use crate::scope::{ResolvedTable, RewriteContext};

/// A declared `ENCRYPT` or `ENCRYPT(n)` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptType {
    /// Plaintext length in bytes
    pub length: Option<u64>,
}

impl EncryptType {
    /// `None` for any other type.
    pub fn from_data_type(data_type: &DataType) -> Result<Option<Self>> {
        let DataType::Custom(name, modifiers) = data_type else {
            return Ok(None);
        };
        match name.0.as_slice() {
            [ident] if ident.value.eq_ignore_ascii_case(ENCRYPT_TYPE_NAME) => {}
            _ => return Ok(None),
        }
        match modifiers.as_slice() {
            [] => Ok(Some(Self { length: None })),
            [length] => length
                .trim()
                .parse::<u64>()
                .map(|length| Some(Self { length: Some(length) }))
                .map_err(|_| RewriteError::invalid_sql(format!("invalid ENCRYPT length '{length}'"))),
            _ => Err(RewriteError::invalid_sql("ENCRYPT takes a single length")),
        }
    }

    /// Physical column type holding the ciphertext.
    pub fn storage_type(&self, settings: &EncryptionSettings) -> DataType {
        match (self.length, settings.default_binary_length) {
            (Some(length), _) => DataType::Varbinary(Some(encrypted_storage_length(length))),
            (None, Some(length)) => DataType::Varbinary(Some(length)),
            (None, None) => DataType::Blob(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    Encrypt,
    Decrypt,
}

/// One column migrated through a temporary column.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptColumnInfo {
    pub source: Ident,
    /// Final name; differs from `source` for `CHANGE COLUMN a b ...`
    pub target: Ident,
    pub temporary: Ident,
    pub direction: MigrationDirection,
    /// Definition of the temporary column, already in storage form
    pub column_def: ColumnDef,
    pub position: MySQLColumnPosition,
}

/// A MODIFY or CHANGE clause, normalised.
struct ColumnChange {
    source: Ident,
    target: Ident,
    data_type: DataType,
    options: Vec<ColumnOption>,
    position: Option<MySQLColumnPosition>,
}

enum ChangePlan {
    /// Keep the clause, possibly with a substituted type
    InPlace(ColumnChange),
    Migrate(EncryptColumnInfo),
}

pub struct EncryptColumnProcessor<'c, 'a> {
    ctx: &'c mut RewriteContext<'a>,
}

impl<'c, 'a> EncryptColumnProcessor<'c, 'a> {
    pub fn new(ctx: &'c mut RewriteContext<'a>) -> Self {
        Self { ctx }
    }

    fn settings(&self) -> &'a EncryptionSettings {
        &self.ctx.config().encryption
    }

    /// CREATE TABLE declares at least one ENCRYPT column.
    pub fn create_needs_processing(create: &CreateTable) -> bool {
        create
            .columns
            .iter()
            .any(|column| matches!(EncryptType::from_data_type(&column.data_type), Ok(Some(_)) | Err(_)))
    }

    /// ALTER TABLE adds an ENCRYPT column or changes the type of a column of
    /// a table that has encrypted columns.
    pub fn alter_needs_processing(&mut self, alter: &AlterTableStatement) -> bool {
        let declares_encrypt = alter.operations.iter().any(|operation| match operation {
            AlterTableOperation::AddColumn { column_def, .. } => {
                !matches!(EncryptType::from_data_type(&column_def.data_type), Ok(None))
            }
            AlterTableOperation::ModifyColumn { data_type, .. }
            | AlterTableOperation::ChangeColumn { data_type, .. } => {
                !matches!(EncryptType::from_data_type(data_type), Ok(None))
            }
            _ => false,
        });
        if declares_encrypt {
            return true;
        }
        let changes_type = alter.operations.iter().any(|operation| {
            matches!(
                operation,
                AlterTableOperation::ModifyColumn { .. } | AlterTableOperation::ChangeColumn { .. }
            )
        });
        changes_type && self.existing_table(&alter.name).is_some_and(|t| t.needs_rewrite())
    }

    fn existing_table(&mut self, name: &ObjectName) -> Option<ResolvedTable> {
        let (schema, table) = split_object_name(name);
        let schema = schema.map(|s| s.value.to_lowercase());
        self.ctx
            .lookup_table(schema.as_deref(), &table?.value.to_lowercase())
    }

    /// Substitutes the storage type of every ENCRYPT column.
    #[tracing::instrument(name = "sql.ddl.create_table", skip_all)]
    pub fn process_create_table(&self, create: &mut CreateTable) -> Result<()> {
        for column in &mut create.columns {
            let Some(encrypt) = EncryptType::from_data_type(&column.data_type)? else {
                continue;
            };
            if create.temporary {
                return Err(RewriteError::invalid_sql(format!(
                    "encrypted column '{}' is not allowed on a temporary table",
                    column.name
                )));
            }
            reject_default(&column.name, column.options.iter().map(|o| &o.option))?;
            column.data_type = encrypt.storage_type(self.settings());
        }
        Ok(())
    }

    /// Rewrites the ALTER in place and returns the migration statements to
    /// run after it, in order.
    #[tracing::instrument(name = "sql.ddl.alter_table", skip_all)]
    pub fn process_alter_table(&mut self, alter: &mut AlterTableStatement) -> Result<Vec<String>> {
        let existing = self.existing_table(&alter.name);
        let settings = self.settings();

        let mut operations = Vec::with_capacity(alter.operations.len());
        let mut migrations = Vec::new();
        for operation in std::mem::take(&mut alter.operations) {
            match operation {
                AlterTableOperation::AddColumn {
                    column_keyword,
                    if_not_exists,
                    mut column_def,
                    column_position,
                } => {
                    if let Some(encrypt) = EncryptType::from_data_type(&column_def.data_type)? {
                        reject_default(&column_def.name, column_def.options.iter().map(|o| &o.option))?;
                        column_def.data_type = encrypt.storage_type(settings);
                    }
                    operations.push(AlterTableOperation::AddColumn {
                        column_keyword,
                        if_not_exists,
                        column_def,
                        column_position,
                    });
                }
                AlterTableOperation::ModifyColumn {
                    col_name,
                    data_type,
                    options,
                    column_position,
                } => {
                    let change = ColumnChange {
                        source: col_name.clone(),
                        target: col_name,
                        data_type,
                        options,
                        position: column_position,
                    };
                    match plan_change(change, existing.as_ref(), settings)? {
                        ChangePlan::InPlace(change) => operations.push(AlterTableOperation::ModifyColumn {
                            col_name: change.target,
                            data_type: change.data_type,
                            options: change.options,
                            column_position: change.position,
                        }),
                        ChangePlan::Migrate(info) => migrations.push(info),
                    }
                }
                AlterTableOperation::ChangeColumn {
                    old_name,
                    new_name,
                    data_type,
                    options,
                    column_position,
                } => {
                    let change = ColumnChange {
                        source: old_name,
                        target: new_name,
                        data_type,
                        options,
                        position: column_position,
                    };
                    match plan_change(change, existing.as_ref(), settings)? {
                        ChangePlan::InPlace(change) => operations.push(AlterTableOperation::ChangeColumn {
                            old_name: change.source,
                            new_name: change.target,
                            data_type: change.data_type,
                            options: change.options,
                            column_position: change.position,
                        }),
                        ChangePlan::Migrate(info) => migrations.push(info),
                    }
                }
                other => operations.push(other),
            }
        }

        if migrations.is_empty() {
            alter.operations = operations;
            return Ok(Vec::new());
        }

        let table_name = split_object_name(&alter.name)
            .1
            .map(|t| t.value.to_lowercase())
            .unwrap_or_default();
        let mut assignments = Vec::with_capacity(migrations.len());
        let mut finish = Vec::with_capacity(migrations.len() * 2);
        for info in &migrations {
            let source = Expr::Identifier(info.source.clone());
            let value = match info.direction {
                MigrationDirection::Encrypt => self.ctx.encrypt_call(source, &table_name, &info.source.value)?,
                MigrationDirection::Decrypt => self.ctx.decrypt_call(source, &table_name, &info.source.value)?,
            };
            assignments.push(Assignment {
                target: AssignmentTarget::ColumnName(ObjectName(vec![info.temporary.clone()])),
                value,
            });
            operations.push(AlterTableOperation::AddColumn {
                column_keyword: true,
                if_not_exists: false,
                column_def: info.column_def.clone(),
                column_position: Some(info.position.clone()),
            });
            finish.push(AlterTableOperation::DropColumn {
                column_name: info.source.clone(),
                if_exists: false,
                cascade: false,
            });
            finish.push(AlterTableOperation::RenameColumn {
                old_column_name: info.temporary.clone(),
                new_column_name: info.target.clone(),
            });
            log::debug!(
                "Migrating column {}.{} ({:?}) through {}",
                table_name,
                info.source,
                info.direction,
                info.temporary
            );
        }

        let update = UpdateStatement {
            table: TableWithJoins {
                relation: table_factor(alter.name.clone(), None),
                joins: vec![],
            },
            assignments,
            from: None,
            selection: None,
            returning: None,
            or: None,
            order_by: vec![],
            limit: None,
        };
        let finish = AlterTableStatement {
            name: alter.name.clone(),
            if_exists: false,
            only: false,
            operations: finish,
            location: None,
            on_cluster: None,
        };

        alter.operations = operations;
        Ok(vec![update.to_string(), finish.to_string()])
    }
}

fn plan_change(
    mut change: ColumnChange,
    existing: Option<&ResolvedTable>,
    settings: &EncryptionSettings,
) -> Result<ChangePlan> {
    if let Some(ResolvedTable::Partitioned(partition)) = existing {
        if let Some(ColumnLocation::Extension(index)) = partition.column_location(&change.source.value) {
            let extension = partition
                .extension(index)
                .map(|t| t.table_name().to_string())
                .unwrap_or_default();
            return Err(RewriteError::invalid_sql(format!(
                "column '{}' is stored in extension table '{}' and cannot be changed through '{}'",
                change.source,
                extension,
                partition.name()
            )));
        }
    }
    let encrypt = EncryptType::from_data_type(&change.data_type)?;
    if encrypt.is_some() {
        reject_default(&change.target, change.options.iter())?;
    }
    let was_encrypted = existing.is_some_and(|table| column_is_encrypted(table, &change.source.value));

    let direction = match (was_encrypted, encrypt) {
        (true, Some(encrypt)) => {
            change.data_type = encrypt.storage_type(settings);
            return Ok(ChangePlan::InPlace(change));
        }
        (false, None) => return Ok(ChangePlan::InPlace(change)),
        (false, Some(encrypt)) => {
            change.data_type = encrypt.storage_type(settings);
            MigrationDirection::Encrypt
        }
        (true, None) => MigrationDirection::Decrypt,
    };

    let temporary = Ident::new(format!("{}{}", change.source.value, settings.temp_column_suffix));
    let position = change
        .position
        .unwrap_or_else(|| MySQLColumnPosition::After(change.source.clone()));
    Ok(ChangePlan::Migrate(EncryptColumnInfo {
        column_def: ColumnDef {
            name: temporary.clone(),
            data_type: change.data_type,
            collation: None,
            options: change
                .options
                .into_iter()
                .map(|option| ColumnOptionDef { name: None, option })
                .collect(),
        },
        source: change.source,
        target: change.target,
        temporary,
        direction,
        position,
    }))
}

fn column_is_encrypted(table: &ResolvedTable, column: &str) -> bool {
    match table {
        ResolvedTable::Standard(def) => def.column(column).is_some_and(|c| c.is_encrypted()),
        ResolvedTable::Partitioned(partition) => partition.column(column).is_some_and(|c| c.is_encrypted()),
    }
}

/// A default value would be stored unencrypted.
fn reject_default<'o>(column: &Ident, mut options: impl Iterator<Item = &'o ColumnOption>) -> Result<()> {
    if options.any(|option| matches!(option, ColumnOption::Default(_))) {
        return Err(RewriteError::invalid_sql(format!(
            "encrypted column '{}' cannot have a DEFAULT value",
            column
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(modifiers: &[&str]) -> DataType {
        DataType::Custom(
            ObjectName(vec![Ident::new("encrypt")]),
            modifiers.iter().map(|m| m.to_string()).collect(),
        )
    }

    #[test]
    fn test_encrypt_type_detection() {
        assert_eq!(
            EncryptType::from_data_type(&custom(&[])).unwrap(),
            Some(EncryptType { length: None })
        );
        assert_eq!(
            EncryptType::from_data_type(&custom(&["40"])).unwrap(),
            Some(EncryptType { length: Some(40) })
        );
        assert!(EncryptType::from_data_type(&custom(&["x"])).is_err());
        assert_eq!(EncryptType::from_data_type(&DataType::Int(None)).unwrap(), None);
    }

    #[test]
    fn test_storage_type() {
        let mut settings = EncryptionSettings::default();
        settings.default_binary_length = None;
        let bare = EncryptType { length: None };
        assert_eq!(bare.storage_type(&settings), DataType::Blob(None));
        assert_eq!(
            EncryptType { length: Some(40) }.storage_type(&settings),
            DataType::Varbinary(Some(48))
        );
        assert_eq!(
            EncryptType { length: Some(16) }.storage_type(&settings),
            DataType::Varbinary(Some(32))
        );

        settings.default_binary_length = Some(255);
        assert_eq!(bare.storage_type(&settings), DataType::Varbinary(Some(255)));
    }
}
