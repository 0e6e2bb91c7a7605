//! Per-connection session state consumed by the rewrite engine.

use std::sync::Arc;

use tessera_commons::models::{DataSourceId, Database, DatabaseName};
use tessera_commons::MetadataStore;

/// What the engine needs to know about the connection issuing a statement.
#[derive(Debug, Clone)]
pub struct SessionContext {
    data_source: DataSourceId,
    default_database: Option<DatabaseName>,
    encryption_key: Option<String>,
    metadata: Arc<MetadataStore>,
}

impl SessionContext {
    pub fn new(metadata: Arc<MetadataStore>, data_source: DataSourceId) -> Self {
        Self {
            data_source,
            default_database: None,
            encryption_key: None,
            metadata,
        }
    }

    /// Sets the database selected with `USE`.
    pub fn with_database(mut self, database: impl Into<DatabaseName>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn set_encryption_key(&mut self, key: Option<String>) {
        self.encryption_key = key;
    }

    pub fn data_source(&self) -> &DataSourceId {
        &self.data_source
    }

    pub fn default_database(&self) -> Option<&DatabaseName> {
        self.default_database.as_ref()
    }

    pub fn encryption_key(&self) -> Option<&str> {
        self.encryption_key.as_deref()
    }

    pub fn metadata(&self) -> &Arc<MetadataStore> {
        &self.metadata
    }

    /// Current snapshot of `schema`, or of the default database when `None`.
    pub fn database(&self, schema: Option<&str>) -> Option<Arc<Database>> {
        let name = match schema {
            Some(schema) => DatabaseName::new(schema),
            None => self.default_database.clone()?,
        };
        self.metadata.get_database(&self.data_source, &name)
    }
}
