use super::defaults::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration of the SQL rewrite engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewriteConfig {
    #[serde(default)]
    pub partitioning: PartitioningSettings,
    #[serde(default)]
    pub encryption: EncryptionSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Table partitioning settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitioningSettings {
    /// Column limit of one backend table
    #[serde(default = "default_max_columns_per_table")]
    pub max_columns_per_table: usize,
    /// Fraction of `max_columns_per_table` an extension table is filled to.
    /// The rest is headroom for later ADD COLUMN without re-partitioning.
    #[serde(default = "default_watermark")]
    pub watermark: f64,
    /// Hidden integer column joining primary and extension rows
    #[serde(default = "default_link_column")]
    pub link_column: String,
    /// Prefix of synthetic extension join aliases (`$ext_0`, `$ext_1`, ...)
    #[serde(default = "default_extension_alias_prefix")]
    pub extension_alias_prefix: String,
    /// Suffix of generated extension table names (`orders$ext0`, ...)
    #[serde(default = "default_extension_table_suffix")]
    pub extension_table_suffix: String,
    /// Prefix of derived-table aliases created for ORDER BY / LIMIT DML
    #[serde(default = "default_derived_alias_prefix")]
    pub derived_alias_prefix: String,
}

impl Default for PartitioningSettings {
    fn default() -> Self {
        Self {
            max_columns_per_table: default_max_columns_per_table(),
            watermark: default_watermark(),
            link_column: default_link_column(),
            extension_alias_prefix: default_extension_alias_prefix(),
            extension_table_suffix: default_extension_table_suffix(),
            derived_alias_prefix: default_derived_alias_prefix(),
        }
    }
}

impl PartitioningSettings {
    /// Column capacity of one extension table: `floor(max * watermark)`.
    pub fn extension_capacity(&self) -> usize {
        watermark_capacity(self.max_columns_per_table, self.watermark)
    }
}

/// `floor(max * watermark)` computed in millionths so that watermarks with
/// no exact binary form (0.29, 0.57) do not lose a column to rounding.
pub fn watermark_capacity(max_columns: usize, watermark: f64) -> usize {
    const SCALE: u128 = 1_000_000;
    let scaled = (watermark * SCALE as f64).round().max(0.0) as u128;
    (max_columns as u128 * scaled / SCALE) as usize
}

/// Column encryption settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionSettings {
    #[serde(default = "default_encrypt_function")]
    pub encrypt_function: String,
    #[serde(default = "default_decrypt_function")]
    pub decrypt_function: String,
    /// Suffix of the temporary column used while migrating existing data
    #[serde(default = "default_temp_column_suffix")]
    pub temp_column_suffix: String,
    /// Storage length for a bare `ENCRYPT` column. Unset stores it as `BLOB`.
    #[serde(default)]
    pub default_binary_length: Option<u64>,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            encrypt_function: default_encrypt_function(),
            decrypt_function: default_decrypt_function(),
            temp_column_suffix: default_temp_column_suffix(),
            default_binary_length: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional per-target log level overrides
    /// Configure via a TOML table:
    /// [logging.targets]
    /// tessera_sql = "debug"
    /// sqlparser = "warn"
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

impl LoggingSettings {
    /// Filter directives in `tracing`/`env_logger` syntax: the base level
    /// followed by `target=level` overrides, sorted by target.
    pub fn filter_directives(&self) -> String {
        let mut targets: Vec<_> = self.targets.iter().collect();
        targets.sort();
        std::iter::once(self.level.clone())
            .chain(targets.into_iter().map(|(target, level)| format!("{target}={level}")))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            targets: HashMap::new(),
        }
    }
}
