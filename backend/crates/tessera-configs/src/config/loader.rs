use super::types::RewriteConfig;
use std::fs;
use std::path::Path;

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl RewriteConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: RewriteConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        config.validate()?;

        Ok(config)
    }

    /// Apply `TESSERA_*` environment variable overrides, then re-validate.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn apply_overrides_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("TESSERA_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        if let Some(max) = lookup("TESSERA_MAX_COLUMNS_PER_TABLE") {
            self.partitioning.max_columns_per_table = max
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid TESSERA_MAX_COLUMNS_PER_TABLE value: {}", max))?;
        }

        if let Some(watermark) = lookup("TESSERA_PARTITION_WATERMARK") {
            self.partitioning.watermark = watermark
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid TESSERA_PARTITION_WATERMARK value: {}", watermark))?;
        }

        self.validate()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        let partitioning = &self.partitioning;
        if partitioning.max_columns_per_table < 2 {
            return Err(anyhow::anyhow!(
                "max_columns_per_table must be at least 2, got {}",
                partitioning.max_columns_per_table
            ));
        }

        if !(partitioning.watermark > 0.0 && partitioning.watermark <= 1.0) {
            return Err(anyhow::anyhow!(
                "watermark must be in (0, 1], got {}",
                partitioning.watermark
            ));
        }

        if partitioning.extension_capacity() < 1 {
            return Err(anyhow::anyhow!(
                "max_columns_per_table ({}) * watermark ({}) leaves no room for extension columns",
                partitioning.max_columns_per_table,
                partitioning.watermark
            ));
        }

        for (name, value) in [
            ("link_column", &partitioning.link_column),
            ("extension_alias_prefix", &partitioning.extension_alias_prefix),
            ("extension_table_suffix", &partitioning.extension_table_suffix),
            ("derived_alias_prefix", &partitioning.derived_alias_prefix),
            ("temp_column_suffix", &self.encryption.temp_column_suffix),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("{} cannot be empty", name));
            }
        }

        for (name, value) in [
            ("encrypt_function", &self.encryption.encrypt_function),
            ("decrypt_function", &self.encryption.decrypt_function),
        ] {
            if !is_identifier(value) {
                return Err(anyhow::anyhow!(
                    "{} must be a plain SQL identifier, got '{}'",
                    name,
                    value
                ));
            }
        }

        if self.encryption.default_binary_length == Some(0) {
            return Err(anyhow::anyhow!("default_binary_length cannot be 0"));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        // Validate per-target log levels if provided
        for (target, level) in &self.logging.targets {
            if !VALID_LOG_LEVELS.contains(&level.as_str()) {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}' for target '{}'. Must be one of: {}",
                    level,
                    target,
                    VALID_LOG_LEVELS.join(", ")
                ));
            }
        }

        Ok(())
    }
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = RewriteConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.partitioning.extension_capacity(), 813);
    }

    #[test]
    fn test_invalid_watermark() {
        let mut config = RewriteConfig::default();
        config.partitioning.watermark = 0.0;
        assert!(config.validate().is_err());
        config.partitioning.watermark = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_capacity_must_hold_one_column() {
        let mut config = RewriteConfig::default();
        config.partitioning.max_columns_per_table = 2;
        config.partitioning.watermark = 0.4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_function_name() {
        let mut config = RewriteConfig::default();
        config.encryption.encrypt_function = "AES ENCRYPT".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = RewriteConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = RewriteConfig::default();
        config.logging.targets.insert("tessera_sql".to_string(), "loud".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RewriteConfig::from_toml_str(
            r#"
            [partitioning]
            max_columns_per_table = 100

            [encryption]
            default_binary_length = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.partitioning.max_columns_per_table, 100);
        assert_eq!(config.partitioning.link_column, "$_ext_id");
        assert_eq!(config.encryption.default_binary_length, Some(64));
        assert_eq!(config.encryption.decrypt_function, "DECRYPT");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TESSERA_LOG_LEVEL", "DEBUG"),
            ("TESSERA_MAX_COLUMNS_PER_TABLE", "50"),
        ]
        .into_iter()
        .collect();
        let mut config = RewriteConfig::default();
        config
            .apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.partitioning.max_columns_per_table, 50);

        let mut config = RewriteConfig::default();
        let err = config
            .apply_overrides_from(|key| (key == "TESSERA_PARTITION_WATERMARK").then(|| "high".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("TESSERA_PARTITION_WATERMARK"));
    }
}
