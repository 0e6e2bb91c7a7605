use std::io::Write;

use tempfile::NamedTempFile;
use tessera_configs::RewriteConfig;

#[test]
fn test_load_full_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[partitioning]
max_columns_per_table = 64
watermark = 0.5
link_column = "__row_link"
extension_alias_prefix = "__x"
extension_table_suffix = "_part"
derived_alias_prefix = "__d"

[encryption]
encrypt_function = "AES_ENC"
decrypt_function = "AES_DEC"
temp_column_suffix = "_tmp"
default_binary_length = 256

[logging]
level = "debug"

[logging.targets]
sqlparser = "warn"
"#
    )
    .unwrap();

    let config = RewriteConfig::from_file(file.path()).unwrap();
    assert_eq!(config.partitioning.extension_capacity(), 32);
    assert_eq!(config.partitioning.link_column, "__row_link");
    assert_eq!(config.encryption.encrypt_function, "AES_ENC");
    assert_eq!(config.encryption.default_binary_length, Some(256));
    assert_eq!(config.logging.targets.get("sqlparser").map(String::as_str), Some("warn"));
    assert_eq!(config.logging.filter_directives(), "debug,sqlparser=warn");
}

#[test]
fn test_empty_file_yields_defaults() {
    let file = NamedTempFile::new().unwrap();
    let config = RewriteConfig::from_file(file.path()).unwrap();
    assert_eq!(config, RewriteConfig::default());
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = RewriteConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[partitioning]\nwatermark = 2.0\n").unwrap();
    let err = RewriteConfig::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("watermark"));
}
