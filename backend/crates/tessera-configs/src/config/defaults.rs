// Default value functions

pub fn default_max_columns_per_table() -> usize {
    1017 // InnoDB hard limit
}

pub fn default_watermark() -> f64 {
    0.8
}

pub fn default_link_column() -> String {
    "$_ext_id".to_string()
}

pub fn default_extension_alias_prefix() -> String {
    "$ext_".to_string()
}

pub fn default_extension_table_suffix() -> String {
    "$ext".to_string()
}

pub fn default_derived_alias_prefix() -> String {
    "$sub_".to_string()
}

pub fn default_encrypt_function() -> String {
    "ENCRYPT".to_string()
}

pub fn default_decrypt_function() -> String {
    "DECRYPT".to_string()
}

pub fn default_temp_column_suffix() -> String {
    "$enc_tmp".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}
