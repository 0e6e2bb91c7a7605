//! Redaction of secrets in SQL text before it reaches a log sink.

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTED: &str = "'[REDACTED]'";

static ENCRYPTION_CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:ENCRYPT|DECRYPT)\s*\(").unwrap());

static KEY_ATTRIBUTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(key\s*=\s*)'(?:[^'\\]|\\.|'')*'").unwrap());

/// Replaces encryption keys in SQL text with `'[REDACTED]'`.
///
/// Covers the trailing string-literal argument of every `ENCRYPT(...)` and
/// `DECRYPT(...)` call, of calls to `functions` (configured cipher function
/// names such as `AES_DECRYPT`), and `key = '...'` attribute values.
pub fn redact_sensitive_sql(sql: &str, functions: &[&str]) -> String {
    if functions.is_empty() {
        return redact_keys(sql, &ENCRYPTION_CALL_RE);
    }
    let names: Vec<String> = ["ENCRYPT", "DECRYPT"]
        .iter()
        .chain(functions)
        .map(|name| regex::escape(name))
        .collect();
    match Regex::new(&format!(r"(?i)\b(?:{})\s*\(", names.join("|"))) {
        Ok(calls) => redact_keys(sql, &calls),
        Err(e) => {
            log::warn!("Invalid cipher function name in redaction pattern: {}", e);
            redact_keys(sql, &ENCRYPTION_CALL_RE)
        }
    }
}

fn redact_keys(sql: &str, calls: &Regex) -> String {
    let redacted = redact_call_keys(sql, calls);
    KEY_ATTRIBUTE_RE
        .replace_all(&redacted, format!("${{1}}{}", REDACTED).as_str())
        .into_owned()
}

fn redact_call_keys(sql: &str, calls: &Regex) -> String {
    let mut ranges = Vec::new();
    for call in calls.find_iter(sql) {
        if let Some(range) = last_literal_argument(sql, call.end()) {
            ranges.push(range);
        }
    }
    if ranges.is_empty() {
        return sql.to_string();
    }

    // Nested calls can report the same literal twice.
    ranges.sort_unstable();
    ranges.dedup();

    let mut out = String::with_capacity(sql.len());
    let mut cursor = 0;
    for (start, end) in ranges {
        if start < cursor {
            continue;
        }
        out.push_str(&sql[cursor..start]);
        out.push_str(REDACTED);
        cursor = end;
    }
    out.push_str(&sql[cursor..]);
    out
}

/// Byte range of the call's last argument when it is a single string literal.
/// `args_start` points just past the opening parenthesis.
fn last_literal_argument(sql: &str, args_start: usize) -> Option<(usize, usize)> {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut last_arg_start = args_start;
    let mut i = args_start;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => i = skip_quoted(bytes, i)?,
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' if depth == 0 => {
                if last_arg_start == args_start {
                    return None;
                }
                let arg = &sql[last_arg_start..i];
                let lead = arg.len() - arg.trim_start().len();
                let start = last_arg_start + lead;
                let end = start + arg.trim().len();
                if bytes.get(start) == Some(&b'\'') && skip_quoted(bytes, start) == Some(end) {
                    return Some((start, end));
                }
                return None;
            }
            b')' => {
                depth -= 1;
                i += 1;
            }
            b',' if depth == 0 => {
                last_arg_start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Returns the index just past the quoted token starting at `start`.
fn skip_quoted(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == b'\\' && quote != b'`' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_decrypt_key() {
        let sql = "SELECT DECRYPT(t1.ssn, 's3cr3t') AS ssn FROM t1";
        let redacted = redact_sensitive_sql(sql, &[]);
        assert_eq!(redacted, "SELECT DECRYPT(t1.ssn, '[REDACTED]') AS ssn FROM t1");
    }

    #[test]
    fn test_redacts_nested_calls() {
        let sql = "UPDATE t SET c = ENCRYPT(CONCAT(a, 'x'), 'k1') WHERE d = DECRYPT(e, 'it''s')";
        let redacted = redact_sensitive_sql(sql, &[]);
        assert!(!redacted.contains("k1"));
        assert!(!redacted.contains("it''s"));
        assert!(redacted.contains("CONCAT(a, 'x')"));
        assert_eq!(redacted.matches("[REDACTED]").count(), 2);
    }

    #[test]
    fn test_redacts_key_attribute() {
        let sql = "/*+ key='abc' */ SELECT 1";
        assert_eq!(redact_sensitive_sql(sql, &[]), "/*+ key='[REDACTED]' */ SELECT 1");
    }

    #[test]
    fn test_redacts_configured_function_names() {
        let sql = "SELECT AES_DECRYPT(ssn, 'topsecret') AS ssn FROM people WHERE ssn = AES_ENCRYPT('1', 'topsecret')";
        let redacted = redact_sensitive_sql(sql, &["AES_ENCRYPT", "AES_DECRYPT"]);
        assert!(!redacted.contains("topsecret"));
        assert_eq!(
            redacted,
            "SELECT AES_DECRYPT(ssn, '[REDACTED]') AS ssn FROM people WHERE ssn = AES_ENCRYPT('1', '[REDACTED]')"
        );

        // Built-in names stay covered
        assert_eq!(
            redact_sensitive_sql("SELECT DECRYPT(a, 'k') FROM t", &["AES_DECRYPT"]),
            "SELECT DECRYPT(a, '[REDACTED]') FROM t"
        );
    }

    #[test]
    fn test_preserves_safe_queries() {
        let sql = "SELECT * FROM users WHERE name = 'alice'";
        assert_eq!(redact_sensitive_sql(sql, &[]), sql);

        let sql = "SELECT ENCRYPT(a) FROM t";
        assert_eq!(redact_sensitive_sql(sql, &[]), sql);
    }
}
