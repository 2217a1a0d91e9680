//! SQL normalization and query identity generation.
//!
//! A single left-to-right character scan with hand-rolled quote matching —
//! no `regex` dependency — canonicalizes literals and identifiers so that
//! statements differing only in their parameter values collapse to one
//! normalized form.

use std::collections::HashMap;

use base64::Engine;
use xxhash_rust::xxh3::xxh3_128;

use crate::model::QueryIdentity;

/// Canonicalize a raw SQL statement
pub fn normalize_sql(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let bytes: Vec<char> = raw.chars().collect();
    let mut i = 0usize;
    let mut last_was_space = false;

    while i < bytes.len() {
        let c = bytes[i];

        match c {
            '\'' => {
                // Single-quoted literal, '' is an escaped quote.
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == '\'' {
                        if i + 1 < bytes.len() && bytes[i + 1] == '\'' {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                out.push('?');
                last_was_space = false;
            }
            '"' => {
                // Double-quoted identifier, preserved but lower-cased.
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() {
                    if bytes[j] == '"' {
                        if j + 1 < bytes.len() && bytes[j + 1] == '"' {
                            j += 2;
                            continue;
                        }
                        break;
                    }
                    j += 1;
                }
                out.push('"');
                for &ch in &bytes[start..j.min(bytes.len())] {
                    out.extend(ch.to_lowercase());
                }
                out.push('"');
                i = (j + 1).min(bytes.len());
                last_was_space = false;
            }
            '$' if i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() => {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                out.push('?');
                last_was_space = false;
            }
            c if c.is_whitespace() => {
                if !last_was_space {
                    out.push(' ');
                    last_was_space = true;
                }
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_alphanumeric() || bytes[i] == '_') {
                    i += 1;
                }
                let token: String = bytes[start..i].iter().collect::<String>().to_lowercase();
                if let Some(replaced) = replace_temp_table(&token) {
                    out.push_str(&replaced);
                } else {
                    out.push_str(&token);
                }
                last_was_space = false;
            }
            '-' if i + 1 < bytes.len()
                && bytes[i + 1].is_ascii_digit()
                && !ends_with_identifier_char(&out) =>
            {
                i += 1;
                i = consume_number(&bytes, i);
                out.push('?');
                last_was_space = false;
            }
            c if c.is_ascii_digit() && !ends_with_identifier_char(&out) => {
                i = consume_number(&bytes, i);
                out.push('?');
                last_was_space = false;
            }
            _ => {
                out.push(c);
                last_was_space = false;
                i += 1;
            }
        }
    }

    out.trim().to_string()
}

fn ends_with_identifier_char(s: &str) -> bool {
    matches!(s.chars().last(), Some(c) if c.is_alphanumeric() || c == '_')
}

fn consume_number(bytes: &[char], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == '.' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    i
}

/// `pg_(temp|toast)(_<digits>)+` → `pg_temp_?` / `pg_toast_?`.
fn replace_temp_table(lower_token: &str) -> Option<String> {
    for (kind, label) in [("pg_temp", "pg_temp_?"), ("pg_toast", "pg_toast_?")] {
        if let Some(rest) = lower_token.strip_prefix(kind) {
            if rest.is_empty() {
                continue;
            }
            let parts: Vec<&str> = rest.trim_start_matches('_').split('_').collect();
            if !parts.is_empty() && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
            {
                return Some(label.to_string());
            }
        }
    }
    None
}

/// Determine the `{se,in,up,de,co,mv,xx}-` type prefix from the first
/// non-comment, non-whitespace keyword of the *raw* query.
pub fn type_prefix(raw: &str) -> &'static str {
    let mut rest = raw;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("--") {
            match after.find('\n') {
                Some(nl) => {
                    rest = &after[nl + 1..];
                    continue;
                }
                None => return "xx-",
            }
        }
        if let Some(after) = trimmed.strip_prefix("/*") {
            match after.find("*/") {
                Some(end) => {
                    rest = &after[end + 2..];
                    continue;
                }
                None => return "xx-",
            }
        }
        rest = trimmed;
        break;
    }

    let end = rest
        .find(|c: char| !c.is_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    match rest[..end].to_ascii_uppercase().as_str() {
        "SELECT" => "se-",
        "INSERT" => "in-",
        "UPDATE" => "up-",
        "DELETE" => "de-",
        "COPY" => "co-",
        "REFRESH" => "mv-",
        _ => "xx-",
    }
}

/// Compute the full `QueryIdentity` for a raw statement.
pub fn compute_identity(raw: &str) -> QueryIdentity {
    let normalized = normalize_sql(raw);
    let hash = xxh3_128(normalized.as_bytes());
    let full_hash = format!("{:032x}", hash);
    let prefix = type_prefix(raw);
    let b64 = base64::engine::general_purpose::STANDARD.encode(hash.to_be_bytes());
    let cleaned: String = b64.chars().filter(|c| *c != '+' && *c != '/' && *c != '=').collect();
    let tail: String = cleaned.chars().take(6).collect();
    let short_id = format!("{prefix}{tail}");
    QueryIdentity {
        normalized,
        full_hash,
        short_id,
    }
}

/// Per-analyzer cache mapping raw query text to its computed identity, so
/// that the same statement seen repeatedly (e.g. referenced by many temp-file
/// or lock events) is normalized exactly once.
#[derive(Default)]
pub struct IdentityCache {
    cache: HashMap<String, QueryIdentity>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&mut self, raw: &str) -> QueryIdentity {
        if let Some(existing) = self.cache.get(raw) {
            return existing.clone();
        }
        let identity = compute_identity(raw);
        self.cache.insert(raw.to_string(), identity.clone());
        identity
    }
}

/// Is this raw query text a transaction-control command?
pub fn is_transaction_control(raw: &str) -> bool {
    let trimmed = raw.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_alphanumeric())
        .unwrap_or(trimmed.len());
    matches!(
        trimmed[..end].to_ascii_uppercase().as_str(),
        "BEGIN" | "COMMIT" | "ROLLBACK" | "START" | "END"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_single_quote() {
        assert_eq!(
            normalize_sql("select * from t where name = 'bob'"),
            "select * from t where name = ?"
        );
    }

    #[test]
    fn test_normalize_doubled_single_quote_escape() {
        assert_eq!(
            normalize_sql("select 'it''s here'"),
            "select ?"
        );
    }

    #[test]
    fn test_normalize_double_quoted_identifier_lowercased() {
        assert_eq!(
            normalize_sql(r#"SELECT "Col1" FROM "MyTable""#),
            r#"select "col1" from "mytable""#
        );
    }

    #[test]
    fn test_normalize_whitespace_collapsed() {
        assert_eq!(normalize_sql("select   *\n\tfrom  t"), "select * from t");
    }

    #[test]
    fn test_normalize_dollar_param() {
        assert_eq!(
            normalize_sql("select * from t where id = $1"),
            "select * from t where id = ?"
        );
    }

    #[test]
    fn test_normalize_integer_literal() {
        assert_eq!(
            normalize_sql("select * from t where id = 1"),
            "select * from t where id = ?"
        );
    }

    #[test]
    fn test_normalize_signed_float_literal() {
        assert_eq!(
            normalize_sql("update t set v = -3.5 where id = 2"),
            "update t set v = ? where id = ?"
        );
    }

    #[test]
    fn test_normalize_identifier_with_digits_not_touched() {
        // "t1" stays a single identifier token, not split into "t" + "?".
        assert_eq!(normalize_sql("select * from t1"), "select * from t1");
    }

    #[test]
    fn test_normalize_pg_temp_table() {
        assert_eq!(
            normalize_sql("select * from pg_temp_16.foo"),
            "select * from pg_temp_?.foo"
        );
        assert_eq!(
            normalize_sql("select * from pg_toast.pg_toast_12345"),
            "select * from pg_toast.pg_toast_?"
        );
    }

    #[test]
    fn test_normalize_idempotent() {
        let q = "SELECT * FROM t WHERE id = 1 AND name = 'bob'";
        let once = normalize_sql(q);
        let twice = normalize_sql(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_type_prefix_basic() {
        assert_eq!(type_prefix("select 1"), "se-");
        assert_eq!(type_prefix("INSERT INTO t VALUES (1)"), "in-");
        assert_eq!(type_prefix("update t set a=1"), "up-");
        assert_eq!(type_prefix("delete from t"), "de-");
        assert_eq!(type_prefix("copy t to stdout"), "co-");
        assert_eq!(type_prefix("refresh materialized view v"), "mv-");
        assert_eq!(type_prefix("vacuum t"), "xx-");
    }

    #[test]
    fn test_type_prefix_survives_comments() {
        assert_eq!(type_prefix("-- a comment\nselect 1"), "se-");
        assert_eq!(type_prefix("/* block */ select 1"), "se-");
        assert_eq!(type_prefix("/* multi\nline */ -- x\nupdate t set a=1"), "up-");
    }

    #[test]
    fn test_compute_identity_stable() {
        let a = compute_identity("select * from t where id = 1");
        let b = compute_identity("select * from t where id = 2");
        assert_eq!(a.normalized, b.normalized);
        assert_eq!(a.full_hash, b.full_hash);
        assert_eq!(a.short_id, b.short_id);
        assert!(a.short_id.starts_with("se-"));
        assert_eq!(a.full_hash.len(), 32);
    }

    #[test]
    fn test_identity_cache_reuses() {
        let mut cache = IdentityCache::new();
        let a = cache.get_or_compute("select 1");
        let b = cache.get_or_compute("select 1");
        assert_eq!(a, b);
        assert_eq!(cache.cache.len(), 1);
    }

    #[test]
    fn test_is_transaction_control() {
        assert!(is_transaction_control("BEGIN"));
        assert!(is_transaction_control("commit"));
        assert!(!is_transaction_control("select 1"));
    }
}
