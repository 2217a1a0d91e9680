//! PostgreSQL `jsonlog` format parser.
//!
//! One JSON object per physical line; no continuation folding — PostgreSQL's
//! jsonlog emitter already embeds `detail`/`hint`/`context`/`statement` as
//! separate object fields on the same line. Parsed with `serde_json`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::model::{LogEntry, Severity};

use super::LineParser;

#[derive(Default)]
pub struct JsonlogParser;

impl JsonlogParser {
    pub fn new() -> Self {
        Self
    }
}

impl LineParser for JsonlogParser {
    fn feed(&mut self, line: &str) -> Option<LogEntry> {
        if line.trim().is_empty() {
            return None;
        }
        let value: Value = serde_json::from_str(line).ok()?;
        parse_value(&value)
    }

    fn finish(&mut self) -> Option<LogEntry> {
        None
    }
}

fn parse_value(v: &Value) -> Option<LogEntry> {
    let str_field = |key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
    let str_field_either = |primary: &str, alt: &str| str_field(primary).or_else(|| str_field(alt));

    let timestamp = v
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_json_timestamp)?;

    let error_severity = v.get("error_severity").and_then(Value::as_str)?;
    let (severity, _) = Severity::parse_prefix(error_severity)?;

    let pid = v
        .get("pid")
        .and_then(|p| p.as_i64().map(|n| n.to_string()).or_else(|| p.as_str().map(str::to_string)))
        .unwrap_or_default();

    let mut message = str_field("message").unwrap_or_default();
    for (label, key) in [
        ("DETAIL", "detail"),
        ("HINT", "hint"),
        ("INTERNAL QUERY", "internal_query"),
        ("CONTEXT", "context"),
        ("STATEMENT", "statement"),
    ] {
        if let Some(value) = str_field(key) {
            if !value.is_empty() {
                message.push('\n');
                message.push_str(label);
                message.push_str(":  ");
                message.push_str(&value);
            }
        }
    }

    let host = str_field_either("connection_from", "remote_host")
        .map(|h| h.split(':').next().unwrap_or(&h).to_string());

    Some(LogEntry {
        timestamp,
        severity,
        process_id: pid,
        database: str_field_either("database_name", "dbname"),
        user: str_field_either("user_name", "user"),
        application: str_field("application_name"),
        host,
        sqlstate: str_field("state_code").unwrap_or_default(),
        message_bytes: message,
        is_continuation: false,
    })
}

fn parse_json_timestamp(text: &str) -> Option<DateTime<Utc>> {
    for fmt in ["%Y-%m-%d %H:%M:%S%.f %Z", "%Y-%m-%d %H:%M:%S %Z"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_basic_object() {
        let mut p = JsonlogParser::new();
        let line = r#"{"timestamp":"2024-01-15 14:30:00.123 UTC","user":"appuser","dbname":"mydb","pid":1234,"remote_host":"10.0.0.1","application_name":"myapp","state_code":"42P01","error_severity":"ERROR","message":"relation \"t\" does not exist"}"#;
        let e = p.feed(line).unwrap();
        assert_eq!(e.severity, Severity::Error);
        assert_eq!(e.process_id, "1234");
        assert_eq!(e.database.as_deref(), Some("mydb"));
        assert_eq!(e.sqlstate, "42P01");
        assert_eq!(e.message_bytes, "relation \"t\" does not exist");
    }

    #[test]
    fn test_detail_and_statement_folded_into_message() {
        let mut p = JsonlogParser::new();
        let line = r#"{"timestamp":"2024-01-15 14:30:00 UTC","pid":1,"error_severity":"ERROR","message":"syntax error","detail":"extra info","statement":"select *"}"#;
        let e = p.feed(line).unwrap();
        assert!(e.message_bytes.contains("DETAIL:  extra info"));
        assert!(e.message_bytes.contains("STATEMENT:  select *"));
    }

    #[test]
    fn test_malformed_json_is_dropped() {
        let mut p = JsonlogParser::new();
        assert!(p.feed("not json at all").is_none());
    }

    #[test]
    fn test_unknown_severity_is_dropped() {
        let mut p = JsonlogParser::new();
        let line = r#"{"timestamp":"2024-01-15 14:30:00 UTC","pid":1,"error_severity":"WHAT","message":"x"}"#;
        assert!(p.feed(line).is_none());
    }

    #[test]
    fn test_unparseable_timestamp_drops_entry() {
        let mut p = JsonlogParser::new();
        let line = r#"{"timestamp":"not a timestamp","pid":1,"error_severity":"LOG","message":"x"}"#;
        assert!(p.feed(line).is_none());
    }

    #[test]
    fn test_accepts_spec_named_fields() {
        let mut p = JsonlogParser::new();
        let line = r#"{"timestamp":"2024-01-15 14:30:00 UTC","pid":1,"error_severity":"LOG","message":"x","database_name":"mydb","user_name":"appuser","connection_from":"10.0.0.1:5432"}"#;
        let e = p.feed(line).unwrap();
        assert_eq!(e.database.as_deref(), Some("mydb"));
        assert_eq!(e.user.as_deref(), Some("appuser"));
        assert_eq!(e.host.as_deref(), Some("10.0.0.1"));
    }
}
