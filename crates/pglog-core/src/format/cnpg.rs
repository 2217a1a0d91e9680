//! CloudNativePG JSON log format parser.
//!
//! CNPG's `postgres` logger wraps each raw csvlog record, untouched, inside
//! a `"record"` object on a structured-logging envelope (`level`/`ts`/
//! `logger`/`msg`). Detection already separated this from plain `jsonlog` by
//! the top-level `"logger"` key (see [`super::detect`]); this parser just
//! unwraps `record` and reuses csvlog's field names.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::model::{LogEntry, Severity};

use super::LineParser;

#[derive(Default)]
pub struct CnpgParser;

impl CnpgParser {
    pub fn new() -> Self {
        Self
    }
}

impl LineParser for CnpgParser {
    fn feed(&mut self, line: &str) -> Option<LogEntry> {
        if line.trim().is_empty() {
            return None;
        }
        let envelope: Value = serde_json::from_str(line).ok()?;
        let record = envelope.get("record")?;
        parse_record(record)
    }

    fn finish(&mut self) -> Option<LogEntry> {
        None
    }
}

fn parse_record(v: &Value) -> Option<LogEntry> {
    let str_field = |key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
    let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());

    let timestamp = str_field("log_time")
        .as_deref()
        .and_then(parse_cnpg_timestamp)?;

    let error_severity = str_field("error_severity")?;
    let (severity, _) = Severity::parse_prefix(&error_severity)?;

    let mut message = str_field("message").unwrap_or_default();
    for (label, key) in [
        ("DETAIL", "detail"),
        ("HINT", "hint"),
        ("INTERNAL QUERY", "internal_query"),
        ("CONTEXT", "context"),
        ("STATEMENT", "query"),
    ] {
        if let Some(value) = non_empty(str_field(key)) {
            message.push('\n');
            message.push_str(label);
            message.push_str(":  ");
            message.push_str(&value);
        }
    }

    let host = non_empty(str_field("connection_from"))
        .map(|c| c.split(':').next().unwrap_or(&c).to_string());

    Some(LogEntry {
        timestamp,
        severity,
        process_id: str_field("process_id").unwrap_or_default(),
        database: non_empty(str_field("database_name")),
        user: non_empty(str_field("user_name")),
        application: non_empty(str_field("application_name")),
        host,
        sqlstate: str_field("sql_state_code").unwrap_or_default(),
        message_bytes: message,
        is_continuation: false,
    })
}

fn parse_cnpg_timestamp(text: &str) -> Option<DateTime<Utc>> {
    for fmt in ["%Y-%m-%d %H:%M:%S%.f %Z", "%Y-%m-%d %H:%M:%S %Z"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
    }
    None
}
