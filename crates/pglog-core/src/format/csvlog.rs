//! PostgreSQL `csvlog` format parser.
//!
//! A quoted field may itself contain a literal newline (a multi-line
//! `query` or `context` column), so physical lines are accumulated until
//! quotes balance before an RFC4180 split. The
//! `detail`/`hint`/`internal_query`/`context`/`query` sub-fields are folded
//! into `message_bytes` the same way stderr continuation lines are, rather
//! than discarded.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::model::{LogEntry, Severity};

use super::LineParser;

/// csvlog column order, PostgreSQL 13+ (the 23-column layout; the
/// `backend_type`/`leader_pid`/`query_id` columns some newer builds append
/// are ignored if present).
mod col {
    pub const LOG_TIME: usize = 0;
    pub const USER_NAME: usize = 1;
    pub const DATABASE_NAME: usize = 2;
    pub const PROCESS_ID: usize = 3;
    pub const CONNECTION_FROM: usize = 4;
    pub const ERROR_SEVERITY: usize = 11;
    pub const SQL_STATE_CODE: usize = 12;
    pub const MESSAGE: usize = 13;
    pub const DETAIL: usize = 14;
    pub const HINT: usize = 15;
    pub const INTERNAL_QUERY: usize = 16;
    pub const CONTEXT: usize = 18;
    pub const QUERY: usize = 19;
    pub const APPLICATION_NAME: usize = 22;
}

#[derive(Default)]
pub struct CsvlogParser {
    pending_raw: String,
}

impl CsvlogParser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LineParser for CsvlogParser {
    fn feed(&mut self, line: &str) -> Option<LogEntry> {
        if line.trim().is_empty() && self.pending_raw.is_empty() {
            return None;
        }
        if !self.pending_raw.is_empty() {
            self.pending_raw.push('\n');
        }
        self.pending_raw.push_str(line);

        if count_quotes(&self.pending_raw) % 2 != 0 {
            return None; // unbalanced quotes, more physical lines to come
        }
        let raw = std::mem::take(&mut self.pending_raw);
        parse_record(&raw)
    }

    fn finish(&mut self) -> Option<LogEntry> {
        if self.pending_raw.is_empty() {
            None
        } else {
            let raw = std::mem::take(&mut self.pending_raw);
            parse_record(&raw)
        }
    }
}

fn count_quotes(s: &str) -> usize {
    s.chars().filter(|&c| c == '"').count()
}

fn parse_record(raw: &str) -> Option<LogEntry> {
    let fields = split_csv_line(raw);
    let get = |i: usize| fields.get(i).map(|s| s.as_str()).unwrap_or("");

    let timestamp = parse_csv_timestamp(get(col::LOG_TIME))?;
    let (severity, _) = Severity::parse_prefix(get(col::ERROR_SEVERITY))?;

    let mut message = get(col::MESSAGE).to_string();
    for (label, idx) in [
        ("DETAIL", col::DETAIL),
        ("HINT", col::HINT),
        ("INTERNAL QUERY", col::INTERNAL_QUERY),
        ("CONTEXT", col::CONTEXT),
        ("STATEMENT", col::QUERY),
    ] {
        let value = get(idx);
        if !value.is_empty() {
            message.push('\n');
            message.push_str(label);
            message.push_str(":  ");
            message.push_str(value);
        }
    }

    let host = {
        let conn = get(col::CONNECTION_FROM);
        if conn.is_empty() {
            None
        } else {
            Some(conn.split(':').next().unwrap_or(conn).to_string())
        }
    };

    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

    Some(LogEntry {
        timestamp,
        severity,
        process_id: get(col::PROCESS_ID).to_string(),
        database: non_empty(get(col::DATABASE_NAME)),
        user: non_empty(get(col::USER_NAME)),
        application: non_empty(get(col::APPLICATION_NAME)),
        host,
        sqlstate: get(col::SQL_STATE_CODE).to_string(),
        message_bytes: message,
        is_continuation: false,
    })
}

fn parse_csv_timestamp(text: &str) -> Option<DateTime<Utc>> {
    for fmt in ["%Y-%m-%d %H:%M:%S%.f %Z", "%Y-%m-%d %H:%M:%S %Z"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
    }
    None
}

/// Split one (possibly multi-physical-line) logical CSV record into fields,
/// honoring RFC4180 `""`-doubled-quote escaping. Same scan shape as the
/// teacher's `split_csv_line`, generalized to accept embedded `\n`.
fn split_csv_line(raw: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = raw.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => fields.push(std::mem::take(&mut field)),
                _ => field.push(c),
            }
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_line() -> String {
        "\"2024-01-15 14:30:00.123 UTC\",\"appuser\",\"mydb\",\"12345\",\"10.0.0.1:5432\",\
         \"sess1\",\"1\",\"SELECT\",\"2024-01-15 14:29:00 UTC\",\"3/4\",\"0\",\"ERROR\",\
         \"42P01\",\"relation \"\"t\"\" does not exist\",\"\",\"\",\"\",\"\",\"\",\
         \"select * from t\",\"\",\"\",\"myapp\""
            .to_string()
    }

    #[test]
    fn test_parses_single_line_record() {
        let mut p = CsvlogParser::new();
        let entry = p.feed(&sample_line()).unwrap();
        assert_eq!(entry.severity, Severity::Error);
        assert_eq!(entry.process_id, "12345");
        assert_eq!(entry.database.as_deref(), Some("mydb"));
        assert_eq!(entry.user.as_deref(), Some("appuser"));
        assert_eq!(entry.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(entry.sqlstate, "42P01");
        assert!(entry.message_bytes.contains("relation \"t\" does not exist"));
        assert!(entry.message_bytes.contains("STATEMENT:  select * from t"));
    }

    #[test]
    fn test_multiline_quoted_field_accumulates() {
        let mut p = CsvlogParser::new();
        // A record whose QUERY field embeds a literal newline, arriving as
        // two physical lines because the record's quotes don't balance yet.
        let first = "\"2024-01-15 14:30:00.123 UTC\",\"u\",\"d\",\"1\",\"\",\"s\",\"1\",\"\",\
                      \"\",\"\",\"\",\"LOG\",\"\",\"msg\",\"\",\"\",\"\",\"\",\"\",\"select\n";
        assert!(p.feed(first).is_none());
        let second = "  *\",\"\",\"\",\"\"";
        let entry = p.feed(second).unwrap();
        assert_eq!(entry.severity, Severity::Log);
        assert!(entry.message_bytes.contains("select\n  *"));
    }

    #[test]
    fn test_unknown_severity_is_dropped() {
        let mut p = CsvlogParser::new();
        let line = "\"2024-01-15 14:30:00.123 UTC\",\"\",\"\",\"1\",\"\",\"\",\"\",\"\",\"\",\
                     \"\",\"\",\"NOTASEVERITY\",\"\",\"msg\",\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"";
        assert!(p.feed(line).is_none());
    }

    #[test]
    fn test_unparseable_timestamp_drops_entry() {
        let mut p = CsvlogParser::new();
        let line = "\"not a timestamp\",\"\",\"\",\"1\",\"\",\"\",\"\",\"\",\"\",\
                     \"\",\"\",\"LOG\",\"\",\"msg\",\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"";
        assert!(p.feed(line).is_none());
    }
}
