//! Shared data model for the ingestion pipeline.
//!
//! [`LogEntry`] is the uniform record every format parser emits.
//! [`QueryIdentity`] is the stable value the SQL/lock/temp-file analyzers use
//! to group statistics by statement. [`AggregatedMetrics`] is
//! the single value the pipeline hands back to callers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// PostgreSQL log severity levels, most to least severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Panic,
    Fatal,
    Error,
    Warning,
    Notice,
    Log,
    Info,
    Debug,
}

impl Severity {
    /// Recognize a severity keyword at the start of a message. First match wins.
    pub fn parse_prefix(text: &str) -> Option<(Severity, usize)> {
        const TABLE: &[(&str, Severity)] = &[
            ("PANIC", Severity::Panic),
            ("FATAL", Severity::Fatal),
            ("ERROR", Severity::Error),
            ("WARNING", Severity::Warning),
            ("NOTICE", Severity::Notice),
            ("LOG", Severity::Log),
            ("INFO", Severity::Info),
            ("DEBUG", Severity::Debug),
        ];
        for &(kw, sev) in TABLE {
            if text.starts_with(kw) {
                return Some((sev, kw.len()));
            }
        }
        None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Panic => "PANIC",
            Severity::Fatal => "FATAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Log => "LOG",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }
}

/// One logical log message, after multi-line assembly.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub process_id: String,
    pub database: Option<String>,
    pub user: Option<String>,
    pub application: Option<String>,
    pub host: Option<String>,
    pub sqlstate: String,
    pub message_bytes: String,
    pub is_continuation: bool,
}

impl LogEntry {
    /// Folds a continuation line's text into this entry's message, in place.
    pub fn fold_continuation(&mut self, text: &str) {
        self.message_bytes.push('\n');
        self.message_bytes.push_str(text);
    }
}

/// Stable identity derived from a raw SQL statement.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryIdentity {
    pub normalized: String,
    pub full_hash: String,
    pub short_id: String,
}

// ---------------------------------------------------------------------------
// Output shape
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Meta {
    pub format: String,
    pub entries: u64,
    pub bytes: u64,
    pub parse_time_ms: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_logs: u64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub duration_secs: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventCount {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorClassCount {
    pub class_code: String,
    pub description: String,
    pub count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionEvent {
    pub s: String,
    pub e: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub count: u64,
    pub total_duration_ms: f64,
    pub avg_duration_ms: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub connection_count: u64,
    pub disconnection_count: u64,
    pub avg_session_time_ms: f64,
    pub median_session_time_ms: f64,
    pub peak_concurrent_sessions: u64,
    pub avg_connections_per_hour: f64,
    pub session_events: Vec<SessionEvent>,
    pub session_distribution: HashMap<String, u64>,
    pub sessions_by_user: HashMap<String, SessionStats>,
    pub sessions_by_database: HashMap<String, SessionStats>,
    pub sessions_by_host: HashMap<String, SessionStats>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqlQueryRow {
    pub id: String,
    pub normalized_query: String,
    pub raw_query: String,
    pub count: u64,
    pub total_time_ms: f64,
    pub avg_time_ms: f64,
    pub max_time_ms: f64,
    pub min_time_ms: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqlExecution {
    pub timestamp: String,
    pub duration_ms: f64,
    pub query_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SqlPerformance {
    pub total_queries_parsed: u64,
    pub total_unique_queries: u64,
    pub query_min_duration: f64,
    pub query_median_duration: f64,
    pub query_99th_percentile: f64,
    pub query_max_duration: f64,
    pub queries: Vec<SqlQueryRow>,
    pub executions: Vec<SqlExecution>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TempFileEvent {
    pub timestamp: String,
    pub size: u64,
    pub query_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TempFileQueryRow {
    pub id: String,
    pub normalized_query: String,
    pub count: u64,
    pub total_size: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TempFiles {
    pub total_messages: u64,
    pub total_size: String,
    pub avg_size: String,
    pub events: Vec<TempFileEvent>,
    pub queries: Vec<TempFileQueryRow>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockEvent {
    pub timestamp: String,
    pub kind: String,
    pub pid: String,
    pub lock_type: String,
    pub resource: String,
    pub wait_time_ms: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockQueryRow {
    pub id: String,
    pub normalized_query: String,
    pub acquired_count: u64,
    pub still_waiting_count: u64,
    pub total_wait_time_ms: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Locks {
    pub deadlock_events: u64,
    pub waiting_events: u64,
    pub acquired_events: u64,
    pub total_wait_time_ms: f64,
    pub avg_wait_time_ms: f64,
    pub lock_type_stats: HashMap<String, u64>,
    pub resource_type_stats: HashMap<String, u64>,
    pub events: Vec<LockEvent>,
    pub queries: Vec<LockQueryRow>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckpointTypeStat {
    pub count: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Checkpoints {
    pub total_checkpoints: u64,
    pub types: HashMap<String, CheckpointTypeStat>,
    pub avg_checkpoint_time_ms: f64,
    pub max_checkpoint_time_ms: f64,
    pub events: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Maintenance {
    pub vacuum_count: u64,
    pub analyze_count: u64,
    pub vacuum_table_counts: HashMap<String, u64>,
    pub analyze_table_counts: HashMap<String, u64>,
    pub vacuum_space_recovered: HashMap<String, u64>,
}

/// The finalized value returned to external collaborators.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub meta: Meta,
    pub summary: Summary,
    pub events: Vec<EventCount>,
    pub error_classes: Vec<ErrorClassCount>,
    pub databases: Vec<NamedCount>,
    pub users: Vec<NamedCount>,
    pub apps: Vec<NamedCount>,
    pub hosts: Vec<NamedCount>,
    pub connections: ConnectionMetrics,
    pub sql_performance: SqlPerformance,
    pub temp_files: TempFiles,
    pub locks: Locks,
    pub checkpoints: Checkpoints,
    pub maintenance: Maintenance,
}

pub const UNKNOWN: &str = "UNKNOWN";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse_prefix() {
        assert_eq!(
            Severity::parse_prefix("ERROR:  relation missing"),
            Some((Severity::Error, 5))
        );
        assert_eq!(
            Severity::parse_prefix("LOG:  checkpoint starting"),
            Some((Severity::Log, 3))
        );
        assert_eq!(Severity::parse_prefix("nothing here"), None);
    }

    #[test]
    fn test_fold_continuation() {
        let mut entry = LogEntry {
            timestamp: Utc::now(),
            severity: Severity::Error,
            process_id: "1".into(),
            database: None,
            user: None,
            application: None,
            host: None,
            sqlstate: String::new(),
            message_bytes: "first".into(),
            is_continuation: false,
        };
        entry.fold_continuation("STATEMENT:  select 1");
        assert_eq!(entry.message_bytes, "first\nSTATEMENT:  select 1");
    }
}
