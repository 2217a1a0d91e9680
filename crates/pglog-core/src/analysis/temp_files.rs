//! Temporary-file event extraction and query association.
//!
//! The hardest analyzer: a `temporary file:` LOG line rarely carries the
//! offending query itself. Two patterns associate one with the other,
//! keyed by backend process id the way an active-state table tracks any
//! other in-flight, per-connection event:
//!
//! - **Pattern A** — the query is folded into the *same* entry as a
//!   `STATEMENT:` continuation line (stderr/syslog formats fold
//!   continuations onto the entry that triggered them).
//! - **Pattern B** — no such continuation exists, so the last statement text
//!   this backend PID logged (from a `statement:`/`duration: ... statement:`
//!   line, present when `log_statement`/`log_min_duration_statement` are
//!   configured) is used instead.

use std::collections::HashMap;

use crate::model::{LogEntry, Severity, TempFileEvent, TempFileQueryRow, TempFiles};
use crate::normalize::{is_transaction_control, IdentityCache};
use crate::util::{extract_i64_after, format_size};

use super::Analyzer;

#[derive(Default)]
pub struct TempFilesAnalyzer {
    last_statement_by_pid: HashMap<String, String>,
    events: Vec<(String, u64, Option<String>)>,
    by_query: HashMap<String, (String, u64, u64)>, // short_id -> (normalized, count, total_size)
    identities: IdentityCache,
}

impl TempFilesAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analyzer for TempFilesAnalyzer {
    type Output = TempFiles;

    fn process(&mut self, entry: &LogEntry) {
        if entry.severity != Severity::Log {
            return;
        }
        let msg = &entry.message_bytes;

        if let Some(stmt) = extract_statement_marker(msg) {
            if !is_transaction_control(stmt) {
                self.last_statement_by_pid
                    .insert(entry.process_id.clone(), stmt.to_string());
            }
        }

        if !msg.starts_with("temporary file: ") {
            return;
        }
        let size = extract_i64_after(msg, "size ").unwrap_or(0).max(0) as u64;

        let raw_query = extract_statement_marker(msg)
            .filter(|stmt| !is_transaction_control(stmt))
            .map(str::to_string)
            .or_else(|| self.last_statement_by_pid.get(&entry.process_id).cloned());

        let query_id = raw_query.as_deref().map(|raw| {
            let identity = self.identities.get_or_compute(raw);
            let record = self
                .by_query
                .entry(identity.short_id.clone())
                .or_insert((identity.normalized.clone(), 0, 0));
            record.1 += 1;
            record.2 += size;
            identity.short_id
        });

        self.events
            .push((crate::util::format_timestamp(entry.timestamp), size, query_id));
    }

    fn finalize(self) -> Self::Output {
        let total_messages = self.events.len() as u64;
        let total_size: u64 = self.events.iter().map(|(_, size, _)| *size).sum();
        let avg_size = if total_messages == 0 {
            0
        } else {
            total_size / total_messages
        };

        let events = self
            .events
            .into_iter()
            .map(|(timestamp, size, query_id)| TempFileEvent {
                timestamp,
                size,
                query_id,
            })
            .collect();

        let mut queries: Vec<TempFileQueryRow> = self
            .by_query
            .into_iter()
            .map(|(id, (normalized_query, count, total_size))| TempFileQueryRow {
                id,
                normalized_query,
                count,
                total_size,
            })
            .collect();
        queries.sort_by(|a, b| b.total_size.cmp(&a.total_size));

        TempFiles {
            total_messages,
            total_size: format_size(total_size),
            avg_size: format_size(avg_size),
            events,
            queries,
        }
    }
}

/// Extract the query text following a `STATEMENT:`/`statement:` marker,
/// wherever it appears in the message (folded continuation or companion
/// logging line).
fn extract_statement_marker(msg: &str) -> Option<&str> {
    for marker in ["STATEMENT:  ", "statement: "] {
        if let Some(pos) = msg.find(marker) {
            let start = pos + marker.len();
            let rest = msg[start..].trim();
            if !rest.is_empty() {
                return Some(rest);
            }
        }
    }
    None
}
