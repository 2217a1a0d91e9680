//! Lock wait / acquisition / deadlock extraction.
//!
//! Built on the same active-state-table idiom as [`super::temp_files`], but
//! here the table survives across several log lines per lock: a
//! `(pid, lockType, resource)` triple moves from *waiting* to *acquired* (or
//! is abandoned mid-wait at end of input), and the query associated with it
//! may only become known *after* the triple is first seen — a `STATEMENT:`
//! line for that pid back-fills every currently-tracked lock of that pid
//! still missing a query, the same way [`super::temp_files`]'s PID cache
//! resolves Pattern B associations after the fact.

use std::collections::HashMap;

use crate::model::{LockEvent, LockQueryRow, Locks, LogEntry, QueryIdentity, Severity};
use crate::normalize::{is_transaction_control, IdentityCache};
use crate::util::extract_f64_after;

use super::Analyzer;

struct ActiveLock {
    pid: String,
    last_wait_ms: f64,
    acquired: bool,
    query: Option<QueryIdentity>,
}

#[derive(Default)]
pub struct LocksAnalyzer {
    last_query_by_pid: HashMap<String, QueryIdentity>,
    active: HashMap<String, ActiveLock>,
    deadlock_events: u64,
    waiting_events: u64,
    acquired_events: u64,
    lock_type_stats: HashMap<String, u64>,
    resource_type_stats: HashMap<String, u64>,
    events: Vec<LockEvent>,
    identities: IdentityCache,
}

impl LocksAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analyzer for LocksAnalyzer {
    type Output = Locks;

    fn process(&mut self, entry: &LogEntry) {
        let msg = &entry.message_bytes;

        if let Some(stmt) = extract_statement(msg) {
            if !is_transaction_control(stmt) {
                let identity = self.identities.get_or_compute(stmt);
                self.last_query_by_pid
                    .insert(entry.process_id.clone(), identity.clone());
                for lock in self.active.values_mut() {
                    if lock.pid == entry.process_id && lock.query.is_none() {
                        lock.query = Some(identity.clone());
                    }
                }
            }
        }

        if entry.severity == Severity::Error && msg.contains("deadlock detected") {
            self.deadlock_events += 1;
            self.events.push(LockEvent {
                timestamp: crate::util::format_timestamp(entry.timestamp),
                kind: "deadlock".to_string(),
                pid: entry.process_id.clone(),
                lock_type: String::new(),
                resource: String::new(),
                wait_time_ms: 0.0,
            });
            return;
        }

        if entry.severity != Severity::Log {
            return;
        }

        let (kind, marker) = if msg.contains("still waiting for") {
            ("waiting", "still waiting for ")
        } else if msg.starts_with("process ") && msg.contains("acquired") {
            ("acquired", "acquired ")
        } else {
            return;
        };

        let Some((lock_type, resource)) = extract_lock_and_resource(msg, marker) else {
            return;
        };
        let wait_time_ms = extract_f64_after(msg, "after ").unwrap_or(0.0);

        match kind {
            "waiting" => self.waiting_events += 1,
            "acquired" => self.acquired_events += 1,
            _ => unreachable!(),
        }
        *self.lock_type_stats.entry(lock_type.clone()).or_insert(0) += 1;
        *self
            .resource_type_stats
            .entry(classify_resource(&resource))
            .or_insert(0) += 1;

        let key = format!("{}-{}-{}", entry.process_id, lock_type, resource);
        let cached_query = self.last_query_by_pid.get(&entry.process_id).cloned();
        let active = self.active.entry(key).or_insert_with(|| ActiveLock {
            pid: entry.process_id.clone(),
            last_wait_ms: 0.0,
            acquired: false,
            query: cached_query.clone(),
        });
        active.last_wait_ms = wait_time_ms;
        if kind == "acquired" {
            active.acquired = true;
        }
        if active.query.is_none() {
            active.query = cached_query;
        }

        self.events.push(LockEvent {
            timestamp: crate::util::format_timestamp(entry.timestamp),
            kind: kind.to_string(),
            pid: entry.process_id.clone(),
            lock_type,
            resource,
            wait_time_ms,
        });
    }

    fn finalize(self) -> Self::Output {
        let mut total_wait_time_ms = 0.0;
        let mut resolved_count = 0u64;
        let mut query_stats: HashMap<String, (String, u64, u64, f64)> = HashMap::new();

        for lock in self.active.values() {
            if lock.acquired {
                total_wait_time_ms += lock.last_wait_ms;
                resolved_count += 1;
            }
            if let Some(identity) = &lock.query {
                let rec = query_stats
                    .entry(identity.short_id.clone())
                    .or_insert_with(|| (identity.normalized.clone(), 0, 0, 0.0));
                if lock.acquired {
                    rec.1 += 1;
                } else {
                    rec.2 += 1;
                }
                rec.3 += lock.last_wait_ms;
            }
        }

        let avg_wait_time_ms = if resolved_count == 0 {
            0.0
        } else {
            total_wait_time_ms / resolved_count as f64
        };

        let queries = query_stats
            .into_iter()
            .map(|(id, (normalized_query, acquired, waiting, total_wait))| LockQueryRow {
                id,
                normalized_query,
                acquired_count: acquired,
                still_waiting_count: waiting,
                total_wait_time_ms: total_wait,
            })
            .collect();

        Locks {
            deadlock_events: self.deadlock_events,
            waiting_events: self.waiting_events,
            acquired_events: self.acquired_events,
            total_wait_time_ms,
            avg_wait_time_ms,
            lock_type_stats: self.lock_type_stats,
            resource_type_stats: self.resource_type_stats,
            events: self.events,
            queries,
        }
    }
}

/// Extract the query text following a `STATEMENT:`/`statement:` marker,
/// wherever it appears in the message (folded continuation or companion
/// logging line).
fn extract_statement(msg: &str) -> Option<&str> {
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

/// Classify a lock's resource string into its coarse kind by leading word(s):
/// `relation | transaction | advisory lock | tuple | page | extend | <first token>`.
fn classify_resource(resource: &str) -> String {
    if let Some(rest) = resource.strip_prefix("advisory lock") {
        let _ = rest;
        return "advisory lock".to_string();
    }
    for kind in ["relation", "transaction", "tuple", "page", "extend"] {
        if resource.starts_with(kind) {
            return kind.to_string();
        }
    }
    resource
        .split_whitespace()
        .next()
        .unwrap_or(resource)
        .to_string()
}

fn extract_lock_and_resource(msg: &str, marker: &str) -> Option<(String, String)> {
    let pos = msg.find(marker)? + marker.len();
    let rest = &msg[pos..];
    let on_pos = rest.find(" on ")?;
    let lock_type = rest[..on_pos].trim().to_string();
    let after_on = &rest[on_pos + 4..];
    let end = after_on.find(" after ").unwrap_or(after_on.len());
    let resource = after_on[..end].trim().to_string();
    Some((lock_type, resource))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(pid: &str, severity: Severity, message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            severity,
            process_id: pid.to_string(),
            database: None,
            user: None,
            application: None,
            host: None,
            sqlstate: String::new(),
            message_bytes: message.to_string(),
            is_continuation: false,
        }
    }

    fn log_entry(pid: &str, message: &str) -> LogEntry {
        entry(pid, Severity::Log, message)
    }

    #[test]
    fn test_waiting_then_acquired() {
        let mut a = LocksAnalyzer::new();
        a.process(&log_entry(
            "1",
            "process 1 still waiting for ExclusiveLock on relation 5678 of database 16384 after 500.000 ms",
        ));
        a.process(&log_entry(
            "1",
            "process 1 acquired ExclusiveLock on relation 5678 of database 16384 after 1200.000 ms",
        ));
        let out = a.finalize();
        assert_eq!(out.waiting_events, 1);
        assert_eq!(out.acquired_events, 1);
        assert_eq!(out.lock_type_stats["ExclusiveLock"], 2);
        assert_eq!(out.total_wait_time_ms, 1200.0);
    }

    #[test]
    fn test_deadlock_detected_at_error_severity() {
        let mut a = LocksAnalyzer::new();
        a.process(&entry("2", Severity::Error, "deadlock detected"));
        let out = a.finalize();
        assert_eq!(out.deadlock_events, 1);
        assert_eq!(out.waiting_events, 0);
        assert_eq!(out.acquired_events, 0);
        assert_eq!(out.total_wait_time_ms, 0.0);
    }

    #[test]
    fn test_scenario_s3_two_waits_then_acquired_no_double_count() {
        let mut a = LocksAnalyzer::new();
        a.process(&log_entry(
            "9",
            "process 9 still waiting for ShareLock on transaction 100 after 1000.0 ms",
        ));
        a.process(&log_entry(
            "9",
            "process 9 still waiting for ShareLock on transaction 100 after 2000.0 ms",
        ));
        // The format parser folds a trailing STATEMENT continuation onto the
        // same entry as the acquired line that precedes it in the log.
        a.process(&log_entry(
            "9",
            "process 9 acquired ShareLock on transaction 100 after 2500.0 ms\nSTATEMENT:  update x set v=? where id=?",
        ));
        let out = a.finalize();
        assert_eq!(out.waiting_events, 2);
        assert_eq!(out.acquired_events, 1);
        assert_eq!(out.total_wait_time_ms, 2500.0);
        assert_eq!(out.queries.len(), 1);
        assert_eq!(out.queries[0].acquired_count, 1);
        assert_eq!(out.queries[0].still_waiting_count, 0);
        assert_eq!(out.queries[0].total_wait_time_ms, 2500.0);
    }

    #[test]
    fn test_statement_backfills_earlier_pending_wait() {
        // STATEMENT arrives on its own later line, still before the lock is
        // acquired: the active-lock entry must pick up the query retroactively.
        let mut a = LocksAnalyzer::new();
        a.process(&log_entry(
            "3",
            "process 3 still waiting for ShareLock on transaction 42 after 100.0 ms",
        ));
        a.process(&log_entry("3", "statement: select pg_sleep(10)"));
        a.process(&log_entry(
            "3",
            "process 3 acquired ShareLock on transaction 42 after 300.0 ms",
        ));
        let out = a.finalize();
        assert_eq!(out.queries.len(), 1);
        assert_eq!(out.queries[0].acquired_count, 1);
        assert_eq!(out.queries[0].total_wait_time_ms, 300.0);
    }

    #[test]
    fn test_resource_type_classification() {
        let mut a = LocksAnalyzer::new();
        a.process(&log_entry(
            "1",
            "process 1 acquired ExclusiveLock on relation 5678 of database 16384 after 1.0 ms",
        ));
        a.process(&log_entry(
            "2",
            "process 2 acquired ShareLock on advisory lock [16384,5432] after 1.0 ms",
        ));
        a.process(&log_entry(
            "3",
            "process 3 acquired ShareLock on transaction 100 after 1.0 ms",
        ));
        let out = a.finalize();
        assert_eq!(out.resource_type_stats["relation"], 1);
        assert_eq!(out.resource_type_stats["advisory lock"], 1);
        assert_eq!(out.resource_type_stats["transaction"], 1);
    }

    #[test]
    fn test_transaction_control_not_cached_or_associated() {
        let mut a = LocksAnalyzer::new();
        a.process(&log_entry(
            "4",
            "process 4 still waiting for ShareLock on transaction 7 after 50.0 ms",
        ));
        a.process(&log_entry("4", "statement: COMMIT"));
        a.process(&log_entry(
            "4",
            "process 4 acquired ShareLock on transaction 7 after 75.0 ms",
        ));
        let out = a.finalize();
        assert!(out.queries.is_empty());
    }

    #[test]
    fn test_unresolved_wait_excluded_from_global_total() {
        let mut a = LocksAnalyzer::new();
        a.process(&log_entry(
            "5",
            "process 5 still waiting for ShareLock on transaction 1 after 9999.0 ms",
        ));
        let out = a.finalize();
        assert_eq!(out.waiting_events, 1);
        assert_eq!(out.acquired_events, 0);
        assert_eq!(out.total_wait_time_ms, 0.0);
    }
}
