//! Connection/session lifecycle tracking.
//!
//! Pairs each `connection received:` message with its eventual
//! `disconnection: session time: ...` line using a `pid -> start_time`
//! map, so that interleaved/concurrent sessions from different backends
//! pair correctly regardless of connect/disconnect order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{ConnectionMetrics, LogEntry, Severity, SessionEvent, SessionStats};
use crate::util::parse_session_duration_ms;

use super::Analyzer;

#[derive(Default)]
pub struct ConnectionsAnalyzer {
    connection_count: u64,
    disconnection_count: u64,
    active_since: HashMap<String, DateTime<Utc>>,
    peak_concurrent: u64,
    durations_ms: Vec<f64>,
    session_events: Vec<SessionEvent>,
    session_distribution: HashMap<String, u64>,
    sessions_by_user: HashMap<String, (u64, f64)>,
    sessions_by_database: HashMap<String, (u64, f64)>,
    sessions_by_host: HashMap<String, (u64, f64)>,
    min_ts: Option<DateTime<Utc>>,
    max_ts: Option<DateTime<Utc>>,
}

impl ConnectionsAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analyzer for ConnectionsAnalyzer {
    type Output = ConnectionMetrics;

    fn process(&mut self, entry: &LogEntry) {
        self.min_ts = Some(self.min_ts.map_or(entry.timestamp, |t| t.min(entry.timestamp)));
        self.max_ts = Some(self.max_ts.map_or(entry.timestamp, |t| t.max(entry.timestamp)));

        if entry.severity != Severity::Log {
            return;
        }
        let msg = &entry.message_bytes;

        if msg.starts_with("connection received:") {
            self.connection_count += 1;
            self.active_since.insert(entry.process_id.clone(), entry.timestamp);
            self.peak_concurrent = self.peak_concurrent.max(self.active_since.len() as u64);
            return;
        }

        if let Some(rest) = msg.strip_prefix("disconnection: ") {
            self.disconnection_count += 1;
            if let Some(start) = self.active_since.remove(&entry.process_id) {
                self.session_events.push(SessionEvent {
                    s: crate::util::format_timestamp(start),
                    e: crate::util::format_timestamp(entry.timestamp),
                });
            }

            let duration_ms = rest
                .strip_prefix("session time: ")
                .and_then(|s| s.split_whitespace().next())
                .and_then(parse_session_duration_ms)
                .unwrap_or(0.0);
            self.durations_ms.push(duration_ms);
            self.session_distribution
                .entry(bucket_label(duration_ms))
                .and_modify(|c| *c += 1)
                .or_insert(1);

            if let Some(user) = field_value(rest, "user=") {
                accumulate(&mut self.sessions_by_user, user, duration_ms);
            }
            if let Some(db) = field_value(rest, "database=") {
                accumulate(&mut self.sessions_by_database, db, duration_ms);
            }
            if let Some(host) = entry.host.clone().or_else(|| field_value(rest, "host=")) {
                accumulate(&mut self.sessions_by_host, host, duration_ms);
            }
        }
    }

    fn finalize(self) -> Self::Output {
        let n = self.durations_ms.len();
        let avg = if n == 0 {
            0.0
        } else {
            self.durations_ms.iter().sum::<f64>() / n as f64
        };
        let mut sorted = self.durations_ms.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = crate::util::median_sorted(&sorted);

        let hours = match (self.min_ts, self.max_ts) {
            (Some(min), Some(max)) => {
                let secs = (max - min).num_seconds().max(0) as f64;
                (secs / 3600.0).max(1.0 / 3600.0)
            }
            _ => 1.0,
        };
        let avg_per_hour = self.connection_count as f64 / hours;

        let to_stats = |m: HashMap<String, (u64, f64)>| -> HashMap<String, SessionStats> {
            m.into_iter()
                .map(|(k, (count, total))| {
                    let avg = if count == 0 { 0.0 } else { total / count as f64 };
                    (
                        k,
                        SessionStats {
                            count,
                            total_duration_ms: total,
                            avg_duration_ms: avg,
                        },
                    )
                })
                .collect()
        };

        ConnectionMetrics {
            connection_count: self.connection_count,
            disconnection_count: self.disconnection_count,
            avg_session_time_ms: avg,
            median_session_time_ms: median,
            peak_concurrent_sessions: self.peak_concurrent,
            avg_connections_per_hour: avg_per_hour,
            session_events: self.session_events,
            session_distribution: self.session_distribution,
            sessions_by_user: to_stats(self.sessions_by_user),
            sessions_by_database: to_stats(self.sessions_by_database),
            sessions_by_host: to_stats(self.sessions_by_host),
        }
    }
}

fn accumulate(map: &mut HashMap<String, (u64, f64)>, key: String, duration_ms: f64) {
    let entry = map.entry(key).or_insert((0, 0.0));
    entry.0 += 1;
    entry.1 += duration_ms;
}

fn field_value(text: &str, marker: &str) -> Option<String> {
    let pos = text.find(marker)? + marker.len();
    let rest = &text[pos..];
    let end = rest.find([' ', ',']).unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

fn bucket_label(duration_ms: f64) -> String {
    if duration_ms < 1_000.0 {
        "<1s".to_string()
    } else if duration_ms < 10_000.0 {
        "1-10s".to_string()
    } else if duration_ms < 60_000.0 {
        "10-60s".to_string()
    } else if duration_ms < 600_000.0 {
        "1-10m".to_string()
    } else {
        ">10m".to_string()
    }
}
