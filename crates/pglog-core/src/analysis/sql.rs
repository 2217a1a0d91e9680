//! Query duration tracking and identity grouping.
//!
//! Per-identity statistics are built with [`IdentityCache`]; percentiles are
//! computed once at `finalize` over every recorded duration rather than
//! incrementally, deferring derived statistics to a final pass rather than
//! keeping a running percentile estimator.

use std::collections::HashMap;

use crate::model::{LogEntry, Severity, SqlExecution, SqlPerformance, SqlQueryRow};
use crate::normalize::{is_transaction_control, IdentityCache};
use crate::util::{extract_f64_after, median_sorted, p99_sorted};

use super::Analyzer;

struct QueryStats {
    normalized: String,
    raw_query: String,
    count: u64,
    total_time_ms: f64,
    min_time_ms: f64,
    max_time_ms: f64,
}

#[derive(Default)]
pub struct SqlAnalyzer {
    identities: IdentityCache,
    stats: HashMap<String, QueryStats>,
    executions: Vec<SqlExecution>,
    durations: Vec<f64>,
}

impl SqlAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analyzer for SqlAnalyzer {
    type Output = SqlPerformance;

    fn process(&mut self, entry: &LogEntry) {
        if entry.severity != Severity::Log {
            return;
        }
        let msg = &entry.message_bytes;
        if !msg.starts_with("duration: ") {
            return;
        }
        let Some(duration_ms) = extract_f64_after(msg, "duration: ") else {
            return;
        };
        let Some(raw_query) = extract_query_text(msg) else {
            return;
        };
        if is_transaction_control(raw_query) {
            return;
        }

        let identity = self.identities.get_or_compute(raw_query);
        self.durations.push(duration_ms);
        self.executions.push(SqlExecution {
            timestamp: crate::util::format_timestamp(entry.timestamp),
            duration_ms,
            query_id: identity.short_id.clone(),
        });

        let row = self.stats.entry(identity.short_id.clone()).or_insert_with(|| QueryStats {
            normalized: identity.normalized.clone(),
            raw_query: raw_query.to_string(),
            count: 0,
            total_time_ms: 0.0,
            min_time_ms: f64::MAX,
            max_time_ms: 0.0,
        });
        row.count += 1;
        row.total_time_ms += duration_ms;
        row.min_time_ms = row.min_time_ms.min(duration_ms);
        row.max_time_ms = row.max_time_ms.max(duration_ms);
    }

    fn finalize(self) -> Self::Output {
        let mut sorted = self.durations.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let queries = self
            .stats
            .into_iter()
            .map(|(id, s)| SqlQueryRow {
                id,
                normalized_query: s.normalized,
                raw_query: s.raw_query,
                count: s.count,
                total_time_ms: s.total_time_ms,
                avg_time_ms: s.total_time_ms / s.count as f64,
                max_time_ms: s.max_time_ms,
                min_time_ms: if s.count == 0 { 0.0 } else { s.min_time_ms },
            })
            .collect::<Vec<_>>();

        SqlPerformance {
            total_queries_parsed: self.durations.len() as u64,
            total_unique_queries: queries.len() as u64,
            query_min_duration: sorted.first().copied().unwrap_or(0.0),
            query_median_duration: median_sorted(&sorted),
            query_99th_percentile: p99_sorted(&sorted),
            query_max_duration: sorted.last().copied().unwrap_or(0.0),
            queries,
            executions: self.executions,
        }
    }
}

fn extract_query_text(msg: &str) -> Option<&str> {
    if let Some(pos) = msg.find("statement: ") {
        let rest = msg[pos + "statement: ".len()..].trim();
        return (!rest.is_empty()).then_some(rest);
    }
    if let Some(pos) = msg.find("execute ") {
        let after = &msg[pos + "execute ".len()..];
        if let Some(colon) = after.find(": ") {
            let rest = after[colon + 2..].trim();
            return (!rest.is_empty()).then_some(rest);
        }
    }
    None
}
