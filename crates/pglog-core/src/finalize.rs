//! Cross-analyzer finalization.
//!
//! The SQL analyzer only ever learns about a query through a `duration:`
//! log line. Temp-file and lock events can reference a query identity that
//! never produced one (e.g. `log_min_duration_statement` was unset, or the
//! statement was still running when the log window ended), so
//! `sql_performance.queries` would otherwise be missing rows that
//! `temp_files.queries`/`locks.queries` point at by id. This pass adds a
//! zero-duration placeholder row for each such identity.

use std::collections::HashSet;

use crate::model::{Locks, SqlPerformance, SqlQueryRow, TempFiles};

pub fn collect_queries_without_duration(sql: &mut SqlPerformance, temp_files: &TempFiles, locks: &Locks) {
    let existing: HashSet<String> = sql.queries.iter().map(|q| q.id.clone()).collect();
    let mut seen = existing.clone();

    let candidates = temp_files
        .queries
        .iter()
        .map(|q| (q.id.clone(), q.normalized_query.clone()))
        .chain(locks.queries.iter().map(|q| (q.id.clone(), q.normalized_query.clone())));

    for (id, normalized_query) in candidates {
        if seen.insert(id.clone()) {
            sql.queries.push(SqlQueryRow {
                id,
                normalized_query,
                raw_query: String::new(),
                count: 0,
                total_time_ms: 0.0,
                avg_time_ms: 0.0,
                max_time_ms: 0.0,
                min_time_ms: 0.0,
            });
            sql.total_unique_queries += 1;
        }
    }
}
