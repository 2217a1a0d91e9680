//! Autovacuum / autoanalyze extraction.
//!
//! Converts `pages removed` into reclaimed bytes (`pages * 8192`,
//! PostgreSQL's fixed block size) in addition to the raw table/event counts.

use std::collections::HashMap;

use crate::model::{LogEntry, Maintenance, Severity};
use crate::util::extract_i64_after;

use super::Analyzer;

const PAGE_SIZE_BYTES: u64 = 8192;

#[derive(Default)]
pub struct VacuumAnalyzer {
    vacuum_count: u64,
    analyze_count: u64,
    vacuum_table_counts: HashMap<String, u64>,
    analyze_table_counts: HashMap<String, u64>,
    vacuum_space_recovered: HashMap<String, u64>,
}

impl VacuumAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analyzer for VacuumAnalyzer {
    type Output = Maintenance;

    fn process(&mut self, entry: &LogEntry) {
        if entry.severity != Severity::Log {
            return;
        }
        let msg = &entry.message_bytes;

        if let Some(table) = extract_table(msg, "automatic vacuum of table \"") {
            self.vacuum_count += 1;
            *self.vacuum_table_counts.entry(table.clone()).or_insert(0) += 1;
            if let Some(pages) = extract_i64_after(msg, "pages: ") {
                let bytes = (pages.max(0) as u64) * PAGE_SIZE_BYTES;
                *self.vacuum_space_recovered.entry(table).or_insert(0) += bytes;
            }
        } else if let Some(table) = extract_table(msg, "automatic analyze of table \"") {
            self.analyze_count += 1;
            *self.analyze_table_counts.entry(table).or_insert(0) += 1;
        }
    }

    fn finalize(self) -> Self::Output {
        Maintenance {
            vacuum_count: self.vacuum_count,
            analyze_count: self.analyze_count,
            vacuum_table_counts: self.vacuum_table_counts,
            analyze_table_counts: self.analyze_table_counts,
            vacuum_space_recovered: self.vacuum_space_recovered,
        }
    }
}

fn extract_table(text: &str, marker: &str) -> Option<String> {
    let pos = text.find(marker)? + marker.len();
    let rest = &text[pos..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}
