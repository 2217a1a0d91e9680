//! Checkpoint start/complete pairing.
//!
//! Tracks "what kind of checkpoint is this completion for" with a single
//! last-seen-starting-type slot rather than matching starts to completions
//! by pid — checkpoints are a single global background-writer activity, so
//! there is never more than one in flight (see DESIGN.md).

use std::collections::HashMap;

use crate::model::{CheckpointTypeStat, Checkpoints, LogEntry, Severity};
use crate::util::extract_f64_after;

use super::Analyzer;

#[derive(Default)]
pub struct CheckpointsAnalyzer {
    last_starting_type: Option<String>,
    total: u64,
    types: HashMap<String, u64>,
    times_ms: Vec<f64>,
    events: Vec<String>,
}

impl CheckpointsAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analyzer for CheckpointsAnalyzer {
    type Output = Checkpoints;

    fn process(&mut self, entry: &LogEntry) {
        if entry.severity != Severity::Log {
            return;
        }
        let msg = &entry.message_bytes;

        if let Some(rest) = msg.strip_prefix("checkpoint starting: ") {
            self.last_starting_type = Some(rest.trim().to_string());
            return;
        }
        if msg.starts_with("checkpoint complete: ") {
            self.total += 1;
            let kind = self.last_starting_type.take().unwrap_or_else(|| "unknown".to_string());
            *self.types.entry(kind).or_insert(0) += 1;
            if let Some(seconds) = extract_f64_after(msg, "total=") {
                self.times_ms.push(seconds * 1000.0);
            }
            self.events.push(crate::util::format_timestamp(entry.timestamp));
        }
    }

    fn finalize(self) -> Self::Output {
        let avg = if self.times_ms.is_empty() {
            0.0
        } else {
            self.times_ms.iter().sum::<f64>() / self.times_ms.len() as f64
        };
        let max = self.times_ms.iter().cloned().fold(0.0, f64::max);
        Checkpoints {
            total_checkpoints: self.total,
            types: self
                .types
                .into_iter()
                .map(|(k, count)| (k, CheckpointTypeStat { count }))
                .collect(),
            avg_checkpoint_time_ms: avg,
            max_checkpoint_time_ms: max,
            events: self.events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            severity: Severity::Log,
            process_id: "1".into(),
            database: None,
            user: None,
            application: None,
            host: None,
            sqlstate: String::new(),
            message_bytes: message.to_string(),
            is_continuation: false,
        }
    }

    #[test]
    fn test_pairs_starting_with_complete() {
        let mut a = CheckpointsAnalyzer::new();
        a.process(&entry("checkpoint starting: time"));
        a.process(&entry(
            "checkpoint complete: wrote 34 buffers (0.2%); 0 WAL file(s) added, 0 removed, 1 recycled; write=1.200 s, sync=0.300 s, total=1.700 s",
        ));
        let out = a.finalize();
        assert_eq!(out.total_checkpoints, 1);
        assert_eq!(out.types["time"].count, 1);
        assert_eq!(out.avg_checkpoint_time_ms, 1700.0);
        assert_eq!(out.max_checkpoint_time_ms, 1700.0);
    }

    #[test]
    fn test_complete_without_starting_uses_unknown() {
        let mut a = CheckpointsAnalyzer::new();
        a.process(&entry("checkpoint complete: wrote 1 buffers (0.0%); total=0.500 s"));
        let out = a.finalize();
        assert_eq!(out.types["unknown"].count, 1);
    }
}
