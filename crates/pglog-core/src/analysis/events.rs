//! Severity event counter.
//!
//! Tallies every log entry by all eight severities the shared [`Severity`]
//! enum carries.

use std::collections::HashMap;

use crate::model::{LogEntry, Severity};

use super::Analyzer;

#[derive(Default)]
pub struct EventsAnalyzer {
    counts: HashMap<Severity, u64>,
}

impl EventsAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analyzer for EventsAnalyzer {
    type Output = Vec<(Severity, u64)>;

    fn process(&mut self, entry: &LogEntry) {
        *self.counts.entry(entry.severity).or_insert(0) += 1;
    }

    fn finalize(self) -> Self::Output {
        let mut out: Vec<(Severity, u64)> = self.counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        out
    }
}
