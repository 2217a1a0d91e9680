//! Database/user/application/host frequency counts.
//!
//! Prefers the structured fields a format parser already extracted onto
//! [`LogEntry`] (reliable for csvlog/jsonlog and prefix-matched
//! stderr/syslog lines); when a field is absent, falls back to a
//! single-pass scan of the message text for `db=`/`user=`/`app=`/`host=`
//! markers the way `connection authorized:`-style lines embed them, so a
//! line with no prefix match still contributes. Entries missing both
//! sources, or carrying the literal `unknown`/`[unknown]` placeholder, are
//! counted against [`crate::model::UNKNOWN`].

use std::collections::HashMap;

use crate::model::{LogEntry, NamedCount, UNKNOWN};

use super::Analyzer;

#[derive(Default)]
pub struct EntitiesAnalyzer {
    databases: HashMap<String, u64>,
    users: HashMap<String, u64>,
    apps: HashMap<String, u64>,
    hosts: HashMap<String, u64>,
}

pub struct EntityCounts {
    pub databases: Vec<NamedCount>,
    pub users: Vec<NamedCount>,
    pub apps: Vec<NamedCount>,
    pub hosts: Vec<NamedCount>,
}

impl EntitiesAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analyzer for EntitiesAnalyzer {
    type Output = EntityCounts;

    fn process(&mut self, entry: &LogEntry) {
        tally(&mut self.databases, entry.database.clone().or_else(|| scan_marker(&entry.message_bytes, "db=")));
        tally(&mut self.users, entry.user.clone().or_else(|| scan_marker(&entry.message_bytes, "user=")));
        tally(&mut self.apps, entry.application.clone().or_else(|| scan_marker(&entry.message_bytes, "app=")));
        tally(&mut self.hosts, entry.host.clone().or_else(|| scan_marker(&entry.message_bytes, "host=")));
    }

    fn finalize(self) -> Self::Output {
        EntityCounts {
            databases: to_sorted_counts(self.databases),
            users: to_sorted_counts(self.users),
            apps: to_sorted_counts(self.apps),
            hosts: to_sorted_counts(self.hosts),
        }
    }
}

/// Scan `text` for `marker` and extract up to the next separator in
/// `{space, comma, '[', ')'}`.
fn scan_marker(text: &str, marker: &str) -> Option<String> {
    let pos = text.find(marker)? + marker.len();
    let rest = &text[pos..];
    let end = rest.find([' ', ',', '[', ')']).unwrap_or(rest.len());
    let value = rest[..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn tally(map: &mut HashMap<String, u64>, value: Option<String>) {
    let key = match value {
        Some(v) if !v.is_empty() && v != "unknown" && v != "[unknown]" => v,
        _ => UNKNOWN.to_string(),
    };
    *map.entry(key).or_insert(0) += 1;
}

/// `UNKNOWN` sorts with the rest, purely lexically, per the output contract.
fn to_sorted_counts(map: HashMap<String, u64>) -> Vec<NamedCount> {
    let mut out: Vec<NamedCount> = map
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}
