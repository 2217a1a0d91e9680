//! SQLSTATE class extraction and description lookup.
//!
//! The class is the first two characters of the five-character SQLSTATE
//! (PostgreSQL's own convention, `src/backend/utils/errcodes.txt`).

use std::collections::HashMap;

use crate::model::LogEntry;

use super::Analyzer;

#[derive(Default)]
pub struct ErrorClassesAnalyzer {
    counts: HashMap<String, u64>,
}

impl ErrorClassesAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analyzer for ErrorClassesAnalyzer {
    type Output = Vec<(String, u64)>;

    fn process(&mut self, entry: &LogEntry) {
        if entry.sqlstate.len() < 2 {
            return;
        }
        let class = &entry.sqlstate[..2];
        if class == "00" {
            return; // successful completion is not an error class
        }
        *self.counts.entry(class.to_string()).or_insert(0) += 1;
    }

    fn finalize(self) -> Self::Output {
        let mut out: Vec<(String, u64)> = self.counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

/// Human-readable description for a two-character SQLSTATE class.
pub fn describe(class: &str) -> &'static str {
    const TABLE: &[(&str, &str)] = &[
        ("01", "Warning"),
        ("02", "No Data"),
        ("03", "SQL Statement Not Yet Complete"),
        ("08", "Connection Exception"),
        ("09", "Triggered Action Exception"),
        ("0A", "Feature Not Supported"),
        ("0B", "Invalid Transaction Initiation"),
        ("0F", "Locator Exception"),
        ("0L", "Invalid Grantor"),
        ("0P", "Invalid Role Specification"),
        ("0Z", "Diagnostics Exception"),
        ("20", "Case Not Found"),
        ("21", "Cardinality Violation"),
        ("22", "Data Exception"),
        ("23", "Integrity Constraint Violation"),
        ("24", "Invalid Cursor State"),
        ("25", "Invalid Transaction State"),
        ("26", "Invalid SQL Statement Name"),
        ("27", "Triggered Data Change Violation"),
        ("28", "Invalid Authorization Specification"),
        ("2B", "Dependent Privilege Descriptors Still Exist"),
        ("2D", "Invalid Transaction Termination"),
        ("2F", "SQL Routine Exception"),
        ("34", "Invalid Cursor Name"),
        ("38", "External Routine Exception"),
        ("39", "External Routine Invocation Exception"),
        ("3B", "Savepoint Exception"),
        ("3D", "Invalid Catalog Name"),
        ("3F", "Invalid Schema Name"),
        ("40", "Transaction Rollback"),
        ("42", "Syntax Error or Access Rule Violation"),
        ("44", "WITH CHECK OPTION Violation"),
        ("53", "Insufficient Resources"),
        ("54", "Program Limit Exceeded"),
        ("55", "Object Not In Prerequisite State"),
        ("57", "Operator Intervention"),
        ("58", "System Error"),
        ("72", "Snapshot Failure"),
        ("F0", "Configuration File Error"),
        ("HV", "Foreign Data Wrapper Error"),
        ("P0", "PL/pgSQL Error"),
        ("XX", "Internal Error"),
    ];
    TABLE
        .iter()
        .find(|(code, _)| *code == class)
        .map(|(_, desc)| *desc)
        .unwrap_or("Unknown Error Class")
}
