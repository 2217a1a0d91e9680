//! Plain `stderr` log format parser.
//!
//! A prefix scan against the auto-detected [`prefix::PrefixTemplate`],
//! followed by a severity-keyword match and SQLSTATE peel, recognizing all
//! eight severities rather than a fixed subset.

use crate::model::{LogEntry, Severity};

use super::prefix::{self, PrefixTemplate};
use super::{EntryAssembler, LineParser};

pub struct StderrParser {
    template: PrefixTemplate,
    asm: EntryAssembler,
}

impl StderrParser {
    pub fn new(template: PrefixTemplate) -> Self {
        Self {
            template,
            asm: EntryAssembler::new(),
        }
    }

    fn try_header(&self, line: &str) -> Option<LogEntry> {
        let (fields, consumed) = self.template.try_match(line)?;
        let rest = line[consumed..].trim_start();
        let (severity, kw_len) = Severity::parse_prefix(rest)?;
        let after_kw = rest[kw_len..].strip_prefix(':')?;
        let (sqlstate, message) = crate::util::strip_sqlstate(after_kw.trim_start());

        let timestamp = fields
            .get(&'t')
            .or_else(|| fields.get(&'m'))
            .and_then(|v| prefix::parse_timestamp_field(v))?;

        let host = fields.get(&'r').map(|r| {
            r.split(':').next().unwrap_or(r.as_str()).to_string()
        }).or_else(|| fields.get(&'h').cloned());

        Some(LogEntry {
            timestamp,
            severity,
            process_id: fields.get(&'p').cloned().unwrap_or_default(),
            database: fields.get(&'d').cloned(),
            user: fields.get(&'u').cloned(),
            application: fields.get(&'a').cloned(),
            host,
            sqlstate,
            message_bytes: message.to_string(),
            is_continuation: false,
        })
    }
}

impl LineParser for StderrParser {
    fn feed(&mut self, line: &str) -> Option<LogEntry> {
        if line.trim().is_empty() {
            return None;
        }
        match self.try_header(line) {
            Some(entry) => self.asm.start(entry),
            None => {
                self.asm.fold(line);
                None
            }
        }
    }

    fn finish(&mut self) -> Option<LogEntry> {
        self.asm.finish()
    }
}
