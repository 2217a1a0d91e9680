//! RFC5424 syslog wire format parser.
//!
//! Same rationale as [`super::syslog_bsd`]: PostgreSQL's own `log_line_prefix`
//! still lives inside the MSG part, so once the structured RFC5424 header
//! (`<PRI>VERSION TIMESTAMP HOST APP-NAME PROCID MSGID SD`) is peeled off,
//! severity/message extraction reuses the same keyword scan.

use chrono::{DateTime, Utc};

use crate::model::LogEntry;

use super::syslog_bsd::find_severity;
use super::{EntryAssembler, LineParser};

#[derive(Default)]
pub struct SyslogRfc5424Parser {
    asm: EntryAssembler,
}

impl SyslogRfc5424Parser {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_header(&self, line: &str) -> Option<LogEntry> {
        let (timestamp, pid, rest) = parse_envelope(line)?;
        let (severity, msg_start) = find_severity(rest)?;
        let (sqlstate, message) = crate::util::strip_sqlstate(&rest[msg_start..]);
        Some(LogEntry {
            timestamp,
            severity,
            process_id: pid.unwrap_or_default(),
            database: None,
            user: None,
            application: None,
            host: None,
            sqlstate,
            message_bytes: message.to_string(),
            is_continuation: false,
        })
    }
}

impl LineParser for SyslogRfc5424Parser {
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

fn parse_envelope(line: &str) -> Option<(DateTime<Utc>, Option<String>, &str)> {
    let rest = line.strip_prefix('<')?;
    let gt = rest.find('>')?;
    let after_pri = &rest[gt + 1..];

    let mut parts = after_pri.splitn(6, ' ');
    let _version = parts.next()?;
    let ts_str = parts.next()?;
    let _host = parts.next()?;
    let _app = parts.next()?;
    let procid = parts.next()?;
    let remainder = parts.next()?.trim_start();

    let timestamp = DateTime::parse_from_rfc3339(ts_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))?;

    let msgid_end = remainder.find(' ')?;
    let after_msgid = remainder[msgid_end + 1..].trim_start();

    let message = if let Some(stripped) = after_msgid.strip_prefix('[') {
        let end = stripped.find(']')?;
        stripped[end + 1..].trim_start()
    } else if let Some(stripped) = after_msgid.strip_prefix('-') {
        stripped.trim_start()
    } else {
        return None;
    };

    let pid = (!procid.is_empty() && procid != "-").then(|| procid.to_string());
    Some((timestamp, pid, message))
}
