//! BSD syslog (RFC3164) wire format parser.
//!
//! PostgreSQL still writes its own `log_line_prefix` into the message part
//! of every syslog datagram, so once the `<PRI>timestamp host tag[pid]:`
//! envelope is peeled off, severity/message extraction falls back to a
//! keyword scan rather than the structured prefix template — syslog
//! deployments rarely carry a `%t`/`%m` escape since the transport already
//! timestamps each line.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};

use crate::model::{LogEntry, Severity};

use super::{EntryAssembler, LineParser};

#[derive(Default)]
pub struct SyslogBsdParser {
    asm: EntryAssembler,
}

impl SyslogBsdParser {
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

impl LineParser for SyslogBsdParser {
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
    if after_pri.len() < 15 {
        return None;
    }
    let timestamp = parse_bsd_timestamp(&after_pri[..15])?;
    let after_ts = after_pri[15..].trim_start();
    let host_end = after_ts.find(' ')?;
    let after_host = after_ts[host_end + 1..].trim_start();
    let colon = after_host.find(':')?;
    let tag = &after_host[..colon];
    let pid = tag
        .find('[')
        .and_then(|op| tag[op..].find(']').map(|cl| tag[op + 1..op + cl].to_string()));
    let message = after_host[colon + 1..].trim_start();
    Some((timestamp, pid, message))
}

fn parse_bsd_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let year = Utc::now().year();
    let with_year = format!("{year} {s}");
    NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S")
        .ok()
        .map(|n| DateTime::from_naive_utc_and_offset(n, Utc))
}

/// Scan for the first `<SEVERITY>:` token at a word boundary, returning the
/// severity and the byte offset where the message text begins.
pub(super) fn find_severity(text: &str) -> Option<(Severity, usize)> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    for idx in 0..chars.len() {
        let (byte_pos, _) = chars[idx];
        let boundary = idx == 0 || matches!(chars[idx - 1].1, ' ' | ']' | ':');
        if !boundary {
            continue;
        }
        if let Some((sev, kw_len)) = Severity::parse_prefix(&text[byte_pos..]) {
            let after_kw = &text[byte_pos + kw_len..];
            if let Some(rest) = after_kw.strip_prefix(':') {
                let message = rest.trim_start();
                let msg_start = text.len() - message.len();
                return Some((sev, msg_start));
            }
        }
    }
    None
}
