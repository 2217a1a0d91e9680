//! Log format detection and the per-format line parsers.

pub mod cnpg;
pub mod csvlog;
pub mod jsonlog;
pub mod line_reader;
pub mod prefix;
pub mod stderr;
pub mod syslog_bsd;
pub mod syslog_rfc5424;

use crate::model::LogEntry;

/// The recognized PostgreSQL server log encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatTag {
    Stderr,
    Csvlog,
    Jsonlog,
    SyslogBsd,
    SyslogRfc5424,
    Cnpg,
}

impl FormatTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatTag::Stderr => "stderr",
            FormatTag::Csvlog => "csvlog",
            FormatTag::Jsonlog => "jsonlog",
            FormatTag::SyslogBsd => "syslog_bsd",
            FormatTag::SyslogRfc5424 => "syslog_rfc5424",
            FormatTag::Cnpg => "cnpg",
        }
    }
}

/// Detect the log format from a leading sample of bytes: csvlog (quoted-CSV
/// header shape) before jsonlog/cnpg (both JSON, disambiguated by a
/// `"logger"` field unique to cnpg) before the two syslog wire formats
/// before the stderr fallback.
pub fn detect(sample: &[u8]) -> FormatTag {
    let text = String::from_utf8_lossy(sample);
    let first_non_blank = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    if looks_like_csvlog(first_non_blank) {
        return FormatTag::Csvlog;
    }
    if first_non_blank.trim_start().starts_with('{') {
        return if first_non_blank.contains("\"logger\"") {
            FormatTag::Cnpg
        } else {
            FormatTag::Jsonlog
        };
    }
    if looks_like_syslog_rfc5424(first_non_blank) {
        return FormatTag::SyslogRfc5424;
    }
    if looks_like_syslog_bsd(first_non_blank) {
        return FormatTag::SyslogBsd;
    }
    if first_non_blank.contains("level=info msg=") {
        return FormatTag::Cnpg;
    }
    FormatTag::Stderr
}

/// csvlog rows open with a quoted timestamp field: `"2024-01-15 ...`.
fn looks_like_csvlog(line: &str) -> bool {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('"') {
        return false;
    }
    trimmed[1..]
        .get(..4)
        .map(|s| s.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// RFC5424: `<PRI>VERSION ISO8601-TIMESTAMP HOST APP PROCID MSGID ...`
fn looks_like_syslog_rfc5424(line: &str) -> bool {
    let Some(rest) = line.strip_prefix('<') else {
        return false;
    };
    let Some(gt) = rest.find('>') else {
        return false;
    };
    let after_pri = &rest[gt + 1..];
    after_pri.starts_with('1') && after_pri[1..].starts_with(' ')
}

/// BSD syslog (RFC3164): `<PRI>Mon DD HH:MM:SS host tag: message`.
fn looks_like_syslog_bsd(line: &str) -> bool {
    let Some(rest) = line.strip_prefix('<') else {
        return false;
    };
    let Some(gt) = rest.find('>') else {
        return false;
    };
    let after_pri = &rest[gt + 1..];
    const MONTHS: &[&str] = &[
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    MONTHS.iter().any(|m| after_pri.starts_with(m))
}

/// Common interface every format submodule implements: feed raw physical
/// lines, get back completed [`LogEntry`] values as they're released.
pub trait LineParser {
    /// Feed one physical line (without its line terminator). Returns a
    /// now-finalized entry if feeding this line caused a previously pending
    /// one to be released (continuation folding).
    fn feed(&mut self, line: &str) -> Option<LogEntry>;

    /// Flush any still-pending entry at end of input.
    fn finish(&mut self) -> Option<LogEntry>;
}

/// Shared "pending entry" buffer used by the formats that fold continuation
/// lines into the previous record (stderr, syslog_bsd, syslog_rfc5424).
/// jsonlog/cnpg/csvlog are one-record-per-logical-line and don't need this.
#[derive(Default)]
pub struct EntryAssembler {
    pending: Option<LogEntry>,
}

impl EntryAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release whatever was pending and stash `entry` as the new pending one.
    pub fn start(&mut self, entry: LogEntry) -> Option<LogEntry> {
        self.pending.replace(entry)
    }

    /// Fold `text` into the pending entry, if any. Returns `true` if there
    /// was a pending entry to fold into (a continuation with no preceding
    /// header line is silently dropped, edge case).
    pub fn fold(&mut self, text: &str) -> bool {
        match self.pending.as_mut() {
            Some(entry) => {
                entry.fold_continuation(text);
                true
            }
            None => false,
        }
    }

    pub fn finish(&mut self) -> Option<LogEntry> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_csvlog() {
        let sample = b"\"2024-01-15 14:30:00.123 UTC\",\"user\",\"db\",\"1234\"\n";
        assert_eq!(detect(sample), FormatTag::Csvlog);
    }

    #[test]
    fn test_detect_jsonlog() {
        let sample = br#"{"timestamp":"2024-01-15 14:30:00.123 UTC","pid":1234}"#;
        assert_eq!(detect(sample), FormatTag::Jsonlog);
    }

    #[test]
    fn test_detect_cnpg() {
        let sample = br#"{"level":"info","ts":1705329000,"logger":"postgres","msg":"hi"}"#;
        assert_eq!(detect(sample), FormatTag::Cnpg);
    }

    #[test]
    fn test_detect_syslog_rfc5424() {
        let sample = b"<134>1 2024-01-15T14:30:00.123Z myhost postgres 1234 - - LOG: hi\n";
        assert_eq!(detect(sample), FormatTag::SyslogRfc5424);
    }

    #[test]
    fn test_detect_syslog_bsd() {
        let sample = b"<134>Jan 15 14:30:00 myhost postgres[1234]: LOG: hi\n";
        assert_eq!(detect(sample), FormatTag::SyslogBsd);
    }

    #[test]
    fn test_detect_cnpg_logfmt_style() {
        let sample = b"2024-01-15T14:30:00Z level=info msg=\"starting up\"\n";
        assert_eq!(detect(sample), FormatTag::Cnpg);
    }

    #[test]
    fn test_detect_stderr_fallback() {
        let sample = b"2024-01-15 14:30:00 UTC [1234]: LOG:  checkpoint starting\n";
        assert_eq!(detect(sample), FormatTag::Stderr);
    }

    #[test]
    fn test_entry_assembler_folds_and_releases() {
        use crate::model::Severity;
        let mut asm = EntryAssembler::new();
        let e1 = LogEntry {
            timestamp: chrono::Utc::now(),
            severity: Severity::Log,
            process_id: "1".into(),
            database: None,
            user: None,
            application: None,
            host: None,
            sqlstate: String::new(),
            message_bytes: "first".into(),
            is_continuation: false,
        };
        assert!(asm.start(e1).is_none());
        assert!(asm.fold("continued"));
        let e2 = LogEntry {
            message_bytes: "second".into(),
            ..asm.pending.clone().unwrap()
        };
        let released = asm.start(e2).unwrap();
        assert_eq!(released.message_bytes, "first\ncontinued");
        let last = asm.finish().unwrap();
        assert_eq!(last.message_bytes, "second");
    }
}
