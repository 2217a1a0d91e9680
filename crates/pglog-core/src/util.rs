//! Shared formatting and numeric-extraction helpers used across analyzers.
//!
//! Byte sizes render with two decimal places and `KB/MB/GB` labels, the
//! convention PostgreSQL log tooling uses for byte-size output.

use chrono::{DateTime, Utc};

/// Render a UTC instant as `"YYYY-MM-DD HH:MM:SS"` — ISO 8601 with a space
/// instead of `T`, matching the output contract every timeline field uses.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format a byte count as `"N.NN B|KB|MB|GB"` (binary divisors, decimal labels).
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let f = bytes as f64;
    if f >= GB {
        format!("{:.2} GB", f / GB)
    } else if f >= MB {
        format!("{:.2} MB", f / MB)
    } else if f >= KB {
        format!("{:.2} KB", f / KB)
    } else {
        format!("{:.2} B", f)
    }
}

/// Parse a PostgreSQL `session time:` duration of the form `H:MM:SS.mmm`
/// (or `D H:MM:SS.mmm` for multi-day sessions) into milliseconds.
pub fn parse_session_duration_ms(text: &str) -> Option<f64> {
    // Split off an optional leading "D " day count.
    let (days, rest) = match text.split_once(' ') {
        Some((d, rest)) if d.chars().all(|c| c.is_ascii_digit()) && !d.is_empty() => {
            (d.parse::<f64>().ok()?, rest)
        }
        _ => (0.0, text),
    };
    let mut parts = rest.splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(((days * 24.0 + hours) * 3600.0 + minutes * 60.0 + seconds) * 1000.0)
}

/// Extract the first `i64` value immediately after `marker` in `text`.
pub fn extract_i64_after(text: &str, marker: &str) -> Option<i64> {
    let pos = text.find(marker)? + marker.len();
    let rest = &text[pos..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '-')
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Extract the first `f64` value immediately after `marker` in `text`.
pub fn extract_f64_after(text: &str, marker: &str) -> Option<f64> {
    let pos = text.find(marker)? + marker.len();
    let rest = &text[pos..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != '-')
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Peel a leading `XXXXX:  ` SQLSTATE code off a message, when present.
/// Shared by every parser whose message text follows PostgreSQL's own
/// `SEVERITY:  [SQLSTATE:]  text` convention (stderr, both syslog variants).
pub fn strip_sqlstate(text: &str) -> (String, &str) {
    let bytes = text.as_bytes();
    if bytes.len() >= 7 && bytes[..5].iter().all(|b| b.is_ascii_alphanumeric()) && bytes[5] == b':' {
        let rest = text[6..].trim_start();
        (text[..5].to_string(), rest)
    } else {
        (String::new(), text)
    }
}

/// Extract the first double-quoted string from `text`.
pub fn extract_quoted_string(text: &str) -> Option<&str> {
    let start = text.find('"')? + 1;
    let end = start + text[start..].find('"')?;
    Some(&text[start..end])
}

/// Percentile helpers operating on an already-sorted slice.
pub fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// 99th percentile by index `floor(0.99 * n)` clamped to `n - 1`.
pub fn p99_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let idx = ((0.99 * n as f64).floor() as usize).min(n - 1);
    sorted[idx]
}
