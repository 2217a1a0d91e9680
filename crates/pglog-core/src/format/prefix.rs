//! Auto-detection of the `log_line_prefix` template for stderr/syslog inputs.
//!
//! Recognizing every severity and extracting the structured fields
//! (`%u %d %r %h %a`) requires knowing the operator's configured
//! `log_line_prefix`, which isn't recorded in the log stream itself. A small
//! table of candidate prefix templates is each scored against a sample of
//! lines; the highest scorer above 80% wins, else a minimal fallback is
//! assumed.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};

const CANDIDATE_ESCAPES: &[char] = &['m', 't', 'p', 'l', 'u', 'd', 'r', 'h', 'a', 'e', 'c'];

#[derive(Clone, Debug)]
enum Segment {
    Lit(String),
    Field(char),
}

/// A compiled `log_line_prefix` candidate.
#[derive(Clone, Debug)]
pub struct PrefixTemplate {
    pub pattern: String,
    segments: Vec<Segment>,
}

impl PrefixTemplate {
    fn compile(pattern: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '%' {
                if let Some(&code) = chars.peek() {
                    if CANDIDATE_ESCAPES.contains(&code) {
                        if !literal.is_empty() {
                            segments.push(Segment::Lit(std::mem::take(&mut literal)));
                        }
                        segments.push(Segment::Field(code));
                        chars.next();
                        continue;
                    }
                }
                literal.push(c);
            } else {
                literal.push(c);
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Lit(literal));
        }
        Self {
            pattern: pattern.to_string(),
            segments,
        }
    }

    /// Try to match this template against `line`, returning the extracted
    /// fields (by escape letter) and the byte length of the matched prefix.
    pub fn try_match(&self, line: &str) -> Option<(HashMap<char, String>, usize)> {
        let mut pos = 0usize;
        let mut fields = HashMap::new();
        for (idx, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Lit(lit) => {
                    if !line[pos..].starts_with(lit.as_str()) {
                        return None;
                    }
                    pos += lit.len();
                }
                Segment::Field(code) => {
                    let remaining = &line[pos..];
                    let next_lit = self.segments[idx + 1..].iter().find_map(|s| match s {
                        Segment::Lit(l) if !l.is_empty() => Some(l.as_str()),
                        _ => None,
                    });
                    let len = match code {
                        'p' | 'l' => {
                            let n = remaining
                                .find(|c: char| !c.is_ascii_digit())
                                .unwrap_or(remaining.len());
                            if n == 0 {
                                return None;
                            }
                            n
                        }
                        'e' => {
                            if remaining.len() < 5 {
                                return None;
                            }
                            5
                        }
                        't' => match_timestamp(remaining, false)?,
                        'm' => match_timestamp(remaining, true)?,
                        _ => match next_lit {
                            Some(lit) => remaining.find(lit).unwrap_or(remaining.len()),
                            None => remaining
                                .find(|c: char| c == '\n')
                                .unwrap_or(remaining.len()),
                        },
                    };
                    fields.insert(*code, remaining[..len].to_string());
                    pos += len;
                }
            }
        }
        Some((fields, pos))
    }
}

/// Parse a `%t`/`%m` timestamp field (with or without milliseconds), return
/// its byte length if `s` starts with one, else `None`.
fn match_timestamp(s: &str, with_millis: bool) -> Option<usize> {
    let b = s.as_bytes();
    let mut i = 0usize;
    let mut need_digits = |i: &mut usize, n: usize| -> Option<()> {
        for _ in 0..n {
            if *i >= b.len() || !b[*i].is_ascii_digit() {
                return None;
            }
            *i += 1;
        }
        Some(())
    };
    need_digits(&mut i, 4)?;
    if b.get(i) != Some(&b'-') {
        return None;
    }
    i += 1;
    need_digits(&mut i, 2)?;
    if b.get(i) != Some(&b'-') {
        return None;
    }
    i += 1;
    need_digits(&mut i, 2)?;
    if b.get(i) != Some(&b' ') {
        return None;
    }
    i += 1;
    need_digits(&mut i, 2)?;
    if b.get(i) != Some(&b':') {
        return None;
    }
    i += 1;
    need_digits(&mut i, 2)?;
    if b.get(i) != Some(&b':') {
        return None;
    }
    i += 1;
    need_digits(&mut i, 2)?;
    if with_millis && b.get(i) == Some(&b'.') {
        i += 1;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
    }
    if b.get(i) == Some(&b' ') {
        let save = i;
        i += 1;
        let tz_start = i;
        while i < b.len()
            && (b[i].is_ascii_alphabetic() || b[i] == b'+' || b[i] == b'-' || b[i].is_ascii_digit())
        {
            i += 1;
        }
        if i == tz_start {
            i = save;
        }
    }
    Some(i)
}

/// Parse a matched `%t`/`%m` field value into a `DateTime<Utc>`.
pub fn parse_timestamp_field(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    let candidates = [
        "%Y-%m-%d %H:%M:%S%.f %Z",
        "%Y-%m-%d %H:%M:%S %Z",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    for fmt in candidates {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
    }
    None
}

fn candidate_templates() -> Vec<PrefixTemplate> {
    [
        "%m [%p] %u@%d ",
        "%t [%p]: db=%d,user=%u,app=%a ",
        "%t [%p]: ",
        "%m [%p]: ",
        "%t [%p] %u %d ",
    ]
    .iter()
    .map(|p| PrefixTemplate::compile(p))
    .collect()
}

/// The template used when no candidate scores above 80%.
pub fn fallback_template() -> PrefixTemplate {
    PrefixTemplate::compile("%t [%p]:")
}

/// Score every candidate template against `sample_lines` and return the
/// highest scorer if it clears 80%, else the fallback template.
pub fn detect_prefix(sample_lines: &[String]) -> PrefixTemplate {
    if sample_lines.is_empty() {
        return fallback_template();
    }
    let mut best: Option<(PrefixTemplate, f64)> = None;
    for tpl in candidate_templates() {
        let matches = sample_lines
            .iter()
            .filter(|line| tpl.try_match(line).is_some())
            .count();
        let score = matches as f64 / sample_lines.len() as f64;
        if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
            best = Some((tpl, score));
        }
    }
    match best {
        Some((tpl, score)) if score > 0.8 => tpl,
        _ => fallback_template(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_classic_prefix() {
        let tpl = PrefixTemplate::compile("%t [%p]: ");
        let (fields, len) = tpl
            .try_match("2024-01-15 14:30:00 UTC [12345]: LOG:  hello")
            .unwrap();
        assert_eq!(fields.get(&'p').unwrap(), "12345");
        assert_eq!(&"2024-01-15 14:30:00 UTC [12345]: LOG:  hello"[len..], "LOG:  hello");
    }

    #[test]
    fn test_match_user_db_prefix() {
        let tpl = PrefixTemplate::compile("%m [%p] %u@%d ");
        let line = "2024-01-15 14:30:00.123 UTC [99] appuser@mydb LOG:  hi";
        let (fields, _) = tpl.try_match(line).unwrap();
        assert_eq!(fields.get(&'u').unwrap(), "appuser");
        assert_eq!(fields.get(&'d').unwrap(), "mydb");
    }

    #[test]
    fn test_detect_prefix_picks_matching_candidate() {
        let lines: Vec<String> = (0..20)
            .map(|i| format!("2024-01-15 14:30:{:02} UTC [{}]: LOG:  msg {}", i % 60, 100 + i, i))
            .collect();
        let tpl = detect_prefix(&lines);
        assert!(tpl.try_match(&lines[0]).is_some());
    }

    #[test]
    fn test_detect_prefix_falls_back_below_threshold() {
        let lines: Vec<String> = vec!["garbage line with no structure".to_string(); 5];
        let tpl = detect_prefix(&lines);
        assert_eq!(tpl.pattern, "%t [%p]:");
    }

    #[test]
    fn test_parse_timestamp_field() {
        let dt = parse_timestamp_field("2024-01-15 14:30:00 UTC").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
    }

    #[test]
    fn test_parse_timestamp_field_with_millis() {
        let dt = parse_timestamp_field("2024-01-15 14:30:00.123 UTC").unwrap();
        assert_eq!(dt.timestamp_subsec_millis(), 123);
    }
}
