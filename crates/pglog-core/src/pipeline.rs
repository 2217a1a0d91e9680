//! The streaming dispatcher and the library's two fallible entry points.
//!
//! `Dispatcher` owns one instance of every subsystem analyzer and fans each
//! decoded [`LogEntry`] out to all of them as it arrives, once per entry
//! rather than once per polling tick.

use std::io::{Cursor, Read};
use std::sync::mpsc;
use std::thread;

use crate::analysis::{
    checkpoints::CheckpointsAnalyzer, connections::ConnectionsAnalyzer, entities::EntitiesAnalyzer,
    error_classes::ErrorClassesAnalyzer, events::EventsAnalyzer, locks::LocksAnalyzer,
    sql::SqlAnalyzer, temp_files::TempFilesAnalyzer, vacuum::VacuumAnalyzer, Analyzer,
};
use crate::error::PipelineError;
use crate::finalize::collect_queries_without_duration;
use crate::format::{
    self, cnpg::CnpgParser, csvlog::CsvlogParser, jsonlog::JsonlogParser, line_reader::LineReader,
    prefix, stderr::StderrParser, syslog_bsd::SyslogBsdParser, syslog_rfc5424::SyslogRfc5424Parser,
    FormatTag, LineParser,
};
use crate::model::{AggregatedMetrics, ErrorClassCount, EventCount, LogEntry, Meta, Summary};

/// Above this input size, SQL-duration processing moves to its own thread
/// fed by a bounded channel.
pub const PARALLEL_THRESHOLD_BYTES: u64 = 200 * 1024 * 1024;

/// Bound on the SQL worker's inbox.
pub const CHANNEL_CAPACITY: usize = 10_000;

const PREFIX_SAMPLE_LINES: usize = 64;

/// Owns one instance of every subsystem analyzer except SQL, which is
/// optionally split off onto its own thread (see [`analyze_reader`]).
struct Dispatcher {
    events: EventsAnalyzer,
    error_classes: ErrorClassesAnalyzer,
    vacuum: VacuumAnalyzer,
    checkpoints: CheckpointsAnalyzer,
    connections: ConnectionsAnalyzer,
    entities: EntitiesAnalyzer,
    temp_files: TempFilesAnalyzer,
    locks: LocksAnalyzer,
    sql: Option<SqlAnalyzer>,
    entries: u64,
    min_ts: Option<chrono::DateTime<chrono::Utc>>,
    max_ts: Option<chrono::DateTime<chrono::Utc>>,
}

impl Dispatcher {
    fn new(own_sql: bool) -> Self {
        Self {
            events: EventsAnalyzer::new(),
            error_classes: ErrorClassesAnalyzer::new(),
            vacuum: VacuumAnalyzer::new(),
            checkpoints: CheckpointsAnalyzer::new(),
            connections: ConnectionsAnalyzer::new(),
            entities: EntitiesAnalyzer::new(),
            temp_files: TempFilesAnalyzer::new(),
            locks: LocksAnalyzer::new(),
            sql: own_sql.then(SqlAnalyzer::new),
            entries: 0,
            min_ts: None,
            max_ts: None,
        }
    }

    fn process(&mut self, entry: &LogEntry) {
        self.entries += 1;
        self.min_ts = Some(self.min_ts.map_or(entry.timestamp, |t| t.min(entry.timestamp)));
        self.max_ts = Some(self.max_ts.map_or(entry.timestamp, |t| t.max(entry.timestamp)));
        self.events.process(entry);
        self.error_classes.process(entry);
        self.vacuum.process(entry);
        self.checkpoints.process(entry);
        self.connections.process(entry);
        self.entities.process(entry);
        self.temp_files.process(entry);
        self.locks.process(entry);
        if let Some(sql) = self.sql.as_mut() {
            sql.process(entry);
        }
    }
}

fn dispatch_entry(dispatcher: &mut Dispatcher, sql_tx: &Option<mpsc::SyncSender<LogEntry>>, entry: LogEntry) {
    dispatcher.process(&entry);
    if let Some(tx) = sql_tx {
        let _ = tx.send(entry);
    }
}

fn build_parser(format: FormatTag, sample_lines: &[String]) -> Box<dyn LineParser> {
    match format {
        FormatTag::Stderr => Box::new(StderrParser::new(prefix::detect_prefix(sample_lines))),
        FormatTag::Csvlog => Box::new(CsvlogParser::new()),
        FormatTag::Jsonlog => Box::new(JsonlogParser::new()),
        FormatTag::SyslogBsd => Box::new(SyslogBsdParser::new()),
        FormatTag::SyslogRfc5424 => Box::new(SyslogRfc5424Parser::new()),
        FormatTag::Cnpg => Box::new(CnpgParser::new()),
    }
}

/// Analyze a complete in-memory log buffer.
pub fn analyze_bytes(bytes: &[u8], format_hint: Option<FormatTag>) -> Result<AggregatedMetrics, PipelineError> {
    analyze_reader(Cursor::new(bytes), bytes.len() as u64, format_hint, None, None)
}

/// Analyze a streamed log source. `total_bytes` drives the parallel-SQL-worker
/// threshold; pass the file size when known, or an estimate.
pub fn analyze_reader<R: Read>(
    reader: R,
    total_bytes: u64,
    format_hint: Option<FormatTag>,
    parallel_threshold: Option<u64>,
    channel_capacity: Option<usize>,
) -> Result<AggregatedMetrics, PipelineError> {
    let start = std::time::Instant::now();
    let mut lines = LineReader::new(reader);

    let mut sample: Vec<String> = Vec::with_capacity(PREFIX_SAMPLE_LINES);
    while sample.len() < PREFIX_SAMPLE_LINES {
        match lines.next_line()? {
            Some(line) => sample.push(line),
            None => break,
        }
    }

    let format = format_hint.unwrap_or_else(|| {
        let joined = sample.join("\n");
        format::detect(joined.as_bytes())
    });
    tracing::debug!(format = format.as_str(), sampled = sample.len(), "format detected");

    let mut parser = build_parser(format, &sample);

    let threshold = parallel_threshold.unwrap_or(PARALLEL_THRESHOLD_BYTES);
    let capacity = channel_capacity.unwrap_or(CHANNEL_CAPACITY);
    let use_worker = total_bytes > threshold;

    let (sql_tx, sql_worker) = if use_worker {
        tracing::debug!(capacity, "enabling parallel sql worker");
        let (tx, rx) = mpsc::sync_channel::<LogEntry>(capacity);
        let handle = thread::spawn(move || {
            let mut sql = SqlAnalyzer::new();
            for entry in rx {
                sql.process(&entry);
            }
            sql.finalize()
        });
        (Some(tx), Some(handle))
    } else {
        (None, None)
    };

    let mut dispatcher = Dispatcher::new(!use_worker);
    let mut byte_count: u64 = 0;

    for line in &sample {
        byte_count += line.len() as u64 + 1;
        if let Some(entry) = parser.feed(line) {
            dispatch_entry(&mut dispatcher, &sql_tx, entry);
        }
    }
    while let Some(line) = lines.next_line()? {
        byte_count += line.len() as u64 + 1;
        if let Some(entry) = parser.feed(&line) {
            dispatch_entry(&mut dispatcher, &sql_tx, entry);
        }
    }
    if let Some(entry) = parser.finish() {
        dispatch_entry(&mut dispatcher, &sql_tx, entry);
    }
    drop(sql_tx);

    let mut sql_performance = match sql_worker {
        Some(handle) => handle.join().map_err(|_| PipelineError::SqlWorkerShutdown)?,
        None => dispatcher
            .sql
            .take()
            .map(Analyzer::finalize)
            .unwrap_or_default(),
    };

    let entries = dispatcher.entries;
    let min_ts = dispatcher.min_ts;
    let max_ts = dispatcher.max_ts;
    let events = dispatcher.events.finalize();
    let error_classes = dispatcher.error_classes.finalize();
    let maintenance = dispatcher.vacuum.finalize();
    let checkpoints = dispatcher.checkpoints.finalize();
    let connections = dispatcher.connections.finalize();
    let entity_counts = dispatcher.entities.finalize();
    let temp_files = dispatcher.temp_files.finalize();
    let locks = dispatcher.locks.finalize();

    collect_queries_without_duration(&mut sql_performance, &temp_files, &locks);

    let total_events: u64 = events.iter().map(|(_, c)| *c).sum();
    let event_counts = events
        .into_iter()
        .map(|(severity, count)| EventCount {
            kind: severity.as_str().to_string(),
            count,
            percentage: if total_events == 0 {
                0.0
            } else {
                count as f64 * 100.0 / total_events as f64
            },
        })
        .collect();

    let error_class_counts = error_classes
        .into_iter()
        .map(|(class_code, count)| ErrorClassCount {
            description: crate::analysis::error_classes::describe(&class_code).to_string(),
            class_code,
            count,
        })
        .collect();

    Ok(AggregatedMetrics {
        meta: Meta {
            format: format.as_str().to_string(),
            entries,
            bytes: total_bytes.max(byte_count),
            parse_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        },
        summary: Summary {
            total_logs: entries,
            start_date: min_ts.map(crate::util::format_timestamp),
            end_date: max_ts.map(crate::util::format_timestamp),
            duration_secs: match (min_ts, max_ts) {
                (Some(min), Some(max)) => (max - min).num_seconds(),
                _ => 0,
            },
        },
        events: event_counts,
        error_classes: error_class_counts,
        databases: entity_counts.databases,
        users: entity_counts.users,
        apps: entity_counts.apps,
        hosts: entity_counts.hosts,
        connections,
        sql_performance,
        temp_files,
        locks,
        checkpoints,
        maintenance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s1_basic_stderr_log_line_count_and_bytes() {
        let log = "2024-01-15 14:30:00 UTC [100]: LOG:  database system is ready to accept connections\n\
                   2024-01-15 14:30:05 UTC [101]: ERROR:  relation \"missing\" does not exist\n";
        let result = analyze_bytes(log.as_bytes(), Some(FormatTag::Stderr)).unwrap();
        assert_eq!(result.meta.entries, 2);
        assert_eq!(result.meta.format, "stderr");
        assert_eq!(result.events.iter().map(|e| e.count).sum::<u64>(), 2);
    }

    #[test]
    fn test_s2_error_class_extraction() {
        let log = "2024-01-15 14:30:00 UTC [100]: ERROR:  42P01: relation \"t\" does not exist\n";
        let result = analyze_bytes(log.as_bytes(), Some(FormatTag::Stderr)).unwrap();
        assert_eq!(result.error_classes.len(), 1);
        assert_eq!(result.error_classes[0].class_code, "42");
        assert_eq!(result.error_classes[0].description, "Syntax Error or Access Rule Violation");
    }

    #[test]
    fn test_s3_sql_duration_tracking() {
        let log = "2024-01-15 14:30:00 UTC [100]: LOG:  duration: 12.500 ms  statement: select * from t\n\
                   2024-01-15 14:30:01 UTC [100]: LOG:  duration: 7.500 ms  statement: select * from t\n";
        let result = analyze_bytes(log.as_bytes(), Some(FormatTag::Stderr)).unwrap();
        assert_eq!(result.sql_performance.total_queries_parsed, 2);
        assert_eq!(result.sql_performance.total_unique_queries, 1);
        assert_eq!(result.sql_performance.queries[0].count, 2);
    }

    #[test]
    fn test_s4_temp_file_and_query_association() {
        let log = "2024-01-15 14:30:00 UTC [100]: LOG:  temporary file: path \"base/pgsql_tmp/x\", size 2097152\nSTATEMENT:  select * from huge\n";
        let result = analyze_bytes(log.as_bytes(), Some(FormatTag::Stderr)).unwrap();
        assert_eq!(result.temp_files.total_messages, 1);
        assert_eq!(result.temp_files.total_size, "2.00 MB");
        assert_eq!(result.temp_files.queries.len(), 1);
    }

    #[test]
    fn test_s5_checkpoint_pairing() {
        let log = "2024-01-15 14:30:00 UTC [1]: LOG:  checkpoint starting: time\n\
                   2024-01-15 14:30:02 UTC [1]: LOG:  checkpoint complete: wrote 10 buffers (0.1%); 0 WAL file(s) added, 0 removed, 0 recycled; write=1.500 s, sync=0.200 s, total=2.000 s\n";
        let result = analyze_bytes(log.as_bytes(), Some(FormatTag::Stderr)).unwrap();
        assert_eq!(result.checkpoints.total_checkpoints, 1);
        assert_eq!(result.checkpoints.types["time"].count, 1);
        assert_eq!(result.checkpoints.max_checkpoint_time_ms, 2000.0);
    }

    #[test]
    fn test_summary_start_end_date_span() {
        let log = "2024-01-15 14:30:00 UTC [1]: LOG:  database system is ready\n\
                   2024-01-15 14:30:10 UTC [1]: LOG:  database system is ready\n";
        let result = analyze_bytes(log.as_bytes(), Some(FormatTag::Stderr)).unwrap();
        assert_eq!(result.summary.start_date.as_deref(), Some("2024-01-15 14:30:00"));
        assert_eq!(result.summary.end_date.as_deref(), Some("2024-01-15 14:30:10"));
        assert_eq!(result.summary.duration_secs, 10);
    }

    #[test]
    fn test_s6_empty_input_produces_zeroed_metrics() {
        let result = analyze_bytes(b"", Some(FormatTag::Stderr)).unwrap();
        assert_eq!(result.meta.entries, 0);
        assert_eq!(result.sql_performance.total_queries_parsed, 0);
        assert!(result.events.is_empty());
    }

    #[test]
    fn test_parallel_worker_path_matches_inline_path() {
        let log = "2024-01-15 14:30:00 UTC [1]: LOG:  duration: 5.000 ms  statement: select 1\n";
        let inline = analyze_bytes(log.as_bytes(), Some(FormatTag::Stderr)).unwrap();
        let parallel = analyze_reader(
            Cursor::new(log.as_bytes()),
            log.len() as u64,
            Some(FormatTag::Stderr),
            Some(0), // force the worker path regardless of actual size
            Some(4),
        )
        .unwrap();
        assert_eq!(inline.sql_performance.total_queries_parsed, parallel.sql_performance.total_queries_parsed);
    }
}
