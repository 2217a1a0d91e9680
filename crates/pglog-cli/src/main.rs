//! Thin command-line front end over `pglog-core`: a single pass over a log
//! file or stdin that dumps one JSON snapshot.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pglog_core::{analyze_reader, FormatTag, CHANNEL_CAPACITY, PARALLEL_THRESHOLD_BYTES};

#[derive(Parser, Debug)]
#[command(name = "pglog", about = "Analyze a PostgreSQL server log file")]
struct Args {
    /// Path to the log file. Reads stdin when omitted.
    path: Option<PathBuf>,

    /// Force a specific log format instead of auto-detecting it.
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Input size, in bytes, above which SQL-duration tracking runs on its
    /// own thread.
    #[arg(long, default_value_t = PARALLEL_THRESHOLD_BYTES)]
    parallel_threshold: u64,

    /// Capacity of the bounded channel feeding the parallel SQL worker.
    #[arg(long, default_value_t = CHANNEL_CAPACITY)]
    channel_capacity: usize,

    /// Pretty-print the output JSON.
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum FormatArg {
    Stderr,
    Csvlog,
    Jsonlog,
    SyslogBsd,
    SyslogRfc5424,
    Cnpg,
}

impl From<FormatArg> for FormatTag {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Stderr => FormatTag::Stderr,
            FormatArg::Csvlog => FormatTag::Csvlog,
            FormatArg::Jsonlog => FormatTag::Jsonlog,
            FormatArg::SyslogBsd => FormatTag::SyslogBsd,
            FormatArg::SyslogRfc5424 => FormatTag::SyslogRfc5424,
            FormatArg::Cnpg => FormatTag::Cnpg,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let (reader, total_bytes): (Box<dyn Read>, u64) = match &args.path {
        Some(path) => match File::open(path) {
            Ok(file) => {
                let len = file.metadata().map(|m| m.len()).unwrap_or(0);
                (Box::new(file), len)
            }
            Err(e) => {
                eprintln!("pglog: cannot open {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => (Box::new(io::stdin()), 0),
    };

    let result = analyze_reader(
        reader,
        total_bytes,
        args.format.map(FormatTag::from),
        Some(args.parallel_threshold),
        Some(args.channel_capacity),
    );

    let metrics = match result {
        Ok(metrics) => metrics,
        Err(e) => {
            eprintln!("pglog: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stdout = io::stdout();
    let write_result = if args.pretty {
        serde_json::to_writer_pretty(stdout.lock(), &metrics)
    } else {
        serde_json::to_writer(stdout.lock(), &metrics)
    };

    if let Err(e) = write_result {
        eprintln!("pglog: failed to write output: {e}");
        return ExitCode::FAILURE;
    }
    println!();

    ExitCode::SUCCESS
}
