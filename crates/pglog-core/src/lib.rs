//! Parses PostgreSQL server logs in any of the six recognized encodings and
//! aggregates them into a single [`AggregatedMetrics`] snapshot: event
//! counts, error classes, connection/session stats, SQL duration and
//! normalization, temp-file and lock activity, checkpoints, and autovacuum
//! maintenance.

pub mod analysis;
pub mod error;
pub mod finalize;
pub mod format;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod util;

pub use error::PipelineError;
pub use format::FormatTag;
pub use model::{AggregatedMetrics, QueryIdentity, Severity};
pub use pipeline::{analyze_bytes, analyze_reader, CHANNEL_CAPACITY, PARALLEL_THRESHOLD_BYTES};
