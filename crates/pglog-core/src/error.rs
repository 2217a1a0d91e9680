//! Pipeline error type.
//!
//! A hand-rolled enum with a manual `Display`/`std::error::Error` impl
//! rather than `thiserror`/`anyhow`.

use std::fmt;

#[derive(Debug)]
pub enum PipelineError {
    Io(std::io::Error),
    SqlWorkerShutdown,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Io(e) => write!(f, "i/o error reading log stream: {e}"),
            PipelineError::SqlWorkerShutdown => {
                write!(f, "sql worker thread terminated before the stream was fully processed")
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Io(e) => Some(e),
            PipelineError::SqlWorkerShutdown => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e)
    }
}
