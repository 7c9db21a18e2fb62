//! Error taxonomy for the averaging pipeline.
//!
//! Errors are `Clone` so that a single failure can be fanned out as a
//! `Failure` marker to every consumer of a channel. I/O sources are kept
//! behind an `Arc` for that reason.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// An input file or the input directory could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// Malformed header or row.
    #[error("{}:{line}: {reason}", .path.display())]
    Parse { path: PathBuf, line: usize, reason: String },

    /// No file under `dir` matched `pattern`.
    #[error("no input files matching '{pattern}' under {}", .dir.display())]
    EmptyInput { dir: PathBuf, pattern: String },

    /// A stage broke the end-of-stream protocol. Always a programming error.
    #[error("pipeline protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("invalid parameter '{parameter}': {reason}")]
    InvalidConfig { parameter: &'static str, reason: String },

    #[error("failed to write {}: {source}", .path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl PipelineError {
    pub fn file_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileRead { path: path.into(), source: Arc::new(source) }
    }

    pub fn parse(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::Parse { path: path.into(), line, reason: reason.into() }
    }

    pub fn output_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::OutputWrite { path: path.into(), source: Arc::new(source) }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation(reason.into())
    }

    /// Stable short label, used in logs and by the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileRead { .. } => "file-read",
            Self::Parse { .. } => "parse",
            Self::EmptyInput { .. } => "empty-input",
            Self::ProtocolViolation(_) => "protocol-violation",
            Self::InvalidConfig { .. } => "invalid-config",
            Self::OutputWrite { .. } => "output-write",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_message() {
        let err = PipelineError::parse("data/a.csv", 3, "expected 2 fields, found 3");
        let msg = format!("{err}");
        assert!(msg.contains("data/a.csv:3"));
        assert!(msg.contains("expected 2 fields"));
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_file_read_keeps_source() {
        let err = PipelineError::file_read(
            "missing.csv",
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        assert!(format!("{err}").contains("missing.csv"));
        assert!(std::error::Error::source(&err).is_some());
        let cloned = err.clone();
        assert_eq!(cloned.kind(), "file-read");
    }

    #[test]
    fn test_empty_input_message() {
        let err = PipelineError::EmptyInput { dir: PathBuf::from("data"), pattern: "*.csv".into() };
        assert!(format!("{err}").contains("'*.csv'"));
        assert_eq!(err.kind(), "empty-input");
    }
}
