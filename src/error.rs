use std::num::ParseIntError;
use thiserror::Error;

/// Reasons a single input line is discarded by the frame reader.
#[derive(Debug, Error)]
pub enum FrameParseError {
    #[error("empty line")]
    EmptyLine,

    #[error("line contains non-ASCII bytes")]
    NotAscii,

    #[error("expected {expected} fields, got {got}")]
    FieldCount { expected: usize, got: usize },

    #[error("field {index} is empty")]
    EmptyField { index: usize },

    #[error("field {index} ({token:?}) is not an integer")]
    InvalidField {
        index: usize,
        token: String,
        #[source]
        source: ParseIntError,
    },
}

/// Numerical failures inside the wavelet stage.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("cannot decompose an empty window")]
    EmptyWindow,

    #[error("non-finite input sample at index {index}")]
    NonFiniteInput { index: usize },

    #[error("signal of length {len} is too short to decompose at level {level}")]
    SignalTooShort { len: usize, level: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Conditions surfaced by `EcgMonitor::poll`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The transport could not be opened or failed for good; the monitor is now disabled.
    #[error("connection failure: {0}")]
    ConnectionFailure(#[source] std::io::Error),

    /// A read failed; buffered bytes were dropped and the caller may retry.
    #[error("transport read failed: {0}")]
    Transport(#[source] std::io::Error),

    #[error("malformed frame: {0}")]
    Frame(#[from] FrameParseError),
}

impl PipelineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::ConnectionFailure(_))
    }
}
