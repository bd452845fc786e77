// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors produced by catalog, view and aggregation operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Capture timestamp in a filename could not be parsed
    #[error("Malformed filename {name}: {reason}")]
    MalformedFilename { name: String, reason: String },

    /// A single export file could not be read or decoded
    #[error("Failed to read {}: {reason}", path.display())]
    FileReadFailure { path: PathBuf, reason: String },

    /// Interval bounds are reversed or unparseable
    #[error("Invalid time interval [{start}, {end}]")]
    InvalidTimeInterval { start: String, end: String },

    /// Bucket width must be a positive, finite number of seconds
    #[error("Invalid bucket size {0}s: must be > 0")]
    InvalidBucketSize(f64),

    /// Bucket width too small for the span it has to cover
    #[error("Too many buckets: {buckets} exceeds the limit of {max}")]
    TooManyBuckets { buckets: u64, max: usize },

    /// No row matches the requested identifiers
    #[error("Unknown identifier: no rows match {filter}")]
    UnknownIdentifier { filter: String },

    /// Column is neither registered for the log type nor present in any file
    #[error("Unknown column: {column}")]
    UnknownColumn { column: String },

    /// A reduction needs at least one column
    #[error("Reduction requires at least one column")]
    EmptyProjection,

    /// The directory holds no export of this log type
    #[error("No {log_type} log files")]
    NoLogFiles { log_type: String },

    /// Unrecognized log type, reduction or other keyword
    #[error("Cannot parse {what} from {value:?}")]
    Parse { what: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_yaml_ng::Error),

    /// A load worker panicked or was cancelled
    #[error("Worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn file_read<E: std::fmt::Display>(path: impl Into<PathBuf>, err: E) -> Self {
        Error::FileReadFailure {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn parse(what: &'static str, value: impl Into<String>) -> Self {
        Error::Parse {
            what,
            value: value.into(),
        }
    }
}

/// Result type for scheduler log operations
pub type Result<T> = std::result::Result<T, Error>;
