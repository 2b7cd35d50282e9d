//! Error handling for gridmeter.
use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::LocationTag;

/// Terminal conditions of a sample stream.
///
/// Sources latch the first error they produce and re-yield it on every
/// subsequent read, so the variants stay cheaply cloneable.
#[derive(Debug, Clone, Error)]
pub enum SampleError {
    /// A record that does not parse as `<millis>,<energy>`.
    #[error("Malformed sample line {line:?}: {reason}")]
    Parse {
        /// The offending text, without its line terminator.
        line: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Underlying file failure.
    #[error("Sample I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// The vendor endpoint returned something other than the requested CSV,
    /// or its rows could not be interpreted.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The fetch was cancelled before the stream finished.
    #[error("Fetch cancelled")]
    Cancelled,
}

impl From<std::io::Error> for SampleError {
    fn from(err: std::io::Error) -> Self {
        SampleError::Io(Arc::new(err))
    }
}

/// Terminal conditions of a usage stream.
#[derive(Debug, Clone, Error)]
pub enum UsageError {
    /// The underlying sample stream failed.
    #[error(transparent)]
    Source(#[from] SampleError),

    /// The source's first sample postdates the requested start instant, so
    /// there is nothing to interpolate from.
    #[error("No sample found before the start time: start {start}, first sample {first}")]
    NoSampleBeforeStart {
        /// The requested start of the usage stream.
        start: DateTime<Utc>,
        /// When the first available sample was actually taken.
        first: DateTime<Utc>,
    },
}

/// Error type for sample directory scanning.
#[derive(Debug, Error)]
pub enum DirError {
    /// The directory is missing or contains no readable sample files.
    #[error("No samples found in {0}")]
    NoSamples(PathBuf),

    /// The caller-supplied file pattern does not parse as a glob.
    #[error("Invalid sample file pattern {pattern:?}: {source}")]
    Pattern {
        /// The pattern as supplied.
        pattern: String,
        /// The underlying glob error.
        #[source]
        source: glob::PatternError,
    },

    /// Error enumerating the directory.
    #[error("Failed to read sample directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The usage streams do not begin on a whole hour in the report timezone.
    #[error("Report start {0} is not on a whole-hour boundary")]
    UnalignedStart(DateTime<Utc>),

    /// The requested end instant is not on a whole hour.
    #[error("Report end {0} is not on a whole-hour boundary")]
    UnalignedEnd(DateTime<Utc>),

    /// The usage quantum does not evenly divide an hour.
    #[error("Quantum of {0}s does not evenly divide an hour")]
    QuantumIndivisible(i64),

    /// A location's usage stream ran out before the report end.
    #[error("Usage stream for '{location}' ended at {at} before the report end")]
    StreamEnded {
        /// Which stream came up short.
        location: LocationTag,
        /// Start of the quantum that could not be read.
        at: DateTime<Utc>,
    },

    /// A location's usage stream failed mid-report.
    #[error("Usage stream for '{location}' failed at {at}: {source}")]
    StreamFailed {
        /// Which stream failed.
        location: LocationTag,
        /// Start of the quantum that could not be read.
        at: DateTime<Utc>,
        /// The underlying usage error.
        #[source]
        source: UsageError,
    },

    /// Error writing a report row.
    #[error("Failed to write report: {0}")]
    Write(#[from] std::io::Error),
}

/// Error type for report cataloguing.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A configured meter directory could not be scanned.
    #[error("Meter directory {dir:?} for location '{location}': {source}")]
    Dir {
        /// The location the directory was configured under.
        location: LocationTag,
        /// The directory that failed.
        dir: PathBuf,
        /// The underlying scan error.
        #[source]
        source: DirError,
    },

    /// The location mapping does not cover all three report locations.
    #[error("No meter directories for location '{0}'")]
    MissingLocation(LocationTag),
}

/// Error type for meter configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading the configuration file.
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Error parsing JSON configuration.
    #[error("Invalid JSON config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configured timezone is not a known IANA name.
    #[error("Unknown timezone {0:?}")]
    Timezone(String),

    /// A location has no meter directories configured.
    #[error("Configuration missing meter directories for location '{0}'")]
    MissingLocation(LocationTag),

    /// The configured quantum cannot tile an hour.
    #[error("Quantum of {0} minutes does not evenly divide an hour")]
    Quantum(u32),
}
