//! Energy-meter sample streams and hourly billing reports.

#![warn(unused_crate_dependencies)]
// These dependencies are only used in the binary (src/bin/main.rs)
// Test dependencies are only used in test code
#[cfg(test)]
use assert_cmd as _;
use ctrlc as _;
#[cfg(test)]
use predicates as _;
use strum as _;
use tracing_subscriber as _;

/// Chargeable-power allocation.
pub mod allocate;

/// Monthly report catalog.
pub mod catalog;

/// CLI parsing.
pub mod cli;

/// Meter configuration.
pub mod config;

/// Errors.
pub mod error;

/// Vendor energy-log fetching.
pub mod http;

/// Hourly report engine.
pub mod report;

/// Sample records.
pub mod sample;

/// Sample file inspection and streaming.
pub mod samplefile;

/// Meter sample directories.
pub mod sampledir;

/// Sample streams.
pub mod source;

/// Time intervals.
pub mod timerange;

/// Usage interpolation.
pub mod usage;
