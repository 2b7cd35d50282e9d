//! Command-line interface for gridmeter.
use clap::{Parser, Subcommand};
use std::str::FromStr;
use tracing::level_filters::LevelFilter;

use crate::sampledir::DEFAULT_SAMPLE_GLOB;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let lowercase = trimmed.to_ascii_lowercase();
        let level = match lowercase.as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for gridmeter.
#[derive(Parser)]
#[command(name = "gridmeter", version, author)]
#[command(about = "Energy-meter sample reports and billing allocation", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for gridmeter.
#[derive(Subcommand)]
pub enum Commands {
    /// List the monthly reports producible from the configured meters.
    Catalog {
        /// Path to the meter configuration file (defaults to `gridmeter.json`).
        #[arg(short, long, default_value = "gridmeter.json")]
        config: String,
    },

    /// Write the billing report CSV for one month.
    Report {
        /// Path to the meter configuration file (defaults to `gridmeter.json`).
        #[arg(short, long, default_value = "gridmeter.json")]
        config: String,

        /// Month to report, as `YYYY-MM`.
        month: String,

        /// Output file (stdout when omitted).
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Show the inspected coverage of each sample file in a meter directory.
    Inspect {
        /// The meter directory to scan.
        dir: String,

        /// Glob selecting sample files within the directory.
        #[arg(short, long, default_value = DEFAULT_SAMPLE_GLOB)]
        glob: String,
    },

    /// Fetch samples from a meter's energy-log endpoint into sample records.
    Fetch {
        /// Meter host, e.g. `10.0.1.20`.
        #[arg(long)]
        host: String,

        /// IANA timezone the meter reports its naive timestamps in.
        #[arg(long, default_value = "UTC")]
        meter_tz: String,

        /// Start of the requested range, RFC 3339.
        #[arg(long)]
        from: String,

        /// End of the requested range, RFC 3339.
        #[arg(long)]
        to: String,

        /// Sample file to append to (stdout when omitted).
        #[arg(short, long)]
        out: Option<String>,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
