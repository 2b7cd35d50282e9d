//! Point-in-time cumulative meter readings.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SampleError;

/// A single meter reading: total energy counted at an instant.
///
/// Meters report cumulative watt-hours since install, so a healthy stream
/// of samples is monotone non-decreasing in both fields. A timestamp equal
/// to the Unix epoch is the "absent" sentinel and never a legal sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Instant of the reading, millisecond precision.
    pub time: DateTime<Utc>,
    /// Total energy in watt-hours since meter install.
    pub energy: f64,
}

impl Sample {
    /// Creates a sample.
    pub fn new(time: DateTime<Utc>, energy: f64) -> Sample {
        Sample { time, energy }
    }

    /// Parses a `<millis>,<energy>` sample record.
    ///
    /// `<millis>` is an unsigned decimal count of milliseconds since the
    /// Unix epoch and `<energy>` a decimal watt-hour reading.
    pub fn parse_line(line: &str) -> Result<Sample, SampleError> {
        let (ms_text, energy_text) = line
            .split_once(',')
            .ok_or_else(|| parse_error(line, "expected `<millis>,<energy>`"))?;
        let ms: u64 = ms_text
            .parse()
            .map_err(|err| parse_error(line, &format!("bad timestamp: {err}")))?;
        let ms = i64::try_from(ms)
            .map_err(|_| parse_error(line, "timestamp out of range"))?;
        let energy: f64 = energy_text
            .parse()
            .map_err(|err| parse_error(line, &format!("bad energy: {err}")))?;
        if !energy.is_finite() || energy < 0.0 {
            return Err(parse_error(line, "energy must be a non-negative number"));
        }
        Ok(Sample {
            time: DateTime::UNIX_EPOCH + Duration::milliseconds(ms),
            energy,
        })
    }

    /// Renders the reading in sample-file record form, without a line
    /// terminator.
    pub fn format_line(&self) -> String {
        format!("{},{}", self.time.timestamp_millis(), self.energy)
    }

    /// Whether the timestamp is the epoch sentinel for "absent".
    pub fn is_absent(&self) -> bool {
        self.time == DateTime::UNIX_EPOCH
    }
}

fn parse_error(line: &str, reason: &str) -> SampleError {
    SampleError::Parse {
        line: line.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_record() {
        let s = Sample::parse_line("90000,1234.5").unwrap();
        assert_eq!(s.time, DateTime::UNIX_EPOCH + Duration::seconds(90));
        assert_eq!(s.energy, 1234.5);
    }

    #[test]
    fn rejects_malformed_records() {
        for line in [
            "",
            "1234",
            "abc,5",
            "1000,abc",
            "-5,10",
            "1000,-3.5",
            "1000,inf",
            "99999999999999999999999,1",
        ] {
            let err = Sample::parse_line(line).unwrap_err();
            assert!(
                matches!(err, SampleError::Parse { .. }),
                "line {line:?} gave {err:?}"
            );
            assert!(err.to_string().contains(line));
        }
    }

    #[test]
    fn round_trips_canonical_records() {
        for line in ["0,0", "90000,1234.5", "1700000000000,50000"] {
            let s = Sample::parse_line(line).unwrap();
            assert_eq!(s.format_line(), line);
        }
    }

    #[test]
    fn epoch_timestamp_is_the_absent_sentinel() {
        assert!(Sample::parse_line("0,12").unwrap().is_absent());
        assert!(!Sample::parse_line("1,12").unwrap().is_absent());
    }
}
