//! Hour-by-hour billing report generation.
use std::io::Write;

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::{
    allocate::{Allocation, allocate},
    config::LocationTag,
    error::ReportError,
    usage::UsageReader,
};

/// Display names for the two consumers in report headers.
#[derive(Debug, Clone)]
pub struct ConsumerNames {
    /// Label for the on-site consumer.
    pub here: String,
    /// Label for the neighbouring consumer.
    pub neighbour: String,
}

impl Default for ConsumerNames {
    fn default() -> ConsumerNames {
        ConsumerNames {
            here: "here".to_string(),
            neighbour: "neighbour".to_string(),
        }
    }
}

/// Drives the three location streams through an aligned per-quantum loop
/// and writes one CSV row per completed hour.
pub struct ReportEngine {
    tz: Tz,
    names: ConsumerNames,
}

impl ReportEngine {
    /// Creates an engine rendering rows in `tz` with the given labels.
    pub fn new(tz: Tz, names: ConsumerNames) -> ReportEngine {
        ReportEngine { tz, names }
    }

    /// Pulls one quantum at a time from the three streams, allocates it,
    /// accumulates per hour, and writes header plus hourly rows to `out`.
    ///
    /// The streams must start on a whole hour in the report timezone, `end`
    /// must be on a whole hour, and the shared quantum must evenly divide
    /// an hour; all three are checked before anything is written. A stream
    /// that ends or fails before `end` fails the report, naming the stream
    /// and the quantum it could not deliver. A trailing part-hour before
    /// `end` is never emitted.
    ///
    /// # Panics
    ///
    /// Panics when the three readers disagree on `time()` or `quantum()`;
    /// wiring mismatched streams together is a construction bug.
    pub fn run(
        &self,
        mut generator: impl UsageReader,
        mut here: impl UsageReader,
        mut neighbour: impl UsageReader,
        end: DateTime<Utc>,
        out: &mut impl Write,
    ) -> Result<(), ReportError> {
        let start = generator.time();
        let quantum = generator.quantum();
        for reader in [&here as &dyn UsageReader, &neighbour] {
            assert_eq!(
                reader.time(),
                start,
                "report streams must start at the same instant"
            );
            assert_eq!(
                reader.quantum(),
                quantum,
                "report streams must share a quantum"
            );
        }

        if !self.hour_aligned(start) {
            return Err(ReportError::UnalignedStart(start));
        }
        if !self.hour_aligned(end) {
            return Err(ReportError::UnalignedEnd(end));
        }
        let quantum_ms = quantum.num_milliseconds();
        if quantum_ms <= 0 || Duration::hours(1).num_milliseconds() % quantum_ms != 0 {
            return Err(ReportError::QuantumIndivisible(quantum.num_seconds()));
        }

        writeln!(
            out,
            "Time,Export to grid (kWH),\
             Export power used by {here} (kWH),\
             Export power used by {neighbour} (kWH),\
             Import power used by {here} (kWH),\
             Import power used by {neighbour} (kWH)",
            here = self.names.here,
            neighbour = self.names.neighbour,
        )?;

        let mut total = Allocation::default();
        let mut accumulated = 0u32;
        let mut hour_start = start;
        let mut current = start;
        while current + quantum <= end {
            let generated = pull(&mut generator, LocationTag::Generator, current)?;
            let here_used = pull(&mut here, LocationTag::Here, current)?;
            let neighbour_used = pull(&mut neighbour, LocationTag::Neighbour, current)?;
            total.add(allocate(generated, here_used, neighbour_used));
            accumulated += 1;
            current += quantum;

            if self.hour_aligned(current) && accumulated > 0 {
                self.write_row(out, hour_start, &total)?;
                total = Allocation::default();
                accumulated = 0;
                hour_start = current;
            }
        }
        debug!(%start, %end, "report complete");
        Ok(())
    }

    /// Whether `t` has no sub-hour component in the report timezone.
    fn hour_aligned(&self, t: DateTime<Utc>) -> bool {
        let local = t.with_timezone(&self.tz);
        local.minute() == 0 && local.second() == 0 && local.nanosecond() == 0
    }

    fn write_row(
        &self,
        out: &mut impl Write,
        hour_start: DateTime<Utc>,
        total: &Allocation,
    ) -> Result<(), ReportError> {
        let stamp = hour_start.with_timezone(&self.tz).format("%Y-%m-%d %H:%M %Z");
        writeln!(
            out,
            "{stamp},{},{},{},{},{}",
            kwh(total.export_grid),
            kwh(total.export_here),
            kwh(total.export_neighbour),
            kwh(total.import_here),
            kwh(total.import_neighbour),
        )?;
        Ok(())
    }
}

/// Renders a watt-hour total as kWh with millikilowatt-hour precision.
fn kwh(wh: f64) -> String {
    format!("{:.3}", wh / 1000.0)
}

fn pull(
    reader: &mut impl UsageReader,
    location: LocationTag,
    at: DateTime<Utc>,
) -> Result<f64, ReportError> {
    match reader.read_usage() {
        Ok(Some(delta)) => Ok(delta),
        Ok(None) => Err(ReportError::StreamEnded { location, at }),
        Err(source) => Err(ReportError::StreamFailed {
            location,
            at,
            source,
        }),
    }
}
