//! Quantum-interval usage streams derived from sample sources.
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::{
    error::UsageError,
    sample::Sample,
    source::SampleSource,
};

/// A stream of uniform-interval energy deltas.
///
/// `read_usage` yields the watt-hours consumed over the next quantum,
/// `Ok(None)` once the underlying data runs out, and a latched error on
/// failure. Like sample sources, usage readers are single-owner pull
/// pipelines: terminal conditions latch and every later call repeats them.
pub trait UsageReader {
    /// Produces the energy delta for the next quantum.
    fn read_usage(&mut self) -> Result<Option<f64>, UsageError>;

    /// Start instant of the next interval `read_usage` will emit.
    fn time(&self) -> DateTime<Utc>;

    /// Interval width.
    fn quantum(&self) -> Duration;
}

/// Usage reader that linearly interpolates a sample source.
///
/// Emission `k` (zero-indexed) covers `[start + k*quantum,
/// start + (k+1)*quantum]`; the energy at each boundary is interpolated
/// between the two samples bracketing it, so gaps in the source spread
/// their energy evenly over the quanta they span — including across file
/// boundaries when the source is a merged directory stream.
pub struct InterpolatedUsage<S> {
    source: S,
    quantum: Duration,
    current: DateTime<Utc>,
    prev_energy: f64,
    s0: Sample,
    s1: Sample,
    started: bool,
    done: bool,
    failed: Option<UsageError>,
}

impl<S: SampleSource> InterpolatedUsage<S> {
    /// Creates a reader over `source` starting at `start`.
    ///
    /// # Panics
    ///
    /// Panics when `quantum` is not positive; that is a construction bug.
    pub fn new(source: S, start: DateTime<Utc>, quantum: Duration) -> InterpolatedUsage<S> {
        assert!(
            quantum > Duration::zero(),
            "usage quantum must be positive"
        );
        let placeholder = Sample::new(DateTime::UNIX_EPOCH, 0.0);
        InterpolatedUsage {
            source,
            quantum,
            current: start,
            prev_energy: 0.0,
            s0: placeholder,
            s1: placeholder,
            started: false,
            done: false,
            failed: None,
        }
    }

    /// Slides the bracketing pair forward until
    /// `s0.time <= current <= s1.time`, skipping samples that do not move
    /// strictly forward in time. Returns false when the source drains
    /// before a bracket is found.
    fn advance(&mut self) -> Result<bool, UsageError> {
        while self.current > self.s1.time {
            match self.source.read_sample()? {
                None => return Ok(false),
                Some(sample) => {
                    if sample.time <= self.s1.time {
                        warn!(
                            "skipping stale sample at {} behind {}",
                            sample.time, self.s1.time
                        );
                        continue;
                    }
                    self.s0 = self.s1;
                    self.s1 = sample;
                }
            }
        }
        Ok(true)
    }

    /// Acquires the initial bracketing pair around the start instant.
    /// Returns `Ok(false)` when the source drains first.
    fn start(&mut self) -> Result<bool, UsageError> {
        let first = loop {
            match self.source.read_sample()? {
                None => return Ok(false),
                Some(sample) => break sample,
            }
        };
        if first.time > self.current {
            return Err(UsageError::NoSampleBeforeStart {
                start: self.current,
                first: first.time,
            });
        }
        // A first sample exactly on the start instant plays both roles.
        self.s0 = first;
        self.s1 = first;
        if !self.advance()? {
            return Ok(false);
        }
        self.prev_energy = self.energy_at(self.current);
        self.started = true;
        Ok(true)
    }

    /// Linear interpolation between the bracketing samples, on f64
    /// millisecond offsets so multi-year spans stay in range.
    fn energy_at(&self, t: DateTime<Utc>) -> f64 {
        if self.s0.time == self.s1.time {
            return self.s1.energy;
        }
        let span = (self.s1.time - self.s0.time).num_milliseconds() as f64;
        let offset = (t - self.s0.time).num_milliseconds() as f64;
        self.s0.energy + (self.s1.energy - self.s0.energy) * offset / span
    }

    fn fail(&mut self, err: UsageError) -> Result<Option<f64>, UsageError> {
        self.failed = Some(err.clone());
        Err(err)
    }
}

impl<S: SampleSource> UsageReader for InterpolatedUsage<S> {
    fn read_usage(&mut self) -> Result<Option<f64>, UsageError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.done {
            return Ok(None);
        }
        if !self.started {
            match self.start() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(err) => return self.fail(err),
            }
        }
        self.current += self.quantum;
        match self.advance() {
            Ok(true) => {}
            Ok(false) => {
                self.done = true;
                return Ok(None);
            }
            Err(err) => return self.fail(err),
        }
        let energy = self.energy_at(self.current);
        let delta = energy - self.prev_energy;
        self.prev_energy = energy;
        Ok(Some(delta))
    }

    fn time(&self) -> DateTime<Utc> {
        self.current
    }

    fn quantum(&self) -> Duration {
        self.quantum
    }
}

/// Sums several usage readers that advance in lockstep.
///
/// The readers must agree on `time()` and `quantum()` before the first
/// read. The sum ends or fails as soon as any inner reader does, and
/// latches that terminal state.
pub struct SumUsage {
    readers: Vec<Box<dyn UsageReader>>,
    done: bool,
    failed: Option<UsageError>,
}

impl SumUsage {
    /// Takes ownership of the readers to sum.
    ///
    /// # Panics
    ///
    /// Panics when `readers` is empty or the readers disagree on `time()`
    /// or `quantum()`. Feeding inconsistent readers is a programming
    /// error, not an input error.
    pub fn new(readers: Vec<Box<dyn UsageReader>>) -> SumUsage {
        let first = readers
            .first()
            .expect("summed usage needs at least one reader");
        for reader in &readers[1..] {
            assert_eq!(
                reader.time(),
                first.time(),
                "summed usage readers must start at the same instant"
            );
            assert_eq!(
                reader.quantum(),
                first.quantum(),
                "summed usage readers must share a quantum"
            );
        }
        SumUsage {
            readers,
            done: false,
            failed: None,
        }
    }
}

impl UsageReader for SumUsage {
    fn read_usage(&mut self) -> Result<Option<f64>, UsageError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.done {
            return Ok(None);
        }
        let mut total = 0.0;
        for reader in &mut self.readers {
            match reader.read_usage() {
                Ok(Some(delta)) => total += delta,
                Ok(None) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(err) => {
                    self.failed = Some(err.clone());
                    return Err(err);
                }
            }
        }
        Ok(Some(total))
    }

    fn time(&self) -> DateTime<Utc> {
        self.readers[0].time()
    }

    fn quantum(&self) -> Duration {
        self.readers[0].quantum()
    }
}
