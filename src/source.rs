//! Lazy sample streams and their combinators.
use std::io::BufRead;

use tracing::warn;

use crate::{error::SampleError, sample::Sample};

/// A lazy, finite, forward-only stream of samples.
///
/// `read_sample` yields `Ok(Some(_))` per sample, `Ok(None)` at end of
/// stream, and `Err(_)` on failure. Terminal conditions latch: after the
/// first `Err` every call repeats that error, and after end of stream every
/// call keeps returning `Ok(None)`. Sources release their underlying
/// resources when dropped.
pub trait SampleSource {
    /// Produces the next sample in time order.
    fn read_sample(&mut self) -> Result<Option<Sample>, SampleError>;
}

/// Streams `<millis>,<energy>` records from a line-oriented reader.
///
/// A blank line ends the stream, as does a line starting with `<` (the
/// vendor endpoint sometimes trails an HTML fragment after its data). A
/// final line with no terminator is treated as an incomplete record and
/// ignored. Malformed lines fail the stream.
pub struct TextSampleSource<R> {
    reader: Option<R>,
    failed: Option<SampleError>,
}

impl<R: BufRead> TextSampleSource<R> {
    /// Wraps a buffered reader positioned at the first record.
    pub fn new(reader: R) -> TextSampleSource<R> {
        TextSampleSource {
            reader: Some(reader),
            failed: None,
        }
    }

    fn fail(&mut self, err: SampleError) -> Result<Option<Sample>, SampleError> {
        self.reader = None;
        self.failed = Some(err.clone());
        Err(err)
    }
}

impl<R: BufRead> SampleSource for TextSampleSource<R> {
    fn read_sample(&mut self) -> Result<Option<Sample>, SampleError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut line = String::new();
        let n = match reader.read_line(&mut line) {
            Ok(n) => n,
            Err(err) => return self.fail(err.into()),
        };
        if n == 0 || !line.ends_with('\n') {
            // End of data, or a record still being appended.
            self.reader = None;
            return Ok(None);
        }

        let record = line.trim_end_matches('\n');
        if record.is_empty() || record.starts_with('<') {
            self.reader = None;
            return Ok(None);
        }
        match Sample::parse_line(record) {
            Ok(sample) => Ok(Some(sample)),
            Err(err) => self.fail(err),
        }
    }
}

/// Yields a pre-built sequence of samples.
pub struct MemorySampleSource {
    samples: std::vec::IntoIter<Sample>,
}

impl MemorySampleSource {
    /// Wraps the samples to yield, in order.
    pub fn new(samples: Vec<Sample>) -> MemorySampleSource {
        MemorySampleSource {
            samples: samples.into_iter(),
        }
    }
}

impl SampleSource for MemorySampleSource {
    fn read_sample(&mut self) -> Result<Option<Sample>, SampleError> {
        Ok(self.samples.next())
    }
}

struct MergeInput {
    source: Box<dyn SampleSource>,
    head: Option<Sample>,
    done: bool,
}

/// Merges several sources into a single stream in non-decreasing time
/// order, ties resolved in favour of the earlier input.
///
/// Candidates that would step backwards relative to the last emitted sample
/// are dropped: strictly earlier timestamps, and readings whose cumulative
/// energy falls below the last emitted value. Meter directories overlap in
/// time and occasionally drift backwards, so the filter preserves a monotone
/// cumulative-energy stream without losing legitimate interleaved increases.
/// Samples that merely repeat the previous timestamp pass through.
pub struct MergedSampleSource {
    inputs: Vec<MergeInput>,
    last: Option<Sample>,
    failed: Option<SampleError>,
}

impl MergedSampleSource {
    /// Takes exclusive ownership of the inputs to merge.
    pub fn new(sources: Vec<Box<dyn SampleSource>>) -> MergedSampleSource {
        MergedSampleSource {
            inputs: sources
                .into_iter()
                .map(|source| MergeInput {
                    source,
                    head: None,
                    done: false,
                })
                .collect(),
            last: None,
            failed: None,
        }
    }
}

impl SampleSource for MergedSampleSource {
    fn read_sample(&mut self) -> Result<Option<Sample>, SampleError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        loop {
            for input in &mut self.inputs {
                if input.head.is_none() && !input.done {
                    match input.source.read_sample() {
                        Ok(Some(sample)) => input.head = Some(sample),
                        Ok(None) => input.done = true,
                        Err(err) => {
                            self.failed = Some(err.clone());
                            return Err(err);
                        }
                    }
                }
            }

            let mut best: Option<(usize, Sample)> = None;
            for (i, input) in self.inputs.iter().enumerate() {
                if let Some(head) = input.head
                    && best.is_none_or(|(_, b)| head.time < b.time)
                {
                    best = Some((i, head));
                }
            }
            let Some((index, candidate)) = best else {
                return Ok(None);
            };
            self.inputs[index].head = None;

            if let Some(last) = self.last {
                if candidate.time < last.time {
                    warn!(
                        "dropping out-of-order sample at {} behind {}",
                        candidate.time, last.time
                    );
                    continue;
                }
                if candidate.energy < last.energy {
                    warn!(
                        "dropping non-monotone reading at {}: {} WH below {} WH",
                        candidate.time, candidate.energy, last.energy
                    );
                    continue;
                }
            }
            self.last = Some(candidate);
            return Ok(Some(candidate));
        }
    }
}
