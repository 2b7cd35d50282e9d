//! Vendor energy-log fetching.
use std::{
    io::Read,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::{
    error::SampleError, sample::Sample, source::SampleSource, timerange::TimeRange,
};

/// Offset between the vendor's epoch and the Unix epoch, in seconds.
const VENDOR_EPOCH_OFFSET_SECS: i64 = 315_532_800;

/// Streams samples from a meter's `Read_Energy.cgi` endpoint.
///
/// The endpoint is asked for CSV rows of `Date, Time, kWh` over a range
/// expressed in its own epoch; readings are normalized to watt-hours. Row
/// timestamps are naive and interpreted in the meter's configured
/// timezone. Rows before the requested start are skipped; a first row
/// already past the requested end means the upstream is confused and fails
/// the stream, while a later row past the end just finishes it.
pub struct HttpCsvSampleSource<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    range: TimeRange,
    tz: Tz,
    cancel: Option<Arc<AtomicBool>>,
    emitted: bool,
    done: bool,
    failed: Option<SampleError>,
}

impl HttpCsvSampleSource<reqwest::blocking::Response> {
    /// Issues the energy-log POST for `range` against `host` and prepares
    /// to stream the response body.
    ///
    /// `cancel` may be set from another thread (a Ctrl-C handler, say) to
    /// abort the stream between rows.
    pub fn fetch(
        host: &str,
        range: TimeRange,
        tz: Tz,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<HttpCsvSampleSource<reqwest::blocking::Response>, SampleError> {
        let url = format!("http://{host}/Read_Energy.cgi");
        let from = range.t0.timestamp() - VENDOR_EPOCH_OFFSET_SECS;
        let to = range.t1.timestamp() - VENDOR_EPOCH_OFFSET_SECS;
        debug!(%url, from, to, "fetching energy log");
        let response = reqwest::blocking::Client::new()
            .post(&url)
            .form(&[
                ("From", from.to_string()),
                ("To", to.to_string()),
                ("Fmt", "csv".to_string()),
            ])
            .send()
            .map_err(|err| {
                SampleError::Upstream(format!("energy log request failed: {err}"))
            })?;
        if !response.status().is_success() {
            return Err(SampleError::Upstream(format!(
                "energy log request returned {}",
                response.status()
            )));
        }
        HttpCsvSampleSource::from_reader(response, range, tz, cancel)
    }
}

impl<R: Read> HttpCsvSampleSource<R> {
    /// Wraps an already-open CSV body.
    pub fn from_reader(
        body: R,
        range: TimeRange,
        tz: Tz,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<HttpCsvSampleSource<R>, SampleError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(body);
        let headers = reader.headers().map_err(|err| {
            SampleError::Upstream(format!("malformed energy log header: {err}"))
        })?;
        let mut fields = headers.iter();
        if fields.next() != Some("Date")
            || fields.next() != Some("Time")
            || fields.next() != Some("kWh")
        {
            return Err(SampleError::Upstream(format!(
                "unexpected energy log columns {headers:?}"
            )));
        }
        Ok(HttpCsvSampleSource {
            records: reader.into_records(),
            range,
            tz,
            cancel,
            emitted: false,
            done: false,
            failed: None,
        })
    }

    fn parse_row(&self, record: &csv::StringRecord) -> Result<Sample, SampleError> {
        let field = |index: usize, name: &str| {
            record.get(index).ok_or_else(|| {
                SampleError::Upstream(format!("energy log row missing {name}: {record:?}"))
            })
        };
        let date = field(0, "date")?;
        let time = field(1, "time")?;
        let kwh = field(2, "kWh")?;

        let naive =
            NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%d-%m-%Y %H:%M:%S")
                .map_err(|err| {
                    SampleError::Upstream(format!(
                        "bad energy log timestamp {date:?} {time:?}: {err}"
                    ))
                })?;
        let local = self.tz.from_local_datetime(&naive).earliest().ok_or_else(|| {
            SampleError::Upstream(format!("nonexistent local time {naive} in {}", self.tz))
        })?;
        let kwh: f64 = kwh.parse().map_err(|err| {
            SampleError::Upstream(format!("bad energy log reading {kwh:?}: {err}"))
        })?;
        Ok(Sample::new(local.with_timezone(&Utc), kwh * 1000.0))
    }

    fn fail(&mut self, err: SampleError) -> Result<Option<Sample>, SampleError> {
        self.failed = Some(err.clone());
        Err(err)
    }
}

impl<R: Read> SampleSource for HttpCsvSampleSource<R> {
    fn read_sample(&mut self) -> Result<Option<Sample>, SampleError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.done {
            return Ok(None);
        }
        loop {
            if let Some(cancel) = &self.cancel
                && cancel.load(Ordering::Relaxed)
            {
                return self.fail(SampleError::Cancelled);
            }
            let Some(record) = self.records.next() else {
                self.done = true;
                return Ok(None);
            };
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    return self.fail(SampleError::Upstream(format!(
                        "malformed energy log row: {err}"
                    )));
                }
            };
            let sample = match self.parse_row(&record) {
                Ok(sample) => sample,
                Err(err) => return self.fail(err),
            };
            if sample.time < self.range.t0 {
                continue;
            }
            if sample.time > self.range.t1 {
                if !self.emitted {
                    return self.fail(SampleError::Upstream(format!(
                        "first sample at {} is beyond the requested end {}",
                        sample.time, self.range.t1
                    )));
                }
                self.done = true;
                return Ok(None);
            }
            self.emitted = true;
            return Ok(Some(sample));
        }
    }
}
