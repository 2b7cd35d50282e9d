//! Enumeration of producible monthly reports.
use std::{collections::BTreeMap, io::Write, path::Path};

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::{
    config::{LocationTag, MeterConfig},
    error::{CatalogError, ReportError},
    report::{ConsumerNames, ReportEngine},
    sampledir::{MeterSampleDir, read_sample_dir},
    timerange::TimeRange,
    usage::{InterpolatedUsage, SumUsage, UsageReader},
};

/// A monthly report the catalog judged producible from the sample
/// directories on disk.
///
/// Immutable once catalogued; the same file set always recomputes the same
/// report.
#[derive(Debug, Clone)]
pub struct Report {
    /// The meter directories feeding each location.
    pub meter_dirs: BTreeMap<LocationTag, Vec<MeterSampleDir>>,
    /// Hour-aligned span the report covers, clamped to data coverage.
    pub range: TimeRange,
    /// Timezone the report is rendered in.
    pub tz: Tz,
    /// Whether coverage falls short of the full calendar month.
    pub partial: bool,
}

impl Report {
    /// Builds the per-location usage pipelines over the catalogued files
    /// and writes the report CSV to `out`.
    pub fn write(
        &self,
        quantum: Duration,
        names: &ConsumerNames,
        out: &mut impl Write,
    ) -> Result<(), ReportError> {
        let engine = ReportEngine::new(self.tz, names.clone());
        engine.run(
            self.location_usage(LocationTag::Generator, quantum),
            self.location_usage(LocationTag::Here, quantum),
            self.location_usage(LocationTag::Neighbour, quantum),
            self.range.t1,
            out,
        )
    }

    /// One interpolating reader per meter directory of `tag`, summed.
    /// The catalog guarantees every reportable location has at least one
    /// directory.
    fn location_usage(&self, tag: LocationTag, quantum: Duration) -> SumUsage {
        let readers = self.meter_dirs[&tag]
            .iter()
            .map(|dir| {
                Box::new(InterpolatedUsage::new(
                    dir.open_range(self.range),
                    self.range.t0,
                    quantum,
                )) as Box<dyn UsageReader>
            })
            .collect();
        SumUsage::new(readers)
    }
}

/// Enumerates the monthly reports producible from the meter directories
/// under `root`.
///
/// Every configured directory must scan successfully. A month is
/// producible when, after intersecting each location's coverage and
/// snapping to hour boundaries, at least one hour of the month remains;
/// a month that is not fully covered yields a report marked partial.
pub fn catalog_reports(
    root: &Path,
    locations: &BTreeMap<LocationTag, Vec<String>>,
    pattern: &str,
    tz: Tz,
) -> Result<Vec<Report>, CatalogError> {
    let mut meter_dirs: BTreeMap<LocationTag, Vec<MeterSampleDir>> = BTreeMap::new();
    let mut loc_ranges: BTreeMap<LocationTag, TimeRange> = BTreeMap::new();
    for tag in LocationTag::REPORTABLE {
        let names = locations.get(&tag).map(Vec::as_slice).unwrap_or_default();
        if names.is_empty() {
            return Err(CatalogError::MissingLocation(tag));
        }
        for name in names {
            let path = root.join(name);
            let dir =
                read_sample_dir(&path, pattern).map_err(|source| CatalogError::Dir {
                    location: tag,
                    dir: path.clone(),
                    source,
                })?;
            loc_ranges
                .entry(tag)
                .and_modify(|range| *range = range.intersect(&dir.range))
                .or_insert(dir.range);
            meter_dirs.entry(tag).or_default().push(dir);
        }
    }

    let Some(total) = loc_ranges
        .values()
        .copied()
        .reduce(|acc, range| acc.intersect(&range))
    else {
        return Ok(Vec::new());
    };
    if total.is_empty() {
        debug!("meter locations never overlap; no reports producible");
        return Ok(Vec::new());
    }

    let constrained: Vec<TimeRange> = loc_ranges
        .values()
        .map(|range| constrain_to_hours(*range, tz))
        .collect();

    let mut reports = Vec::new();
    let start_local = total.t0.with_timezone(&tz);
    let (mut year, mut month) = (start_local.year(), start_local.month());
    loop {
        let Some(m0) = month_start(tz, year, month) else {
            warn!("skipping unresolvable month {year}-{month:02} in {tz}");
            (year, month) = next_month(year, month);
            continue;
        };
        if m0 > total.t1 {
            break;
        }
        (year, month) = next_month(year, month);
        let Some(m1) = month_start(tz, year, month) else {
            continue;
        };
        let month_range = TimeRange::new(m0, m1);
        let mut trange = month_range;
        for range in &constrained {
            trange = trange.intersect(range);
        }
        if trange.is_empty() {
            continue;
        }
        reports.push(Report {
            meter_dirs: meter_dirs.clone(),
            range: trange,
            tz,
            partial: trange != month_range,
        });
    }
    Ok(reports)
}

/// Enumerates reports as configured.
pub fn catalog_from_config(
    config: &MeterConfig,
    tz: Tz,
) -> Result<Vec<Report>, CatalogError> {
    catalog_reports(&config.root, &config.locations, &config.sample_glob, tz)
}

/// First instant of `(year, month)` in `tz`, as a UTC instant.
///
/// When a DST gap swallows local midnight the month starts when the clock
/// resumes.
fn month_start(tz: Tz, year: i32, month: u32) -> Option<DateTime<Utc>> {
    tz.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .earliest()
        .or_else(|| tz.with_ymd_and_hms(year, month, 1, 1, 0, 0).earliest())
        .map(|local| local.with_timezone(&Utc))
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

/// Clamps `range` inward to whole-hour boundaries of `tz`, the alignment
/// the report engine demands. In zones with fractional UTC offsets these
/// are not epoch hour multiples. Returns an empty range when no local hour
/// boundary lies within.
fn constrain_to_hours(range: TimeRange, tz: Tz) -> TimeRange {
    let t0 = ceil_to_hour(range.t0, tz);
    let t1 = floor_to_hour(range.t1, tz);
    if t1 < t0 {
        TimeRange::new(t0, t0)
    } else {
        TimeRange::new(t0, t1)
    }
}

/// Earliest instant at or after `t` with no sub-hour component in `tz`.
/// Each step is re-checked so an offset change mid-step cannot leave a
/// misaligned result.
fn ceil_to_hour(t: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let mut t = t;
    loop {
        let past = past_the_hour(t, tz);
        if past.is_zero() {
            return t;
        }
        t += Duration::hours(1) - past;
    }
}

/// Latest instant at or before `t` with no sub-hour component in `tz`.
fn floor_to_hour(t: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let mut t = t;
    loop {
        let past = past_the_hour(t, tz);
        if past.is_zero() {
            return t;
        }
        t -= past;
    }
}

/// How far `t` sits past the most recent local hour boundary of `tz`.
fn past_the_hour(t: DateTime<Utc>, tz: Tz) -> Duration {
    let local = t.with_timezone(&tz);
    Duration::minutes(i64::from(local.minute()))
        + Duration::seconds(i64::from(local.second()))
        + Duration::nanoseconds(i64::from(local.nanosecond()))
}
