//! Meter sample directories and relevant-file selection.
use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::DateTime;
use glob::Pattern;
use tracing::{debug, warn};

use crate::{
    error::DirError,
    samplefile::FileInfo,
    source::{MergedSampleSource, SampleSource},
    timerange::TimeRange,
};

/// Default pattern for sample files within a meter directory.
pub const DEFAULT_SAMPLE_GLOB: &str = "*.sample";

/// All inspected sample files of one meter.
///
/// Rebuilt from disk on demand and never incrementally mutated; the file
/// list is ordered by first-sample time.
#[derive(Debug, Clone)]
pub struct MeterSampleDir {
    /// The directory that was scanned.
    pub path: PathBuf,
    /// Inspected files, ordered by first-sample time.
    pub files: Vec<FileInfo>,
    /// Span from the earliest first sample to the latest last sample.
    pub range: TimeRange,
}

/// Scans `dir` for sample files matching `pattern` and inspects each one.
///
/// Files whose inspection fails are skipped with a warning; the scan fails
/// only when the directory is absent or yields no valid files at all.
pub fn read_sample_dir(dir: &Path, pattern: &str) -> Result<MeterSampleDir, DirError> {
    let pattern = Pattern::new(pattern).map_err(|source| DirError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(DirError::NoSamples(dir.to_path_buf()));
        }
        Err(err) => return Err(DirError::Io(err)),
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !pattern.matches(name) {
            continue;
        }
        match FileInfo::inspect(&path) {
            Ok(info) => files.push(info),
            Err(err) => warn!("skipping sample file {}: {err}", path.display()),
        }
    }
    if files.is_empty() {
        return Err(DirError::NoSamples(dir.to_path_buf()));
    }

    files.sort_by_key(|info| (info.first.time, info.last.time));
    let mut range = files[0].range();
    for info in &files[1..] {
        range = TimeRange::new(range.t0.min(info.first.time), range.t1.max(info.last.time));
    }
    debug!(
        dir = %dir.display(),
        files = files.len(),
        "scanned meter sample directory"
    );

    Ok(MeterSampleDir {
        path: dir.to_path_buf(),
        files,
        range,
    })
}

impl MeterSampleDir {
    /// Selects the files needed to cover `t` for interpolation.
    ///
    /// Every file overlapping `t` is included. When no included file
    /// contains the range start, the file ending latest at or before it is
    /// added so the interpolator has a sample just outside the boundary;
    /// the range end is bracketed the same way with the file starting
    /// earliest at or after it.
    fn relevant_files(&self, t: TimeRange) -> Vec<&FileInfo> {
        let mut selected = Vec::new();
        let mut have_start = false;
        let mut have_end = false;
        for info in &self.files {
            let r = info.range();
            if !r.overlaps(&t) {
                continue;
            }
            selected.push(info);
            have_start = have_start || r.contains(t.t0);
            have_end = have_end || r.contains(t.t1);
        }
        if !have_start
            && let Some(info) = self
                .files
                .iter()
                .filter(|info| info.last.time <= t.t0)
                .max_by_key(|info| info.last.time)
        {
            selected.push(info);
        }
        if !have_end
            && let Some(info) = self
                .files
                .iter()
                .filter(|info| info.first.time >= t.t1)
                .min_by_key(|info| info.first.time)
        {
            selected.push(info);
        }
        selected
    }

    /// Opens the files relevant to `t` merged into one source.
    ///
    /// A bound at the Unix epoch stands for "unbounded" and is replaced by
    /// the directory's own bound. Opening is cheap: each file's descriptor
    /// is only acquired once the merged stream reads past its cached first
    /// sample, and is released again when that file drains.
    pub fn open_range(&self, t: TimeRange) -> MergedSampleSource {
        let t = TimeRange::new(
            if t.t0 == DateTime::UNIX_EPOCH {
                self.range.t0
            } else {
                t.t0
            },
            if t.t1 == DateTime::UNIX_EPOCH {
                self.range.t1
            } else {
                t.t1
            },
        );
        let inputs = self
            .relevant_files(t)
            .into_iter()
            .map(|info| Box::new(info.open()) as Box<dyn SampleSource>)
            .collect();
        MergedSampleSource::new(inputs)
    }
}
