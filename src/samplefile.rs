//! Sample files: cheap inspection and deferred-open streaming.
use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Seek, SeekFrom},
    path::PathBuf,
};

use tracing::debug;

use crate::{
    error::SampleError,
    sample::Sample,
    source::{SampleSource, TextSampleSource},
    timerange::TimeRange,
};

/// How far back from end-of-file the last-record scan starts. Records are a
/// couple of dozen bytes, so this window always holds at least one.
const TAIL_SCAN_BYTES: u64 = 50;

/// Metadata captured when a sample file is first inspected.
///
/// The first and last samples are recorded once and are immutable
/// thereafter; records appended to the file after inspection are invisible
/// through this handle.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Where the file lives.
    pub path: PathBuf,
    /// The file's first record.
    pub first: Sample,
    /// The file's last complete record at inspection time.
    pub last: Sample,
}

impl FileInfo {
    /// Reads the first and last complete records of the file at `path`
    /// without keeping it open.
    ///
    /// The last record is found by scanning a short tail window; a final
    /// line with no terminator is discarded as incomplete. Fails when the
    /// file holds no complete records or its first record carries the
    /// epoch "absent" timestamp.
    pub fn inspect(path: impl Into<PathBuf>) -> Result<FileInfo, SampleError> {
        let path = path.into();
        let mut reader = BufReader::new(File::open(&path)?);

        let mut first_line = String::new();
        reader.read_line(&mut first_line)?;
        if !first_line.ends_with('\n') {
            return Err(SampleError::Parse {
                line: first_line,
                reason: "file contains no complete sample records".to_string(),
            });
        }
        let first = Sample::parse_line(first_line.trim_end_matches('\n'))?;
        if first.is_absent() {
            return Err(SampleError::Parse {
                line: first_line.trim_end_matches('\n').to_string(),
                reason: "first sample carries the zero timestamp".to_string(),
            });
        }

        let mut file = reader.into_inner();
        let len = file.metadata()?.len();
        file.seek(SeekFrom::Start(len.saturating_sub(TAIL_SCAN_BYTES)))?;
        let mut tail = String::new();
        file.read_to_string(&mut tail)?;

        let Some(complete_end) = tail.rfind('\n') else {
            return Err(SampleError::Parse {
                line: tail,
                reason: "no complete record in file tail".to_string(),
            });
        };
        let complete = &tail[..complete_end];
        let last_line = complete.rsplit('\n').next().unwrap_or(complete);
        let last = Sample::parse_line(last_line)?;

        Ok(FileInfo { path, first, last })
    }

    /// The interval spanned by the inspected first and last samples.
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.first.time, self.last.time)
    }

    /// Opens the file as a sample source with a deferred body open.
    pub fn open(&self) -> SampleFileSource {
        SampleFileSource {
            info: self.clone(),
            state: FileSourceState::Fresh,
            failed: None,
        }
    }
}

enum FileSourceState {
    /// Nothing read yet; the first sample is served from the inspection.
    Fresh,
    /// First sample served; the file opens on the next read.
    Deferred,
    /// Descriptor open, streaming records after the first line.
    Streaming(TextSampleSource<BufReader<File>>),
    /// Stream finished; the descriptor is released and never reopened.
    Done,
}

/// Sample source over an inspected file.
///
/// The first read is served from the inspected first sample without
/// touching disk, so thousands of these handles can coexist while the
/// number of open descriptors stays bounded by the handles actually
/// mid-stream. The descriptor opens on the second read and is released at
/// end of stream; records appended after inspection completed are never
/// released by a source that already reached end of stream.
pub struct SampleFileSource {
    info: FileInfo,
    state: FileSourceState,
    failed: Option<SampleError>,
}

impl SampleFileSource {
    fn fail(&mut self, err: SampleError) -> Result<Option<Sample>, SampleError> {
        self.failed = Some(err.clone());
        Err(err)
    }

    fn resume(
        &mut self,
        mut inner: TextSampleSource<BufReader<File>>,
    ) -> Result<Option<Sample>, SampleError> {
        match inner.read_sample() {
            Ok(Some(sample)) => {
                self.state = FileSourceState::Streaming(inner);
                Ok(Some(sample))
            }
            // Dropping the inner source here closes the descriptor.
            Ok(None) => {
                debug!(path = %self.info.path.display(), "sample file drained");
                Ok(None)
            }
            Err(err) => self.fail(err),
        }
    }
}

impl SampleSource for SampleFileSource {
    fn read_sample(&mut self) -> Result<Option<Sample>, SampleError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        match std::mem::replace(&mut self.state, FileSourceState::Done) {
            FileSourceState::Fresh => {
                self.state = FileSourceState::Deferred;
                Ok(Some(self.info.first))
            }
            FileSourceState::Deferred => {
                let file = match File::open(&self.info.path) {
                    Ok(file) => file,
                    Err(err) => return self.fail(err.into()),
                };
                debug!(path = %self.info.path.display(), "opened sample file body");
                let mut reader = BufReader::new(file);
                let mut skipped = String::new();
                match reader.read_line(&mut skipped) {
                    Ok(0) => return Ok(None),
                    Ok(_) => {}
                    Err(err) => return self.fail(err.into()),
                }
                self.resume(TextSampleSource::new(reader))
            }
            FileSourceState::Streaming(inner) => self.resume(inner),
            FileSourceState::Done => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write};

    use chrono::{DateTime, Duration};
    use tempfile::tempdir;

    use super::*;

    fn write_file(dir: &std::path::Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn drain(source: &mut impl SampleSource) -> Vec<Sample> {
        let mut out = Vec::new();
        while let Some(s) = source.read_sample().unwrap() {
            out.push(s);
        }
        out
    }

    #[test]
    fn inspect_reads_first_and_last_records() {
        let temp = tempdir().unwrap();
        let path = write_file(
            temp.path(),
            "a.sample",
            "1000,10\n2000,20\n3000,30\n4000,40\n",
        );
        let info = FileInfo::inspect(&path).unwrap();
        assert_eq!(info.first, Sample::parse_line("1000,10").unwrap());
        assert_eq!(info.last, Sample::parse_line("4000,40").unwrap());
        assert_eq!(
            info.range(),
            TimeRange::new(
                DateTime::UNIX_EPOCH + Duration::seconds(1),
                DateTime::UNIX_EPOCH + Duration::seconds(4),
            )
        );
    }

    #[test]
    fn inspect_ignores_a_trailing_partial_record() {
        let temp = tempdir().unwrap();
        let path = write_file(temp.path(), "a.sample", "1000,10\n2000,20\n3000,3");
        let info = FileInfo::inspect(&path).unwrap();
        assert_eq!(info.last, Sample::parse_line("2000,20").unwrap());
    }

    #[test]
    fn inspect_handles_a_single_record_file() {
        let temp = tempdir().unwrap();
        let path = write_file(temp.path(), "a.sample", "1000,10\n");
        let info = FileInfo::inspect(&path).unwrap();
        assert_eq!(info.first, info.last);
    }

    #[test]
    fn inspect_fails_on_empty_or_incomplete_files() {
        let temp = tempdir().unwrap();
        for contents in ["", "1000,10"] {
            let path = write_file(temp.path(), "a.sample", contents);
            assert!(FileInfo::inspect(&path).is_err(), "contents {contents:?}");
        }
    }

    #[test]
    fn inspect_rejects_the_zero_timestamp() {
        let temp = tempdir().unwrap();
        let path = write_file(temp.path(), "a.sample", "0,10\n1000,20\n");
        assert!(FileInfo::inspect(&path).is_err());
    }

    #[test]
    fn first_read_needs_no_descriptor() {
        let temp = tempdir().unwrap();
        let path = write_file(temp.path(), "a.sample", "1000,10\n2000,20\n");
        let info = FileInfo::inspect(&path).unwrap();
        fs::remove_file(&path).unwrap();

        let mut source = info.open();
        assert_eq!(
            source.read_sample().unwrap(),
            Some(Sample::parse_line("1000,10").unwrap())
        );
        // The body open happens on the second read and now fails.
        assert!(source.read_sample().is_err());
        assert!(source.read_sample().is_err());
    }

    #[test]
    fn streams_the_whole_file_once() {
        let temp = tempdir().unwrap();
        let path = write_file(temp.path(), "a.sample", "1000,10\n2000,20\n3000,30\n");
        let info = FileInfo::inspect(&path).unwrap();
        let mut source = info.open();
        let out = drain(&mut source);
        assert_eq!(out.len(), 3);
        assert_eq!(out[2], Sample::parse_line("3000,30").unwrap());
    }

    #[test]
    fn appends_after_end_of_stream_stay_invisible() {
        let temp = tempdir().unwrap();
        let path = write_file(temp.path(), "a.sample", "1000,10\n2000,20\n");
        let info = FileInfo::inspect(&path).unwrap();
        let mut source = info.open();
        assert_eq!(drain(&mut source).len(), 2);

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "3000,30").unwrap();
        // Once drained the source never rewinds or reopens.
        assert!(source.read_sample().unwrap().is_none());
    }
}
