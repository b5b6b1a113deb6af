//! Sample source: decodes a delimited results file and pushes every row,
//! in file order, into a root consumer.

use super::consumer::{Emitter, SampleConsumer};
use crate::error::{ReportError, SampleDecodeError};
use crate::sample::{Sample, CONTROLLER_MESSAGE_PREFIX};
use clap::ValueEnum;
use csv::{ErrorKind, ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const TIMESTAMP_COLUMN: &str = "timeStamp";
pub const ELAPSED_COLUMN: &str = "elapsed";
pub const LABEL_COLUMN: &str = "label";
pub const SUCCESS_COLUMN: &str = "success";
pub const BYTES_COLUMN: &str = "bytes";
pub const SENT_BYTES_COLUMN: &str = "sentBytes";
pub const THREAD_NAME_COLUMN: &str = "threadName";
pub const IS_CONTROLLER_COLUMN: &str = "isController";
pub const RESPONSE_MESSAGE_COLUMN: &str = "responseMessage";

/// What the timestamp column denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    /// Sample start time
    #[default]
    Start,
    /// Sample end time
    End,
}

/// Row counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    pub rows_read: u64,
    pub rows_skipped: u64,
    pub samples_emitted: u64,
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone)]
struct ColumnMap {
    width: usize,
    timestamp: usize,
    elapsed: usize,
    label: usize,
    success: usize,
    bytes: usize,
    sent_bytes: usize,
    thread_name: usize,
    is_controller: Option<usize>,
    response_message: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &StringRecord) -> Result<Self, String> {
        let find = |name: &str| header.iter().position(|h| h.trim() == name);
        let require = |name: &str| find(name).ok_or_else(|| format!("header has no '{}' column", name));
        Ok(Self {
            width: header.len(),
            timestamp: require(TIMESTAMP_COLUMN)?,
            elapsed: require(ELAPSED_COLUMN)?,
            label: require(LABEL_COLUMN)?,
            success: require(SUCCESS_COLUMN)?,
            bytes: require(BYTES_COLUMN)?,
            sent_bytes: require(SENT_BYTES_COLUMN)?,
            thread_name: require(THREAD_NAME_COLUMN)?,
            is_controller: find(IS_CONTROLLER_COLUMN),
            response_message: find(RESPONSE_MESSAGE_COLUMN),
        })
    }

    fn decode(&self, record: &StringRecord, mode: TimestampMode) -> Result<Sample, SampleDecodeError> {
        if record.len() != self.width {
            return Err(SampleDecodeError::FieldCount {
                expected: self.width,
                found: record.len(),
            });
        }
        let field = |index: usize| record.get(index).unwrap_or("").trim();

        let timestamp = parse_int(TIMESTAMP_COLUMN, field(self.timestamp))?;
        let elapsed = parse_int(ELAPSED_COLUMN, field(self.elapsed))?;
        if elapsed < 0 {
            return Err(SampleDecodeError::NegativeElapsed(elapsed));
        }
        let success = parse_bool(SUCCESS_COLUMN, field(self.success))?;
        let bytes = parse_int(BYTES_COLUMN, field(self.bytes))?;
        let sent_bytes = parse_int(SENT_BYTES_COLUMN, field(self.sent_bytes))?;
        let controller = match (self.is_controller, self.response_message) {
            (Some(index), _) => parse_bool(IS_CONTROLLER_COLUMN, field(index))?,
            (None, Some(index)) => field(index).starts_with(CONTROLLER_MESSAGE_PREFIX),
            (None, None) => false,
        };

        let out_of_range = || SampleDecodeError::TimestampOutOfRange { timestamp, elapsed };
        let start = match mode {
            TimestampMode::Start => timestamp,
            TimestampMode::End => timestamp.checked_sub(elapsed).ok_or_else(out_of_range)?,
        };
        if start < 0 || start.checked_add(elapsed).is_none() {
            return Err(out_of_range());
        }
        Ok(Sample::new(field(self.label), start, elapsed, success)
            .with_bytes(bytes, sent_bytes)
            .with_thread_name(field(self.thread_name))
            .with_controller(controller))
    }
}

fn parse_int(field: &'static str, value: &str) -> Result<i64, SampleDecodeError> {
    value.parse().map_err(|_| SampleDecodeError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, SampleDecodeError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(SampleDecodeError::InvalidField {
            field,
            value: value.to_string(),
        })
    }
}

/// Sequential reader over a persisted results file.
#[derive(Debug, Clone)]
pub struct SampleSource {
    path: PathBuf,
    delimiter: u8,
    timestamp_mode: TimestampMode,
}

impl SampleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            timestamp_mode: TimestampMode::Start,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_timestamp_mode(mut self, mode: TimestampMode) -> Self {
        self.timestamp_mode = mode;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<(csv::Reader<File>, ColumnMap), ReportError> {
        let file = File::open(&self.path).map_err(|_| ReportError::SourceMissing {
            path: self.path.clone(),
        })?;
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        let header = reader.headers().map_err(|e| self.malformed(e.to_string()))?;
        if header.is_empty() {
            return Err(self.malformed("missing header row".to_string()));
        }
        let columns = ColumnMap::from_header(header).map_err(|reason| self.malformed(reason))?;
        debug!("Opened results file {} with columns {:?}", self.path.display(), columns);
        Ok((reader, columns))
    }

    fn malformed(&self, reason: String) -> ReportError {
        ReportError::MalformedSource {
            path: self.path.clone(),
            reason,
        }
    }

    /// Decode the whole file into `sink`.
    ///
    /// Structural problems (missing file, unreadable or incomplete header)
    /// fail before `sink.start()`. Rows that cannot be decoded are logged
    /// and skipped. Otherwise `start` and `finish` are each called exactly
    /// once, also for a file with no data rows.
    pub fn run<C: SampleConsumer + ?Sized>(&self, sink: &mut C) -> Result<SourceStats, ReportError> {
        let (mut reader, columns) = self.open()?;
        let mut stats = SourceStats::default();
        let mut out = Emitter::new();
        let mut record = StringRecord::new();

        sink.start();
        loop {
            let line = reader.position().line();
            match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => {
                    stats.rows_read += 1;
                    match columns.decode(&record, self.timestamp_mode) {
                        Ok(sample) => {
                            sink.consume(&sample, 0, &mut out);
                            stats.samples_emitted += 1;
                        }
                        Err(e) => {
                            warn!("Skipping row at line {} of {}: {}", line, self.path.display(), e);
                            stats.rows_skipped += 1;
                        }
                    }
                }
                Err(e) => match e.kind() {
                    ErrorKind::Io(io) => {
                        return Err(ReportError::Processing {
                            path: self.path.clone(),
                            reason: io.to_string(),
                        });
                    }
                    ErrorKind::Utf8 { .. } => {
                        warn!(
                            "Skipping row at line {} of {}: {}",
                            line,
                            self.path.display(),
                            SampleDecodeError::Encoding
                        );
                        stats.rows_read += 1;
                        stats.rows_skipped += 1;
                    }
                    _ => {
                        warn!("Skipping row at line {} of {}: {}", line, self.path.display(), e);
                        stats.rows_read += 1;
                        stats.rows_skipped += 1;
                    }
                },
            }
        }
        sink.finish(&mut out);

        debug!(
            "Read {} rows from {} ({} skipped)",
            stats.rows_read,
            self.path.display(),
            stats.rows_skipped
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "timeStamp,elapsed,label,responseCode,responseMessage,threadName,success,bytes,sentBytes";

    #[derive(Default)]
    struct Collect {
        started: u32,
        finished: u32,
        samples: Vec<Sample>,
    }

    impl SampleConsumer for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        fn start(&mut self) {
            self.started += 1;
        }

        fn consume(&mut self, sample: &Sample, _channel: usize, _out: &mut Emitter) {
            self.samples.push(sample.clone());
        }

        fn finish(&mut self, _out: &mut Emitter) {
            self.finished += 1;
        }
    }

    fn write_file(dir: &tempfile::TempDir, contents: &[u8]) -> PathBuf {
        let path = dir.path().join("results.csv");
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_reads_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}\n1000,120,home,200,OK,tg 1-1,true,512,64\n1100,30,login,500,Error,tg 1-2,false,10,5\n",
            HEADER
        );
        let path = write_file(&dir, body.as_bytes());

        let mut sink = Collect::default();
        let stats = SampleSource::new(&path).run(&mut sink).unwrap();
        assert_eq!(stats.rows_read, 2);
        assert_eq!(stats.samples_emitted, 2);
        assert_eq!((sink.started, sink.finished), (1, 1));
        assert_eq!(sink.samples[0].label(), "home");
        assert_eq!(sink.samples[0].end_time(), 1_120);
        assert_eq!(sink.samples[0].bytes_received(), 512);
        assert_eq!(sink.samples[1].thread_name(), "tg 1-2");
        assert!(!sink.samples[1].success());
    }

    #[test]
    fn test_malformed_row_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}\n1000,120,a,200,OK,t,true,1,1\n1001,abc,a,200,OK,t,true,1,1\n1002,5,a,200,OK,t\n1003,7,a,200,OK,t,TRUE,1,1\n",
            HEADER
        );
        let path = write_file(&dir, body.as_bytes());

        let mut sink = Collect::default();
        let stats = SampleSource::new(&path).run(&mut sink).unwrap();
        assert_eq!(stats.rows_read, 4);
        assert_eq!(stats.rows_skipped, 2);
        assert_eq!(sink.samples.len(), 2);
    }

    #[test]
    fn test_out_of_range_timestamps_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}\n-9223372036854775808,50,a,200,OK,t,true,1,1\n1000,50,a,200,OK,t,true,1,1\n",
            HEADER
        );
        let path = write_file(&dir, body.as_bytes());

        let mut sink = Collect::default();
        let stats = SampleSource::new(&path).run(&mut sink).unwrap();
        assert_eq!(stats.rows_read, 2);
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(sink.samples.len(), 1);
        assert_eq!(sink.samples[0].start_time(), 1_000);
    }

    #[test]
    fn test_end_timestamp_before_epoch_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}\n-9223372036854775807,50,a,200,OK,t,true,1,1\n30,50,a,200,OK,t,true,1,1\n100,50,a,200,OK,t,true,1,1\n",
            HEADER
        );
        let path = write_file(&dir, body.as_bytes());

        let mut sink = Collect::default();
        let stats = SampleSource::new(&path)
            .with_timestamp_mode(TimestampMode::End)
            .run(&mut sink)
            .unwrap();
        assert_eq!(stats.rows_skipped, 2);
        assert_eq!(sink.samples.len(), 1);
        assert_eq!(sink.samples[0].start_time(), 50);
    }

    #[test]
    fn test_header_only_still_starts_and_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, format!("{}\n", HEADER).as_bytes());
        let mut sink = Collect::default();
        let stats = SampleSource::new(&path).run(&mut sink).unwrap();
        assert_eq!(stats, SourceStats::default());
        assert_eq!((sink.started, sink.finished), (1, 1));
    }

    #[test]
    fn test_structural_errors_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = Collect::default();

        let missing = SampleSource::new(dir.path().join("nope.csv")).run(&mut sink);
        assert!(matches!(missing, Err(ReportError::SourceMissing { .. })));

        let path = write_file(&dir, b"timeStamp,elapsed,label\n1,2,a\n");
        let malformed = SampleSource::new(&path).run(&mut sink);
        assert!(matches!(malformed, Err(ReportError::MalformedSource { .. })));

        assert_eq!(sink.started, 0);
    }

    #[test]
    fn test_controller_detection_and_end_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}\n2000;500;tx;200;Number of samples in transaction : 2;t;true;0;0\n",
            HEADER.replace(',', ";")
        );
        let path = write_file(&dir, body.as_bytes());

        let mut sink = Collect::default();
        SampleSource::new(&path)
            .with_delimiter(b';')
            .with_timestamp_mode(TimestampMode::End)
            .run(&mut sink)
            .unwrap();
        assert!(sink.samples[0].is_controller());
        assert_eq!(sink.samples[0].start_time(), 1_500);
        assert_eq!(sink.samples[0].end_time(), 2_000);
    }

    #[test]
    fn test_explicit_controller_column() {
        let dir = tempfile::tempdir().unwrap();
        let body = "timeStamp,elapsed,label,threadName,success,bytes,sentBytes,isController\n\
                    1,2,a,t,true,0,0,true\n\
                    1,2,b,t,true,0,0,false\n";
        let path = write_file(&dir, body.as_bytes());
        let mut sink = Collect::default();
        SampleSource::new(&path).run(&mut sink).unwrap();
        assert!(sink.samples[0].is_controller());
        assert!(!sink.samples[1].is_controller());
    }
}
