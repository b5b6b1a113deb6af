//! CSV persistence of samples while a test is running.
//!
//! The writer emits exactly the columns the [`SampleSource`] reads back, with
//! the timestamp column holding the sample start time.
//!
//! [`SampleSource`]: crate::report::source::SampleSource

use crate::error::ReportError;
use crate::report::source::{
    BYTES_COLUMN, ELAPSED_COLUMN, IS_CONTROLLER_COLUMN, LABEL_COLUMN, SENT_BYTES_COLUMN, SUCCESS_COLUMN,
    THREAD_NAME_COLUMN, TIMESTAMP_COLUMN,
};
use crate::sample::Sample;
use csv::WriterBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A results writer that may still hold buffered rows.
///
/// The report generator flushes it before reading the file it writes to.
pub trait FlushResults {
    fn results_path(&self) -> &Path;

    fn flush_results(&mut self) -> Result<(), ReportError>;
}

/// Buffered CSV writer for a results file.
pub struct ResultWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    written: u64,
}

impl ResultWriter {
    /// Create (or truncate) `path` and write the header row.
    pub fn create(path: impl Into<PathBuf>, delimiter: u8) -> Result<Self, ReportError> {
        let path = path.into();
        let file = File::create(&path)?;
        let mut writer = WriterBuilder::new().delimiter(delimiter).from_writer(file);
        writer
            .write_record([
                TIMESTAMP_COLUMN,
                ELAPSED_COLUMN,
                LABEL_COLUMN,
                THREAD_NAME_COLUMN,
                SUCCESS_COLUMN,
                BYTES_COLUMN,
                SENT_BYTES_COLUMN,
                IS_CONTROLLER_COLUMN,
            ])
            .map_err(|e| csv_error(&path, e))?;
        debug!("Writing results to {}", path.display());
        Ok(Self {
            path,
            writer,
            written: 0,
        })
    }

    pub fn write(&mut self, sample: &Sample) -> Result<(), ReportError> {
        self.writer
            .write_record([
                sample.start_time().to_string(),
                sample.elapsed().to_string(),
                sample.label().to_string(),
                sample.thread_name().to_string(),
                sample.success().to_string(),
                sample.bytes_received().to_string(),
                sample.bytes_sent().to_string(),
                sample.is_controller().to_string(),
            ])
            .map_err(|e| csv_error(&self.path, e))?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FlushResults for ResultWriter {
    fn results_path(&self) -> &Path {
        &self.path
    }

    fn flush_results(&mut self) -> Result<(), ReportError> {
        self.writer.flush()?;
        debug!("Flushed {} samples to {}", self.written, self.path.display());
        Ok(())
    }
}

fn csv_error(path: &Path, e: csv::Error) -> ReportError {
    ReportError::Processing {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
