//! Trajectory sink
//!
//! Append-only text output, one file per run: a fixed `timestamp,imsi,x,y`
//! header followed by one row per estimate with coordinates at six decimal
//! places. Rows go through a buffered writer flushed every `flush_interval`
//! rows and on close, bounding unflushed loss on a crash. Sink I/O failures
//! are fatal to the run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use ranloc_common::{Error, PositionEstimate, SinkConfig};

/// Column header written once per run.
pub const SINK_HEADER: &str = "timestamp,imsi,x,y";

/// Buffered trajectory writer.
pub struct TrajectorySink {
    writer: BufWriter<File>,
    path: PathBuf,
    flush_interval: usize,
    rows_written: u64,
}

impl TrajectorySink {
    /// Creates the output file (truncating any previous run) and writes the
    /// header.
    pub fn create(config: &SinkConfig) -> Result<Self, Error> {
        let file = File::create(&config.path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{SINK_HEADER}")?;
        // Header lands on disk before the first flush interval elapses
        writer.flush()?;

        Ok(Self {
            writer,
            path: config.path.clone(),
            flush_interval: config.flush_interval.max(1),
            rows_written: 0,
        })
    }

    /// Appends one estimate row, flushing on the configured cadence.
    ///
    /// The row keeps the measurement timestamp, not the normalized one;
    /// the quality tag is not persisted (fixed header).
    pub fn write_row(&mut self, estimate: &PositionEstimate) -> Result<(), Error> {
        writeln!(
            self.writer,
            "{},{},{:.6},{:.6}",
            estimate.timestamp_ms, estimate.entity_id, estimate.x, estimate.y
        )?;
        self.rows_written += 1;
        if self.rows_written % self.flush_interval as u64 == 0 {
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Rows written so far, header excluded.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Flushes remaining rows; call before dropping the sink.
    pub fn close(&mut self) -> Result<(), Error> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranloc_common::EstimateQuality;

    fn sink_in(dir: &tempfile::TempDir, flush_interval: usize) -> TrajectorySink {
        let config = SinkConfig {
            path: dir.path().join("trajectory.txt"),
            flush_interval,
        };
        TrajectorySink::create(&config).unwrap()
    }

    fn row(timestamp_ms: i64, entity_id: u64, x: f64, y: f64) -> PositionEstimate {
        PositionEstimate {
            timestamp_ms,
            entity_id,
            x,
            y,
            quality: EstimateQuality::Converged,
        }
    }

    #[test]
    fn test_header_and_row_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(&dir, 50);

        sink.write_row(&row(1723575600123, 7, 812.5, 790.0)).unwrap();
        sink.write_row(&row(1723575600223, 7, 813.0, 790.25)).unwrap();
        assert_eq!(sink.rows_written(), 2);

        let path = sink.path().clone();
        sink.close().unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,imsi,x,y");
        assert_eq!(lines[1], "1723575600123,7,812.500000,790.000000");
        assert_eq!(lines[2], "1723575600223,7,813.000000,790.250000");
    }

    #[test]
    fn test_flush_interval_bounds_unflushed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(&dir, 2);
        let path = sink.path().clone();

        sink.write_row(&row(0, 1, 1.0, 1.0)).unwrap();
        // One unflushed row: file still holds only the header
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);

        sink.write_row(&row(100, 1, 2.0, 2.0)).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);

        sink.close().unwrap();
    }

    #[test]
    fn test_close_flushes_tail() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(&dir, 1000);
        let path = sink.path().clone();

        for i in 0..7 {
            sink.write_row(&row(i * 100, 1, i as f64, 0.0)).unwrap();
        }
        sink.close().unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 8);
    }

    #[test]
    fn test_recreate_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(&dir, 1);
        sink.write_row(&row(0, 1, 9.0, 9.0)).unwrap();
        let path = sink.path().clone();
        sink.close().unwrap();

        let mut sink = sink_in(&dir, 1);
        sink.close().unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert_eq!(contents.lines().next(), Some("timestamp,imsi,x,y"));
    }
}
