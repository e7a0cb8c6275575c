//! Sources of position reports
//!
//! The tracker consumes already-decoded `PositionReport`s. In production these come
//! from the APRS/FLARM decoder; for replays and tests they are read from a file with one
//! JSON report per line:
//!
//! ```text
//! {"aircraft_id":"DDA5BA","callsign":"D-1234","timestamp":"2024-06-01T12:00:00Z","latitude":47.0,"longitude":8.0,"altitude_m":400.0,"climb_rate_mps":0.0}
//! ```
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::position::PositionReport;

/// Trait for sources of position reports
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Get the next report from the source
    ///
    /// Returns:
    /// - `Ok(Some(report))` - Next report available
    /// - `Ok(None)` - End of stream
    /// - `Err(e)` - Error reading from the source
    async fn next_report(&mut self) -> Result<Option<PositionReport>>;
}

/// Replays reports from a JSON-lines file
pub struct FileReportSource {
    reader: BufReader<File>,
    line_buffer: String,
    line_number: usize,
    reports_read: usize,
    lines_skipped: usize,
}

impl FileReportSource {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).await?;
        debug!("Opened report source from: {:?}", path.as_ref());

        Ok(Self {
            reader: BufReader::new(file),
            line_buffer: String::new(),
            line_number: 0,
            reports_read: 0,
            lines_skipped: 0,
        })
    }

    pub fn reports_read(&self) -> usize {
        self.reports_read
    }

    /// Lines that were not valid reports
    pub fn lines_skipped(&self) -> usize {
        self.lines_skipped
    }
}

#[async_trait]
impl ReportSource for FileReportSource {
    async fn next_report(&mut self) -> Result<Option<PositionReport>> {
        loop {
            self.line_buffer.clear();
            let bytes_read = self.reader.read_line(&mut self.line_buffer).await?;

            if bytes_read == 0 {
                debug!(
                    "Reached end of report file after {} reports ({} skipped)",
                    self.reports_read, self.lines_skipped
                );
                return Ok(None);
            }
            self.line_number += 1;

            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<PositionReport>(line) {
                Ok(report) => {
                    self.reports_read += 1;
                    return Ok(Some(report));
                }
                Err(e) => {
                    warn!("Skipping line {}: {}", self.line_number, e);
                    metrics::counter!("startlist.source.malformed_lines_total").increment(1);
                    self.lines_skipped += 1;
                }
            }
        }
    }
}
