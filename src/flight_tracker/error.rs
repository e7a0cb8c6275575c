use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Report fields failed validation; the report is dropped
    #[error("invalid report: {0}")]
    InvalidReport(String),

    /// Store failed while reading or writing; nothing is assumed about the missing data
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("no flight for {aircraft_id} starting at {start_time}")]
    FlightNotFound {
        aircraft_id: String,
        start_time: DateTime<Utc>,
    },
}

impl TrackerError {
    /// Whether retrying the same operation later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackerError::StoreUnavailable(_))
    }
}
