//! Storage contract used by the flight tracker and launch classifier
//!
//! The tracker never caches what it reads from here: every decision is made from a
//! fresh windowed query. "Nothing recorded" is always a regular return value
//! (`LastConfirmed::NotFound`, `None`) and never an error, so that a failing backend
//! can't be mistaken for an aircraft that has simply not been seen yet.
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::flights::FlightRecord;
use crate::position::PositionState;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached or the query failed; transient
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Last GROUND/AIR label seen for an aircraft inside a lookback window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastConfirmed {
    Ground,
    Air,
    /// No confirmed position in the window (aircraft never seen, or only ambiguous reports)
    NotFound,
}

/// Closed time interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window of `width` ending at `end`
    pub fn ending_at(end: DateTime<Utc>, width: Duration) -> Self {
        Self {
            start: end - width,
            end,
        }
    }

    /// Window extending `half_width` on both sides of `center`
    pub fn around(center: DateTime<Utc>, half_width: Duration) -> Self {
        Self {
            start: center - half_width,
            end: center + half_width,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Historical position/flight storage
///
/// Implementations must be safe to call concurrently from many aircraft at once;
/// the tracker serializes calls per aircraft but not across aircraft.
#[async_trait]
pub trait Store: Send + Sync {
    /// Most recent GROUND or AIR label for the aircraft strictly before `before`
    /// and no older than `before - lookback`. Ambiguous positions are ignored.
    async fn last_confirmed_label(
        &self,
        aircraft_id: &str,
        before: DateTime<Utc>,
        lookback: Duration,
    ) -> StoreResult<LastConfirmed>;

    /// Highest altitude reported inside the window, `None` if there are no positions
    async fn max_altitude(&self, aircraft_id: &str, window: TimeWindow)
    -> StoreResult<Option<f64>>;

    /// Mean altitude over the window, `None` if there are no positions
    async fn avg_altitude(&self, aircraft_id: &str, window: TimeWindow)
    -> StoreResult<Option<f64>>;

    /// Another aircraft whose start falls inside the window.
    /// When several qualify, the one whose start is closest to the window center wins,
    /// ties going to the smallest aircraft id.
    async fn parallel_start(
        &self,
        aircraft_id: &str,
        window: TimeWindow,
    ) -> StoreResult<Option<String>>;

    async fn insert_position(&self, position: &PositionState) -> StoreResult<()>;

    /// Insert the flight, or replace the stored one with the same id
    async fn upsert_flight(&self, flight: &FlightRecord) -> StoreResult<()>;

    /// The flight with neither landing_time nor timed_out_at set, if any
    async fn open_flight(&self, aircraft_id: &str) -> StoreResult<Option<FlightRecord>>;

    /// The most recently started flight, open or not
    async fn latest_flight(&self, aircraft_id: &str) -> StoreResult<Option<FlightRecord>>;

    /// The flight that started at exactly `start_time`
    async fn flight_by_start(
        &self,
        aircraft_id: &str,
        start_time: DateTime<Utc>,
    ) -> StoreResult<Option<FlightRecord>>;

    /// All flights ordered by start time
    async fn flights(&self) -> StoreResult<Vec<FlightRecord>>;
}
