//! Shared fixtures for tracker integration tests
//!
//! The test airfield sits at 47.0 N, 8.0 E, 400 m MSL with default thresholds.
//! `ON_FIELD` is the home point; `AWAY` is about 1.1 km north, outside the geofence.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use startlist::{FlightTracker, MemoryStore, PositionReport, TrackerConfig};

pub const FIELD_ELEVATION_M: f64 = 400.0;
pub const ON_FIELD: f64 = 47.0;
pub const AWAY: f64 = 47.01;

pub fn config() -> TrackerConfig {
    TrackerConfig::for_airfield(ON_FIELD, 8.0, FIELD_ELEVATION_M)
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn at(offset_s: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(offset_s)
}

pub fn report(aircraft_id: &str, offset_s: i64, latitude: f64, altitude_m: f64) -> PositionReport {
    PositionReport {
        aircraft_id: aircraft_id.to_string(),
        callsign: String::new(),
        timestamp: at(offset_s),
        latitude,
        longitude: 8.0,
        altitude_m,
        climb_rate_mps: 0.0,
    }
}

pub fn on_ground(aircraft_id: &str, offset_s: i64) -> PositionReport {
    report(aircraft_id, offset_s, ON_FIELD, FIELD_ELEVATION_M)
}

pub fn airborne(aircraft_id: &str, offset_s: i64, altitude_m: f64) -> PositionReport {
    report(aircraft_id, offset_s, AWAY, altitude_m)
}

pub fn tracker() -> (FlightTracker, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let tracker = FlightTracker::new(store.clone(), config());
    (tracker, store)
}

/// Feed reports in order, panicking on any tracker error
pub async fn feed(tracker: &FlightTracker, reports: Vec<PositionReport>) {
    for report in reports {
        tracker
            .process_report(report)
            .await
            .expect("report should be processed");
    }
}
