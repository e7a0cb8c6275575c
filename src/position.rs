use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded position report for one aircraft
/// Produced by the ingestion side (APRS/FLARM decoder or replay file), immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    /// Stable device identifier (e.g. FLARM id "DDA5BA")
    pub aircraft_id: String,

    /// Display callsign, may be empty when the registry has no entry
    #[serde(default)]
    pub callsign: String,

    pub timestamp: DateTime<Utc>,

    pub latitude: f64,
    pub longitude: f64,

    /// Altitude MSL in meters
    pub altitude_m: f64,

    /// Climb rate in meters per second
    #[serde(default)]
    pub climb_rate_mps: f64,
}

impl PositionReport {
    /// Check the report fields before any classification happens
    /// Returns a description of the first problem found
    pub fn validate(&self) -> Result<(), String> {
        if self.aircraft_id.trim().is_empty() {
            return Err("empty aircraft id".to_string());
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(format!("latitude {} out of range", self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(format!("longitude {} out of range", self.longitude));
        }
        if !self.altitude_m.is_finite() {
            return Err(format!("altitude {} is not finite", self.altitude_m));
        }
        if !self.climb_rate_mps.is_finite() {
            return Err(format!("climb rate {} is not finite", self.climb_rate_mps));
        }
        Ok(())
    }
}

/// Ground/air classification of a single report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroundAirLabel {
    Ground,
    Air,
    /// Geofence and altitude band disagree; stored but never drives a transition
    Ambiguous,
}

impl GroundAirLabel {
    /// Whether this label may participate in transition detection
    pub fn is_confirmed(self) -> bool {
        !matches!(self, GroundAirLabel::Ambiguous)
    }
}

impl std::fmt::Display for GroundAirLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroundAirLabel::Ground => write!(f, "gnd"),
            GroundAirLabel::Air => write!(f, "air"),
            GroundAirLabel::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// Persisted position: the report plus its derived label. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    #[serde(flatten)]
    pub report: PositionReport,
    pub ground_air_label: GroundAirLabel,
}

impl PositionState {
    pub fn new(report: PositionReport, ground_air_label: GroundAirLabel) -> Self {
        Self {
            report,
            ground_air_label,
        }
    }

    pub fn aircraft_id(&self) -> &str {
        &self.report.aircraft_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.report.timestamp
    }
}
