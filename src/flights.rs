use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a glider got into the air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaunchType {
    Winch,
    Aerotow,
    SelfLaunch,
    /// Not classified yet, or the altitude data needed to classify was missing
    #[default]
    Unknown,
}

impl LaunchType {
    /// Single-letter code used on printed start lists
    pub fn code(self) -> &'static str {
        match self {
            LaunchType::Winch => "W",
            LaunchType::Aerotow => "A",
            LaunchType::SelfLaunch => "S",
            LaunchType::Unknown => "?",
        }
    }
}

impl std::fmt::Display for LaunchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchType::Winch => write!(f, "winch"),
            LaunchType::Aerotow => write!(f, "aerotow"),
            LaunchType::SelfLaunch => write!(f, "self-launch"),
            LaunchType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Flight state derived from the record's timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightState {
    /// No landing_time and no timed_out_at
    Active,
    /// Completed with a detected landing
    Complete,
    /// Superseded by a later start before a landing was seen
    TimedOut,
}

/// A flight from detected start to detected landing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    /// Time-ordered identifier (UUID v7)
    pub id: Uuid,

    pub aircraft_id: String,

    pub callsign: String,

    pub start_time: DateTime<Utc>,

    /// Null until a landing is observed
    pub landing_time: Option<DateTime<Utc>>,

    /// Set once by the launch classifier
    pub launch_type: LaunchType,

    /// Aircraft that started in parallel at matching altitude (aerotow only)
    pub tow_partner_id: Option<String>,

    /// Set when a later start closed this flight without a landing.
    /// Mutually exclusive with landing_time
    pub timed_out_at: Option<DateTime<Utc>>,
}

impl FlightRecord {
    /// Open a new flight at the given start time
    pub fn new_started(aircraft_id: &str, callsign: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            aircraft_id: aircraft_id.to_string(),
            callsign: callsign.to_string(),
            start_time,
            landing_time: None,
            launch_type: LaunchType::Unknown,
            tow_partner_id: None,
            timed_out_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.landing_time.is_none() && self.timed_out_at.is_none()
    }

    pub fn state(&self) -> FlightState {
        if self.landing_time.is_some() {
            FlightState::Complete
        } else if self.timed_out_at.is_some() {
            FlightState::TimedOut
        } else {
            FlightState::Active
        }
    }

    /// Flight duration, only for completed flights
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.landing_time
            .map(|landing| landing.signed_duration_since(self.start_time))
    }
}
