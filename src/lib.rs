//! Start list - flight lifecycle tracking and launch classification for one airfield
//!
//! Position reports are labelled ground, air or ambiguous against the airfield geofence.
//! Confirmed ground/air changes become starts and landings, and every start is
//! classified as winch, aerotow or self-launch once enough climb data has arrived.

pub mod config;
pub mod ddb;
pub mod flight_tracker;
pub mod flights;
pub mod memory_store;
pub mod message_sources;
pub mod metrics;
pub mod position;
pub mod store;

pub use config::TrackerConfig;
pub use flight_tracker::{FlightEvent, FlightTracker, ProcessOutcome, TrackerError};
pub use flights::{FlightRecord, LaunchType};
pub use memory_store::MemoryStore;
pub use position::{GroundAirLabel, PositionReport, PositionState};
pub use store::{LastConfirmed, Store, StoreError, TimeWindow};
