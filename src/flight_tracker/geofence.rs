//! Ground/air labeling around the home airfield
//!
//! A position is on the ground only when it is both inside the airfield geofence and
//! inside the altitude band around field elevation. It is in the air only when both
//! tests fail. Anything else is ambiguous: FLARM altitude is often off right after the
//! device boots, and a single bad field must not produce a start or landing.

use crate::config::TrackerConfig;
use crate::position::{GroundAirLabel, PositionReport};

use super::geometry::haversine_distance;

/// Result of checking a report against the airfield
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundCheck {
    pub distance_km: f64,
    pub near_home: bool,
    pub altitude_in_band: bool,
}

impl GroundCheck {
    pub fn label(&self) -> GroundAirLabel {
        match (self.near_home, self.altitude_in_band) {
            (true, true) => GroundAirLabel::Ground,
            (false, false) => GroundAirLabel::Air,
            _ => GroundAirLabel::Ambiguous,
        }
    }
}

/// Great-circle distance from the home point in kilometers
pub fn distance_from_home_km(config: &TrackerConfig, latitude: f64, longitude: f64) -> f64 {
    haversine_distance(
        config.home_latitude,
        config.home_longitude,
        latitude,
        longitude,
    ) / 1000.0
}

pub fn altitude_in_band(config: &TrackerConfig, altitude_m: f64) -> bool {
    (altitude_m - config.home_elevation_m).abs() <= config.elevation_threshold_m
}

pub fn check_report(config: &TrackerConfig, report: &PositionReport) -> GroundCheck {
    let distance_km = distance_from_home_km(config, report.latitude, report.longitude);
    GroundCheck {
        distance_km,
        near_home: distance_km <= config.distance_threshold_km,
        altitude_in_band: altitude_in_band(config, report.altitude_m),
    }
}

/// Label a report GROUND, AIR or AMBIGUOUS
pub fn classify_position(config: &TrackerConfig, report: &PositionReport) -> GroundAirLabel {
    check_report(config, report).label()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config() -> TrackerConfig {
        TrackerConfig::for_airfield(47.0, 8.0, 400.0)
    }

    fn report(lat: f64, lon: f64, alt: f64, climb: f64) -> PositionReport {
        PositionReport {
            aircraft_id: "DDA5BA".to_string(),
            callsign: String::new(),
            timestamp: Utc::now(),
            latitude: lat,
            longitude: lon,
            altitude_m: alt,
            climb_rate_mps: climb,
        }
    }

    #[test]
    fn test_parked_on_field_is_ground() {
        let config = config();
        assert_eq!(
            classify_position(&config, &report(47.0, 8.0, 400.0, 0.0)),
            GroundAirLabel::Ground
        );
        // ~330 m north, altitude at the edge of the band
        assert_eq!(
            classify_position(&config, &report(47.003, 8.0, 420.0, 0.0)),
            GroundAirLabel::Ground
        );
        assert_eq!(
            classify_position(&config, &report(47.0, 8.0, 380.0, 0.0)),
            GroundAirLabel::Ground
        );
    }

    #[test]
    fn test_far_away_and_high_is_air_regardless_of_climb() {
        let config = config();
        for climb in [-5.0, 0.0, 5.0] {
            assert_eq!(
                classify_position(&config, &report(47.2, 8.0, 1500.0, climb)),
                GroundAirLabel::Air
            );
        }
    }

    #[test]
    fn test_single_predicate_is_ambiguous() {
        let config = config();
        // Over the field but well above it
        assert_eq!(
            classify_position(&config, &report(47.0, 8.0, 900.0, 0.0)),
            GroundAirLabel::Ambiguous
        );
        // Away from the field at field elevation (outlanding, or a bad position)
        assert_eq!(
            classify_position(&config, &report(47.2, 8.0, 400.0, 0.0)),
            GroundAirLabel::Ambiguous
        );
    }

    #[test]
    fn test_geofence_edge_at_half_a_kilometer() {
        let config = config();

        // ~489 m north
        let inside = check_report(&config, &report(47.0044, 8.0, 400.0, 0.0));
        assert!(inside.distance_km < 0.5);
        assert!(inside.near_home);
        assert_eq!(inside.label(), GroundAirLabel::Ground);

        // ~511 m north
        let outside = check_report(&config, &report(47.0046, 8.0, 400.0, 0.0));
        assert!(outside.distance_km > 0.5);
        assert!(!outside.near_home);
        assert_eq!(outside.label(), GroundAirLabel::Ambiguous);

        // Same two points above the band
        assert_eq!(
            classify_position(&config, &report(47.0044, 8.0, 900.0, 0.0)),
            GroundAirLabel::Ambiguous
        );
        assert_eq!(
            classify_position(&config, &report(47.0046, 8.0, 900.0, 0.0)),
            GroundAirLabel::Air
        );
    }

    #[test]
    fn test_check_report_reports_distance() {
        let check = check_report(&config(), &report(47.1, 8.0, 400.0, 0.0));
        assert!((check.distance_km - 11.12).abs() < 0.05);
        assert!(!check.near_home);
        assert!(check.altitude_in_band);
    }
}
