//! Tracker configuration
//!
//! All thresholds live in one immutable struct handed to the tracker and classifier at
//! construction. Values come from the environment (after `.env` is loaded) or from a
//! TOML file; both paths end in `validate()`.
use anyhow::{Context, Result, bail};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_HOME_LATITUDE: &str = "AF_LAT";
pub const ENV_HOME_LONGITUDE: &str = "AF_LNG";
pub const ENV_HOME_ELEVATION: &str = "AF_ELEVATION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Airfield reference point, decimal degrees
    pub home_latitude: f64,
    pub home_longitude: f64,

    /// Airfield elevation MSL in meters
    pub home_elevation_m: f64,

    /// Radius of the airfield geofence in kilometers.
    /// Positions farther out can't be on the ground at this field
    #[serde(default = "default_distance_threshold_km")]
    pub distance_threshold_km: f64,

    /// Half-width of the ground altitude band around home elevation, meters.
    /// Covers GPS altitude noise while parked
    #[serde(default = "default_elevation_threshold_m")]
    pub elevation_threshold_m: f64,

    /// Height gain above home elevation (meters) within the observation delay
    /// beyond which a lone start counts as a winch launch
    #[serde(default = "default_winch_height_threshold_m")]
    pub winch_height_threshold_m: f64,

    /// Max difference (meters) between average altitudes of two parallel starts
    /// for them to count as glider and towplane
    #[serde(default = "default_tow_altitude_diff_threshold_m")]
    pub tow_altitude_diff_threshold_m: f64,

    /// Seconds between a start and its launch classification
    #[serde(default = "default_classification_delay_s")]
    pub classification_delay_s: u64,

    /// Seconds either side of a start within which another start counts as parallel
    #[serde(default = "default_parallel_start_window_s")]
    pub parallel_start_window_s: u64,

    /// How far back (seconds) to look for the last confirmed ground/air state
    #[serde(default = "default_confirmed_state_lookback_s")]
    pub confirmed_state_lookback_s: u64,

    /// Width (seconds) of the trailing window used for average altitudes
    #[serde(default = "default_altitude_average_window_s")]
    pub altitude_average_window_s: u64,

    /// Attempts after the first when the store fails during classification
    #[serde(default = "default_classification_max_retries")]
    pub classification_max_retries: u32,

    /// Seconds to wait between classification attempts
    #[serde(default = "default_classification_retry_delay_s")]
    pub classification_retry_delay_s: u64,
}

fn default_distance_threshold_km() -> f64 {
    0.5
}

fn default_elevation_threshold_m() -> f64 {
    20.0
}

fn default_winch_height_threshold_m() -> f64 {
    200.0
}

fn default_tow_altitude_diff_threshold_m() -> f64 {
    20.0
}

fn default_classification_delay_s() -> u64 {
    20
}

fn default_parallel_start_window_s() -> u64 {
    30
}

fn default_confirmed_state_lookback_s() -> u64 {
    300
}

fn default_altitude_average_window_s() -> u64 {
    30
}

fn default_classification_max_retries() -> u32 {
    3
}

fn default_classification_retry_delay_s() -> u64 {
    5
}

impl TrackerConfig {
    /// Configuration for the given airfield with every threshold at its default
    pub fn for_airfield(home_latitude: f64, home_longitude: f64, home_elevation_m: f64) -> Self {
        Self {
            home_latitude,
            home_longitude,
            home_elevation_m,
            distance_threshold_km: default_distance_threshold_km(),
            elevation_threshold_m: default_elevation_threshold_m(),
            winch_height_threshold_m: default_winch_height_threshold_m(),
            tow_altitude_diff_threshold_m: default_tow_altitude_diff_threshold_m(),
            classification_delay_s: default_classification_delay_s(),
            parallel_start_window_s: default_parallel_start_window_s(),
            confirmed_state_lookback_s: default_confirmed_state_lookback_s(),
            altitude_average_window_s: default_altitude_average_window_s(),
            classification_max_retries: default_classification_max_retries(),
            classification_retry_delay_s: default_classification_retry_delay_s(),
        }
    }

    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment, map in tests)
    ///
    /// `AF_LAT`, `AF_LNG` and `AF_ELEVATION` are required; thresholds use
    /// `STARTLIST_<OPTION>` and fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<f64> {
            let raw = lookup(key).with_context(|| format!("{} must be set", key))?;
            raw.trim()
                .parse::<f64>()
                .with_context(|| format!("{} is not a number: {:?}", key, raw))
        };

        let mut config = Self::for_airfield(
            required(ENV_HOME_LATITUDE)?,
            required(ENV_HOME_LONGITUDE)?,
            required(ENV_HOME_ELEVATION)?,
        );

        override_from(
            &lookup,
            "STARTLIST_DISTANCE_THRESHOLD_KM",
            &mut config.distance_threshold_km,
        )?;
        override_from(
            &lookup,
            "STARTLIST_ELEVATION_THRESHOLD_M",
            &mut config.elevation_threshold_m,
        )?;
        override_from(
            &lookup,
            "STARTLIST_WINCH_HEIGHT_THRESHOLD_M",
            &mut config.winch_height_threshold_m,
        )?;
        override_from(
            &lookup,
            "STARTLIST_TOW_ALTITUDE_DIFF_THRESHOLD_M",
            &mut config.tow_altitude_diff_threshold_m,
        )?;
        override_from(
            &lookup,
            "STARTLIST_CLASSIFICATION_DELAY_S",
            &mut config.classification_delay_s,
        )?;
        override_from(
            &lookup,
            "STARTLIST_PARALLEL_START_WINDOW_S",
            &mut config.parallel_start_window_s,
        )?;
        override_from(
            &lookup,
            "STARTLIST_CONFIRMED_STATE_LOOKBACK_S",
            &mut config.confirmed_state_lookback_s,
        )?;
        override_from(
            &lookup,
            "STARTLIST_ALTITUDE_AVERAGE_WINDOW_S",
            &mut config.altitude_average_window_s,
        )?;
        override_from(
            &lookup,
            "STARTLIST_CLASSIFICATION_MAX_RETRIES",
            &mut config.classification_max_retries,
        )?;
        override_from(
            &lookup,
            "STARTLIST_CLASSIFICATION_RETRY_DELAY_S",
            &mut config.classification_retry_delay_s,
        )?;

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: TrackerConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.home_latitude) {
            bail!("home latitude {} out of range", self.home_latitude);
        }
        if !(-180.0..=180.0).contains(&self.home_longitude) {
            bail!("home longitude {} out of range", self.home_longitude);
        }
        if !self.home_elevation_m.is_finite() {
            bail!("home elevation must be finite");
        }
        for (name, value) in [
            ("distance_threshold_km", self.distance_threshold_km),
            ("elevation_threshold_m", self.elevation_threshold_m),
            ("winch_height_threshold_m", self.winch_height_threshold_m),
            (
                "tow_altitude_diff_threshold_m",
                self.tow_altitude_diff_threshold_m,
            ),
        ] {
            if !value.is_finite() || value <= 0.0 {
                bail!("{} must be a positive number, got {}", name, value);
            }
        }
        if self.altitude_average_window_s == 0 {
            bail!("altitude_average_window_s must be at least 1");
        }
        Ok(())
    }

    pub fn classification_delay(&self) -> Duration {
        Duration::seconds(self.classification_delay_s as i64)
    }

    pub fn parallel_start_window(&self) -> Duration {
        Duration::seconds(self.parallel_start_window_s as i64)
    }

    pub fn confirmed_state_lookback(&self) -> Duration {
        Duration::seconds(self.confirmed_state_lookback_s as i64)
    }

    pub fn altitude_average_window(&self) -> Duration {
        Duration::seconds(self.altitude_average_window_s as i64)
    }

    pub fn classification_retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.classification_retry_delay_s)
    }
}

fn override_from<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_uses_defaults() {
        let config = TrackerConfig::from_lookup(lookup(&[
            ("AF_LAT", "47.1234"),
            ("AF_LNG", "8.5"),
            ("AF_ELEVATION", "420"),
        ]))
        .unwrap();

        assert_eq!(config.home_latitude, 47.1234);
        assert_eq!(config.home_elevation_m, 420.0);
        assert_eq!(config.distance_threshold_km, 0.5);
        assert_eq!(config.elevation_threshold_m, 20.0);
        assert_eq!(config.winch_height_threshold_m, 200.0);
        assert_eq!(config.classification_delay(), Duration::seconds(20));
        assert_eq!(config.confirmed_state_lookback(), Duration::minutes(5));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = TrackerConfig::from_lookup(lookup(&[
            ("AF_LAT", "47.0"),
            ("AF_LNG", "8.0"),
            ("AF_ELEVATION", "400"),
            ("STARTLIST_DISTANCE_THRESHOLD_KM", "2"),
            ("STARTLIST_WINCH_HEIGHT_THRESHOLD_M", "500"),
            ("STARTLIST_CLASSIFICATION_MAX_RETRIES", "0"),
        ]))
        .unwrap();

        assert_eq!(config.distance_threshold_km, 2.0);
        assert_eq!(config.winch_height_threshold_m, 500.0);
        assert_eq!(config.classification_max_retries, 0);
    }

    #[test]
    fn test_from_lookup_rejects_missing_and_malformed() {
        assert!(TrackerConfig::from_lookup(lookup(&[("AF_LAT", "47.0")])).is_err());
        assert!(
            TrackerConfig::from_lookup(lookup(&[
                ("AF_LAT", "north"),
                ("AF_LNG", "8.0"),
                ("AF_ELEVATION", "400"),
            ]))
            .is_err()
        );
        assert!(
            TrackerConfig::from_lookup(lookup(&[
                ("AF_LAT", "47.0"),
                ("AF_LNG", "8.0"),
                ("AF_ELEVATION", "400"),
                ("STARTLIST_ELEVATION_THRESHOLD_M", "-5"),
            ]))
            .is_err()
        );
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "home_latitude = 47.0\nhome_longitude = 8.0\nhome_elevation_m = 400.0\nwinch_height_threshold_m = 350.0"
        )
        .unwrap();

        let config = TrackerConfig::load(file.path()).unwrap();
        assert_eq!(config.winch_height_threshold_m, 350.0);
        assert_eq!(config.tow_altitude_diff_threshold_m, 20.0);
        assert_eq!(config.parallel_start_window(), Duration::seconds(30));
    }
}
