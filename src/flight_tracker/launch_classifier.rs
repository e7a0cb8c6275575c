//! Launch method classification
//!
//! Runs once per start after the observation delay. Evidence is read fresh from the
//! store each time, so running it twice on unchanged data produces the same record.
//!
//! Rules, first match wins:
//! 1. Another aircraft started within the parallel window and both fly at nearly the
//!    same average altitude: aerotow, the other aircraft is the tow partner.
//! 2. No altitude data at all in the observation window: unknown.
//! 3. Height gain above the field beyond the winch threshold: winch.
//! 4. Otherwise: self-launch.
//!
//! The tow check goes first because a long tow can exceed the winch height too.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::TrackerConfig;
use crate::flights::LaunchType;
use crate::store::{Store, TimeWindow};

use super::TrackerError;

/// Altitude data gathered for one start
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchEvidence {
    /// Highest altitude in `[start, start + delay]`
    pub max_altitude_m: Option<f64>,
    /// Average altitude over the trailing window ending at `start + delay`
    pub avg_altitude_m: Option<f64>,
    /// Aircraft that started in parallel
    pub partner_id: Option<String>,
    /// The partner's average altitude over the same trailing window
    pub partner_avg_altitude_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchClassification {
    pub launch_type: LaunchType,
    pub tow_partner_id: Option<String>,
}

/// Pure decision over gathered evidence
pub fn decide_launch_type(
    config: &TrackerConfig,
    evidence: &LaunchEvidence,
) -> LaunchClassification {
    if let (Some(partner_id), Some(own_avg), Some(partner_avg)) = (
        &evidence.partner_id,
        evidence.avg_altitude_m,
        evidence.partner_avg_altitude_m,
    ) && (own_avg - partner_avg).abs() < config.tow_altitude_diff_threshold_m
    {
        return LaunchClassification {
            launch_type: LaunchType::Aerotow,
            tow_partner_id: Some(partner_id.clone()),
        };
    }

    let launch_type = match evidence.max_altitude_m {
        None => LaunchType::Unknown,
        Some(max_alt) if max_alt - config.home_elevation_m > config.winch_height_threshold_m => {
            LaunchType::Winch
        }
        Some(_) => LaunchType::SelfLaunch,
    };

    LaunchClassification {
        launch_type,
        tow_partner_id: None,
    }
}

#[derive(Clone)]
pub struct LaunchClassifier {
    store: Arc<dyn Store>,
    config: Arc<TrackerConfig>,
}

impl LaunchClassifier {
    pub fn new(store: Arc<dyn Store>, config: Arc<TrackerConfig>) -> Self {
        Self { store, config }
    }

    /// Query the store for everything the decision needs
    pub async fn gather_evidence(
        &self,
        aircraft_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<LaunchEvidence, TrackerError> {
        let observed_until = start_time + self.config.classification_delay();
        let climb_window = TimeWindow::new(start_time, observed_until);
        let average_window =
            TimeWindow::ending_at(observed_until, self.config.altitude_average_window());
        let parallel_window =
            TimeWindow::around(start_time, self.config.parallel_start_window());

        let max_altitude_m = self.store.max_altitude(aircraft_id, climb_window).await?;
        let avg_altitude_m = self.store.avg_altitude(aircraft_id, average_window).await?;
        let partner_id = self
            .store
            .parallel_start(aircraft_id, parallel_window)
            .await?;

        let partner_avg_altitude_m = match &partner_id {
            Some(partner) => self.store.avg_altitude(partner, average_window).await?,
            None => None,
        };

        Ok(LaunchEvidence {
            max_altitude_m,
            avg_altitude_m,
            partner_id,
            partner_avg_altitude_m,
        })
    }

    /// Classify a start without writing anything
    pub async fn classify(
        &self,
        aircraft_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<LaunchClassification, TrackerError> {
        let evidence = self.gather_evidence(aircraft_id, start_time).await?;
        let classification = decide_launch_type(&self.config, &evidence);
        debug!(
            "Launch evidence for {} started {}: {:?} -> {:?}",
            aircraft_id, start_time, evidence, classification
        );
        Ok(classification)
    }

    /// Classify a start and store the result on its flight record
    #[tracing::instrument(skip(self, aircraft_id), fields(aircraft_id = %aircraft_id))]
    pub async fn classify_and_record(
        &self,
        aircraft_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<LaunchClassification, TrackerError> {
        let started = std::time::Instant::now();
        let classification = self.classify(aircraft_id, start_time).await?;

        let mut flight = self
            .store
            .flight_by_start(aircraft_id, start_time)
            .await?
            .ok_or_else(|| TrackerError::FlightNotFound {
                aircraft_id: aircraft_id.to_string(),
                start_time,
            })?;

        flight.launch_type = classification.launch_type;
        flight.tow_partner_id = classification.tow_partner_id.clone();
        self.store.upsert_flight(&flight).await?;

        match &classification.tow_partner_id {
            Some(partner) => info!(
                "{} started {} by {} with {}",
                aircraft_id, start_time, classification.launch_type, partner
            ),
            None => info!(
                "{} started {} by {}",
                aircraft_id, start_time, classification.launch_type
            ),
        }
        metrics::counter!(
            "startlist.classifier.classified_total",
            "launch_type" => classification.launch_type.code()
        )
        .increment(1);
        metrics::histogram!("startlist.classifier.latency_ms")
            .record(started.elapsed().as_micros() as f64 / 1000.0);

        Ok(classification)
    }
}
