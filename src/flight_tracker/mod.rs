mod error;
pub mod geofence;
mod geometry;
pub mod launch_classifier;
pub mod scheduler;
mod state_transitions;

pub use error::TrackerError;
pub use launch_classifier::{
    LaunchClassification, LaunchClassifier, LaunchEvidence, decide_launch_type,
};
pub use scheduler::{LaunchScheduler, PendingClassification};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::position::{GroundAirLabel, PositionReport};
use crate::store::Store;

/// Type alias for aircraft locks map: aircraft_id -> Arc<Mutex<()>>
/// Serializes report processing for the same aircraft
pub(crate) type AircraftLocksMap = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// A detected change between ground and air
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlightEvent {
    Start {
        aircraft_id: String,
        callsign: String,
        time: DateTime<Utc>,
        flight_id: Uuid,
    },
    Landing {
        aircraft_id: String,
        callsign: String,
        time: DateTime<Utc>,
        /// None when no open flight was found to close
        flight_id: Option<Uuid>,
    },
}

impl FlightEvent {
    pub fn aircraft_id(&self) -> &str {
        match self {
            FlightEvent::Start { aircraft_id, .. } | FlightEvent::Landing { aircraft_id, .. } => {
                aircraft_id
            }
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            FlightEvent::Start { time, .. } | FlightEvent::Landing { time, .. } => *time,
        }
    }
}

/// Result of processing one report
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub label: GroundAirLabel,
    pub event: Option<FlightEvent>,
}

/// Context for flight processing operations
pub(crate) struct FlightProcessorContext<'a> {
    pub store: &'a dyn Store,
    pub config: &'a TrackerConfig,
}

/// Turns position reports into starts, landings and launch classifications
#[derive(Clone)]
pub struct FlightTracker {
    store: Arc<dyn Store>,
    config: Arc<TrackerConfig>,
    scheduler: LaunchScheduler,
    // Per-aircraft mutexes to ensure sequential processing per aircraft
    aircraft_locks: AircraftLocksMap,
    // Housekeeping tasks, stopped at shutdown
    background: TaskTracker,
    background_shutdown: CancellationToken,
}

impl FlightTracker {
    pub fn new(store: Arc<dyn Store>, config: TrackerConfig) -> Self {
        let config = Arc::new(config);
        let classifier = LaunchClassifier::new(store.clone(), config.clone());
        let scheduler = LaunchScheduler::new(classifier, &config);
        Self {
            store,
            config,
            scheduler,
            aircraft_locks: Arc::new(DashMap::new()),
            background: TaskTracker::new(),
            background_shutdown: CancellationToken::new(),
        }
    }

    fn context(&self) -> FlightProcessorContext<'_> {
        FlightProcessorContext {
            store: self.store.as_ref(),
            config: &self.config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn scheduler(&self) -> &LaunchScheduler {
        &self.scheduler
    }

    /// Process one report: label it, store it, detect a start or landing, and schedule
    /// launch classification for a start.
    ///
    /// Holds the per-aircraft lock for the whole operation. A store failure is returned
    /// to the caller; it never counts as "aircraft not seen before".
    #[tracing::instrument(skip(self, report), fields(aircraft_id = %report.aircraft_id))]
    pub async fn process_report(
        &self,
        report: PositionReport,
    ) -> Result<ProcessOutcome, TrackerError> {
        if let Err(reason) = report.validate() {
            warn!(
                "Dropping invalid report for {:?}: {}",
                report.aircraft_id, reason
            );
            metrics::counter!("startlist.tracker.invalid_reports_total").increment(1);
            return Err(TrackerError::InvalidReport(reason));
        }

        // Get or create the per-aircraft lock (DashMap provides concurrent access)
        let aircraft_lock = self
            .aircraft_locks
            .entry(report.aircraft_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        // Acquire the per-aircraft lock - ensures sequential processing
        let _guard = aircraft_lock.lock().await;

        trace!(
            "Processing report for {} at {:.6}, {:.6} ({}m, {:+.1}m/s)",
            report.aircraft_id,
            report.latitude,
            report.longitude,
            report.altitude_m,
            report.climb_rate_mps
        );

        let aircraft_id = report.aircraft_id.clone();
        let started = std::time::Instant::now();
        let result = match state_transitions::process_state_transition(&self.context(), report)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to process report: {}", e);
                metrics::counter!("startlist.tracker.store_errors_total").increment(1);
                return Err(e);
            }
        };
        metrics::histogram!("startlist.tracker.process_report_ms")
            .record(started.elapsed().as_micros() as f64 / 1000.0);
        metrics::counter!(
            "startlist.tracker.reports_processed_total",
            "label" => result.label.to_string()
        )
        .increment(1);

        // Also set for a redelivered start whose flight is still unclassified;
        // the scheduler ignores one that is already pending
        if let Some(start_time) = result.classify_start
            && !self.scheduler.schedule(&aircraft_id, start_time)
        {
            debug!(
                "Launch classification for {} at {} not scheduled",
                aircraft_id, start_time
            );
        }

        Ok(ProcessOutcome {
            label: result.label,
            event: result.event,
        })
    }

    /// Drop lock entries no task is holding or waiting on
    pub fn cleanup_idle_locks(&self) -> usize {
        let before = self.aircraft_locks.len();
        // Clones are only handed out under the shard lock, so a count of one inside
        // retain means nobody else has this mutex
        self.aircraft_locks
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        let removed = before.saturating_sub(self.aircraft_locks.len());
        metrics::gauge!("startlist.tracker.aircraft_locks").set(self.aircraft_locks.len() as f64);
        removed
    }

    /// Start a background task to periodically drop idle aircraft locks.
    /// The task runs until [`FlightTracker::shutdown`].
    pub fn start_lock_cleanup(&self, check_interval_secs: u64) {
        if self.background.is_closed() {
            warn!("Tracker is shutting down, lock cleanup not started");
            return;
        }
        let tracker = self.clone();
        let shutdown = self.background_shutdown.clone();
        self.background.spawn(
            async move {
                let mut interval =
                    tokio::time::interval(std::time::Duration::from_secs(check_interval_secs));
                // Skip the first tick (immediate execution)
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            debug!("Aircraft lock cleanup stopped");
                            break;
                        }
                        _ = interval.tick() => {
                            let removed = tracker.cleanup_idle_locks();
                            if removed > 0 {
                                debug!("Cleaned up {} idle aircraft locks", removed);
                            }
                        }
                    }
                }
            }
            .instrument(tracing::info_span!("aircraft_lock_cleanup")),
        );
        info!(
            "Started aircraft lock cleanup (every {} seconds)",
            check_interval_secs
        );
    }

    /// Stop background housekeeping, then stop scheduling and drain pending launch
    /// classifications
    pub async fn shutdown(
        &self,
        drain_timeout: std::time::Duration,
    ) -> Vec<PendingClassification> {
        self.background.close();
        self.background_shutdown.cancel();
        self.background.wait().await;

        let remaining = self.scheduler.shutdown(drain_timeout).await;
        for pending in &remaining {
            warn!(
                "Launch classification for {} at {} abandoned at shutdown",
                pending.aircraft_id, pending.start_time
            );
        }
        remaining
    }
}
