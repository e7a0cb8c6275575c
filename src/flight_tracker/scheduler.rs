//! Deferred launch classification
//!
//! Every start gets one tracked task that sleeps for the observation delay and then runs
//! the classifier, retrying on store failures. Pending work can be listed and cancelled,
//! and `shutdown` drains it with a deadline instead of abandoning detached timers.
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::TrackerConfig;

use super::launch_classifier::LaunchClassifier;

/// A start waiting for its launch classification
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingClassification {
    pub aircraft_id: String,
    pub start_time: DateTime<Utc>,
}

struct PendingEntry {
    generation: u64,
    token: CancellationToken,
}

#[derive(Clone)]
pub struct LaunchScheduler {
    classifier: LaunchClassifier,
    delay: Duration,
    max_retries: u32,
    retry_delay: Duration,
    pending: Arc<DashMap<PendingClassification, PendingEntry>>,
    generation: Arc<AtomicU64>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl LaunchScheduler {
    pub fn new(classifier: LaunchClassifier, config: &TrackerConfig) -> Self {
        Self {
            classifier,
            delay: Duration::from_secs(config.classification_delay_s),
            max_retries: config.classification_max_retries,
            retry_delay: config.classification_retry_delay(),
            pending: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Schedule classification of a start. Returns false if the same start is already
    /// pending or the scheduler is shutting down.
    pub fn schedule(&self, aircraft_id: &str, start_time: DateTime<Utc>) -> bool {
        if self.tasks.is_closed() {
            warn!(
                "Scheduler is shutting down, not classifying start of {} at {}",
                aircraft_id, start_time
            );
            metrics::counter!("startlist.scheduler.rejected_total").increment(1);
            return false;
        }

        let key = PendingClassification {
            aircraft_id: aircraft_id.to_string(),
            start_time,
        };
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = match self.pending.entry(key.clone()) {
            Entry::Occupied(_) => {
                debug!(
                    "Classification for {} at {} already pending",
                    aircraft_id, start_time
                );
                return false;
            }
            Entry::Vacant(vacant) => {
                let token = self.shutdown.child_token();
                vacant.insert(PendingEntry {
                    generation,
                    token: token.clone(),
                });
                token
            }
        };

        let scheduler = self.clone();
        let span = tracing::info_span!("launch_classification", aircraft_id = %aircraft_id);
        self.tasks.spawn(
            async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!(
                            "Launch classification for {} at {} cancelled",
                            key.aircraft_id, key.start_time
                        );
                        metrics::counter!("startlist.scheduler.cancelled_total").increment(1);
                    }
                    _ = scheduler.run(&key) => {}
                }
                scheduler
                    .pending
                    .remove_if(&key, |_, entry| entry.generation == generation);
                metrics::gauge!("startlist.scheduler.pending").set(scheduler.pending.len() as f64);
            }
            .instrument(span),
        );

        metrics::gauge!("startlist.scheduler.pending").set(self.pending.len() as f64);
        true
    }

    async fn run(&self, key: &PendingClassification) {
        tokio::time::sleep(self.delay).await;

        let mut attempt: u32 = 0;
        loop {
            match self
                .classifier
                .classify_and_record(&key.aircraft_id, key.start_time)
                .await
            {
                Ok(_) => return,
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Launch classification for {} at {} failed ({}), retry {}/{} in {:?}",
                        key.aircraft_id,
                        key.start_time,
                        e,
                        attempt,
                        self.max_retries,
                        self.retry_delay
                    );
                    metrics::counter!("startlist.classifier.retries_total").increment(1);
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        "Dropping launch classification for {} at {} after {} attempts: {} - flight stays unknown",
                        key.aircraft_id,
                        key.start_time,
                        attempt + 1,
                        e
                    );
                    metrics::counter!("startlist.classifier.failed_total").increment(1);
                    return;
                }
            }
        }
    }

    /// Starts still waiting for classification, oldest first
    pub fn pending(&self) -> Vec<PendingClassification> {
        let mut pending: Vec<PendingClassification> =
            self.pending.iter().map(|entry| entry.key().clone()).collect();
        pending.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.aircraft_id.cmp(&b.aircraft_id))
        });
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Cancel one pending classification. Returns false if it wasn't pending.
    pub fn cancel(&self, aircraft_id: &str, start_time: DateTime<Utc>) -> bool {
        let key = PendingClassification {
            aircraft_id: aircraft_id.to_string(),
            start_time,
        };
        match self.pending.remove(&key) {
            Some((_, entry)) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop accepting work and wait up to `drain_timeout` for pending classifications.
    /// Whatever is still pending at the deadline is cancelled and returned.
    pub async fn shutdown(&self, drain_timeout: Duration) -> Vec<PendingClassification> {
        self.tasks.close();
        info!(
            "Draining {} pending launch classifications (timeout {:?})",
            self.pending.len(),
            drain_timeout
        );

        if tokio::time::timeout(drain_timeout, self.tasks.wait())
            .await
            .is_ok()
        {
            info!("All launch classifications finished");
            return Vec::new();
        }

        let remaining = self.pending();
        warn!(
            "{} launch classifications still pending after {:?}, cancelling",
            remaining.len(),
            drain_timeout
        );
        self.shutdown.cancel();
        self.tasks.wait().await;
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flights::{FlightRecord, LaunchType};
    use crate::memory_store::MemoryStore;
    use crate::position::{GroundAirLabel, PositionReport, PositionState};
    use crate::store::Store;
    use chrono::TimeZone;

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    async fn seed_winch_launch(store: &MemoryStore) {
        store
            .upsert_flight(&FlightRecord::new_started("WINCH1", "", start_time()))
            .await
            .unwrap();
        for (offset, alt) in [(0, 430.0), (10, 700.0), (20, 850.0)] {
            let report = PositionReport {
                aircraft_id: "WINCH1".to_string(),
                callsign: String::new(),
                timestamp: start_time() + chrono::Duration::seconds(offset),
                latitude: 47.0,
                longitude: 8.0,
                altitude_m: alt,
                climb_rate_mps: 15.0,
            };
            store
                .insert_position(&PositionState::new(report, GroundAirLabel::Air))
                .await
                .unwrap();
        }
    }

    fn scheduler(store: Arc<MemoryStore>, max_retries: u32) -> LaunchScheduler {
        let mut config = TrackerConfig::for_airfield(47.0, 8.0, 400.0);
        config.classification_max_retries = max_retries;
        let config = Arc::new(config);
        let store: Arc<dyn Store> = store;
        LaunchScheduler::new(LaunchClassifier::new(store, config.clone()), &config)
    }

    async fn launch_type(store: &MemoryStore) -> LaunchType {
        store
            .flight_by_start("WINCH1", start_time())
            .await
            .unwrap()
            .unwrap()
            .launch_type
    }

    #[tokio::test(start_paused = true)]
    async fn test_classifies_after_delay() {
        let store = Arc::new(MemoryStore::new());
        seed_winch_launch(&store).await;
        let scheduler = scheduler(store.clone(), 3);

        assert!(scheduler.schedule("WINCH1", start_time()));
        assert_eq!(scheduler.pending().len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(launch_type(&store).await, LaunchType::Unknown);

        let remaining = scheduler.shutdown(Duration::from_secs(60)).await;
        assert!(remaining.is_empty());
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(launch_type(&store).await, LaunchType::Winch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_schedule_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        seed_winch_launch(&store).await;
        let scheduler = scheduler(store, 3);

        assert!(scheduler.schedule("WINCH1", start_time()));
        assert!(!scheduler.schedule("WINCH1", start_time()));
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_returns_unfinished_work() {
        let store = Arc::new(MemoryStore::new());
        seed_winch_launch(&store).await;
        let scheduler = scheduler(store.clone(), 3);

        scheduler.schedule("WINCH1", start_time());
        let remaining = scheduler.shutdown(Duration::from_secs(1)).await;

        assert_eq!(
            remaining,
            vec![PendingClassification {
                aircraft_id: "WINCH1".to_string(),
                start_time: start_time(),
            }]
        );
        assert_eq!(launch_type(&store).await, LaunchType::Unknown);
        assert!(!scheduler.schedule("WINCH1", start_time()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_single_classification() {
        let store = Arc::new(MemoryStore::new());
        seed_winch_launch(&store).await;
        let scheduler = scheduler(store.clone(), 3);

        scheduler.schedule("WINCH1", start_time());
        assert!(scheduler.cancel("WINCH1", start_time()));
        assert!(!scheduler.cancel("WINCH1", start_time()));

        scheduler.shutdown(Duration::from_secs(60)).await;
        assert_eq!(launch_type(&store).await, LaunchType::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_store_recovers() {
        let store = Arc::new(MemoryStore::new());
        seed_winch_launch(&store).await;
        let scheduler = scheduler(store.clone(), 3);

        store.set_available(false);
        scheduler.schedule("WINCH1", start_time());

        // First attempt at 20s fails, retry at 25s succeeds
        let toggle = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(22)).await;
            toggle.set_available(true);
        });

        scheduler.shutdown(Duration::from_secs(120)).await;
        assert_eq!(launch_type(&store).await, LaunchType::Winch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_and_leaves_flight_unknown() {
        let store = Arc::new(MemoryStore::new());
        seed_winch_launch(&store).await;
        let scheduler = scheduler(store.clone(), 2);

        store.set_available(false);
        scheduler.schedule("WINCH1", start_time());
        let remaining = scheduler.shutdown(Duration::from_secs(120)).await;
        assert!(remaining.is_empty());

        store.set_available(true);
        assert_eq!(launch_type(&store).await, LaunchType::Unknown);
    }
}
