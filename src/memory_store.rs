//! In-process `Store` implementation
//!
//! Backs the replay command and the tests. Positions are kept per aircraft in arrival
//! order; flights are keyed by id. `set_available(false)` makes every call fail with
//! `StoreError::Unavailable`, which is how outages are simulated.
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::flights::FlightRecord;
use crate::position::{GroundAirLabel, PositionState};
use crate::store::{LastConfirmed, Store, StoreError, StoreResult, TimeWindow};

pub struct MemoryStore {
    positions: DashMap<String, Vec<PositionState>>,
    flights: DashMap<Uuid, FlightRecord>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
            flights: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated availability
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn position_count(&self) -> usize {
        self.positions.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn flight_count(&self) -> usize {
        self.flights.len()
    }

    /// Positions stored for one aircraft, in arrival order
    pub fn positions_for(&self, aircraft_id: &str) -> Vec<PositionState> {
        self.positions
            .get(aircraft_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }

    fn altitudes_in(&self, aircraft_id: &str, window: TimeWindow) -> Vec<f64> {
        self.positions
            .get(aircraft_id)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|p| window.contains(p.timestamp()))
                    .map(|p| p.report.altitude_m)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn last_confirmed_label(
        &self,
        aircraft_id: &str,
        before: DateTime<Utc>,
        lookback: Duration,
    ) -> StoreResult<LastConfirmed> {
        self.check_available()?;

        let earliest = before - lookback;
        let Some(entry) = self.positions.get(aircraft_id) else {
            return Ok(LastConfirmed::NotFound);
        };

        // Later arrivals win ties on identical timestamps
        let mut latest: Option<&PositionState> = None;
        for position in entry.value().iter() {
            let ts = position.timestamp();
            if ts >= before || ts <= earliest || !position.ground_air_label.is_confirmed() {
                continue;
            }
            if latest.is_none_or(|l| ts >= l.timestamp()) {
                latest = Some(position);
            }
        }

        Ok(match latest.map(|p| p.ground_air_label) {
            Some(GroundAirLabel::Ground) => LastConfirmed::Ground,
            Some(GroundAirLabel::Air) => LastConfirmed::Air,
            _ => LastConfirmed::NotFound,
        })
    }

    async fn max_altitude(
        &self,
        aircraft_id: &str,
        window: TimeWindow,
    ) -> StoreResult<Option<f64>> {
        self.check_available()?;
        Ok(self
            .altitudes_in(aircraft_id, window)
            .into_iter()
            .reduce(f64::max))
    }

    async fn avg_altitude(
        &self,
        aircraft_id: &str,
        window: TimeWindow,
    ) -> StoreResult<Option<f64>> {
        self.check_available()?;
        let altitudes = self.altitudes_in(aircraft_id, window);
        if altitudes.is_empty() {
            return Ok(None);
        }
        Ok(Some(altitudes.iter().sum::<f64>() / altitudes.len() as f64))
    }

    async fn parallel_start(
        &self,
        aircraft_id: &str,
        window: TimeWindow,
    ) -> StoreResult<Option<String>> {
        self.check_available()?;

        let center = window.start + (window.end - window.start) / 2;
        let candidate = self
            .flights
            .iter()
            .filter(|entry| {
                let flight = entry.value();
                flight.aircraft_id != aircraft_id && window.contains(flight.start_time)
            })
            .map(|entry| {
                let flight = entry.value();
                let offset = (flight.start_time - center).num_milliseconds().abs();
                (offset, flight.aircraft_id.clone())
            })
            .min();

        Ok(candidate.map(|(_, id)| id))
    }

    async fn insert_position(&self, position: &PositionState) -> StoreResult<()> {
        self.check_available()?;
        self.positions
            .entry(position.aircraft_id().to_string())
            .or_default()
            .push(position.clone());
        Ok(())
    }

    async fn upsert_flight(&self, flight: &FlightRecord) -> StoreResult<()> {
        self.check_available()?;
        self.flights.insert(flight.id, flight.clone());
        Ok(())
    }

    async fn open_flight(&self, aircraft_id: &str) -> StoreResult<Option<FlightRecord>> {
        self.check_available()?;
        Ok(self
            .flights
            .iter()
            .filter(|entry| entry.value().aircraft_id == aircraft_id && entry.value().is_open())
            .max_by_key(|entry| entry.value().start_time)
            .map(|entry| entry.value().clone()))
    }

    async fn latest_flight(&self, aircraft_id: &str) -> StoreResult<Option<FlightRecord>> {
        self.check_available()?;
        Ok(self
            .flights
            .iter()
            .filter(|entry| entry.value().aircraft_id == aircraft_id)
            .max_by_key(|entry| (entry.value().start_time, entry.value().id))
            .map(|entry| entry.value().clone()))
    }

    async fn flight_by_start(
        &self,
        aircraft_id: &str,
        start_time: DateTime<Utc>,
    ) -> StoreResult<Option<FlightRecord>> {
        self.check_available()?;
        Ok(self
            .flights
            .iter()
            .find(|entry| {
                entry.value().aircraft_id == aircraft_id && entry.value().start_time == start_time
            })
            .map(|entry| entry.value().clone()))
    }

    async fn flights(&self) -> StoreResult<Vec<FlightRecord>> {
        self.check_available()?;
        let mut flights: Vec<FlightRecord> = self
            .flights
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        flights.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.aircraft_id.cmp(&b.aircraft_id))
        });
        Ok(flights)
    }
}
