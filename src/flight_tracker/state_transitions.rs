use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::flights::{FlightRecord, LaunchType};
use crate::position::{GroundAirLabel, PositionReport, PositionState};
use crate::store::LastConfirmed;

use super::geofence::classify_position;
use super::{FlightEvent, FlightProcessorContext, TrackerError};

/// What a confirmed label means given the previous confirmed label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Start,
    Landing,
    None,
}

/// Decide the transition for a confirmed label.
/// An aircraft with no confirmed history that shows up airborne counts as a start.
pub(crate) fn detect_transition(last: LastConfirmed, current: GroundAirLabel) -> Transition {
    match (last, current) {
        (LastConfirmed::Air, GroundAirLabel::Ground) => Transition::Landing,
        (LastConfirmed::Ground | LastConfirmed::NotFound, GroundAirLabel::Air) => {
            Transition::Start
        }
        _ => Transition::None,
    }
}

/// Result of running one report through transition detection
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TransitionResult {
    pub label: GroundAirLabel,
    pub event: Option<FlightEvent>,
    /// Start time of a flight that still needs its launch classified
    pub classify_start: Option<DateTime<Utc>>,
}

/// Label the report, open or close a flight on a confirmed transition, then store it
///
/// Reads always come before writes. Flight writes come before the position write, and
/// both are safe to repeat: a start or landing that is already on record produces no
/// second event. A store failure at any point therefore either leaves nothing behind
/// or leaves flight state that the same report (or the next one) picks up again.
pub(crate) async fn process_state_transition(
    ctx: &FlightProcessorContext<'_>,
    report: PositionReport,
) -> Result<TransitionResult, TrackerError> {
    let label = classify_position(ctx.config, &report);

    let (event, classify_start) = if label.is_confirmed() {
        let lookup_start = std::time::Instant::now();
        let last = ctx
            .store
            .last_confirmed_label(
                &report.aircraft_id,
                report.timestamp,
                ctx.config.confirmed_state_lookback(),
            )
            .await?;
        metrics::histogram!("startlist.tracker.last_state_lookup_ms")
            .record(lookup_start.elapsed().as_micros() as f64 / 1000.0);

        match detect_transition(last, label) {
            Transition::Start => start_flight(ctx, &report).await?,
            Transition::Landing => (land_flight(ctx, &report).await?, None),
            Transition::None => {
                trace!(
                    "Aircraft {} still {} (last confirmed {:?})",
                    report.aircraft_id, label, last
                );
                (None, None)
            }
        }
    } else {
        trace!(
            "Aircraft {} position is ambiguous at {} ({}m), stored without state change",
            report.aircraft_id, report.timestamp, report.altitude_m
        );
        (None, None)
    };

    ctx.store
        .insert_position(&PositionState::new(report, label))
        .await?;

    Ok(TransitionResult {
        label,
        event,
        classify_start,
    })
}

/// Open a new flight, closing a stale open one first
async fn start_flight(
    ctx: &FlightProcessorContext<'_>,
    report: &PositionReport,
) -> Result<(Option<FlightEvent>, Option<DateTime<Utc>>), TrackerError> {
    let open = ctx.store.open_flight(&report.aircraft_id).await?;

    // Same report again: the flight is on record, only its classification may be missing
    if let Some(existing) = &open
        && existing.start_time == report.timestamp
    {
        debug!(
            "Flight {} for {} already started at {}",
            existing.id, report.aircraft_id, report.timestamp
        );
        let classify_start =
            (existing.launch_type == LaunchType::Unknown).then_some(existing.start_time);
        return Ok((None, classify_start));
    }

    // At most one open flight per aircraft. An open flight here means the aircraft was
    // lost for longer than the lookback window and came back airborne.
    if let Some(mut stale) = open {
        warn!(
            "Aircraft {} has open flight {} from {} without a landing - timing it out",
            report.aircraft_id, stale.id, stale.start_time
        );
        stale.timed_out_at = Some(report.timestamp);
        ctx.store.upsert_flight(&stale).await?;
        metrics::counter!("startlist.tracker.flights_timed_out_total").increment(1);
    }

    let flight =
        FlightRecord::new_started(&report.aircraft_id, &report.callsign, report.timestamp);
    ctx.store.upsert_flight(&flight).await?;

    info!(
        "*** {} ({}) started at {}",
        display_name(report),
        report.aircraft_id,
        report.timestamp
    );
    metrics::counter!("startlist.tracker.starts_total").increment(1);

    let event = FlightEvent::Start {
        aircraft_id: report.aircraft_id.clone(),
        callsign: report.callsign.clone(),
        time: report.timestamp,
        flight_id: flight.id,
    };
    Ok((Some(event), Some(report.timestamp)))
}

/// Close the open flight with this report's timestamp as landing time
async fn land_flight(
    ctx: &FlightProcessorContext<'_>,
    report: &PositionReport,
) -> Result<Option<FlightEvent>, TrackerError> {
    let open = ctx.store.open_flight(&report.aircraft_id).await?;
    let latest = match &open {
        Some(_) => None,
        None => ctx.store.latest_flight(&report.aircraft_id).await?,
    };

    let flight_id = match (open, latest) {
        (Some(mut flight), _) if flight.start_time < report.timestamp => {
            flight.landing_time = Some(report.timestamp);
            ctx.store.upsert_flight(&flight).await?;
            debug!(
                "Closed flight {} for {} after {} minutes",
                flight.id,
                report.aircraft_id,
                (report.timestamp - flight.start_time).num_minutes()
            );
            Some(flight.id)
        }
        (Some(flight), _) => {
            warn!(
                "Aircraft {} landing at {} is not after start {} of flight {} - leaving it open",
                report.aircraft_id, report.timestamp, flight.start_time, flight.id
            );
            None
        }
        // Landing already recorded, by this report or by one whose position write failed
        (None, Some(landed)) if landed.landing_time.is_some_and(|t| t <= report.timestamp) => {
            debug!(
                "Flight {} for {} already landed at {:?}",
                landed.id, report.aircraft_id, landed.landing_time
            );
            return Ok(None);
        }
        (None, _) => {
            warn!(
                "Aircraft {} landed at {} without an open flight",
                report.aircraft_id, report.timestamp
            );
            None
        }
    };

    if flight_id.is_none() {
        metrics::counter!("startlist.tracker.unmatched_landings_total").increment(1);
    }
    info!(
        "*** {} ({}) landed at {}",
        display_name(report),
        report.aircraft_id,
        report.timestamp
    );
    metrics::counter!("startlist.tracker.landings_total").increment(1);

    Ok(Some(FlightEvent::Landing {
        aircraft_id: report.aircraft_id.clone(),
        callsign: report.callsign.clone(),
        time: report.timestamp,
        flight_id,
    }))
}

fn display_name(report: &PositionReport) -> &str {
    if report.callsign.trim().is_empty() {
        report.aircraft_id.as_str()
    } else {
        report.callsign.trim()
    }
}
