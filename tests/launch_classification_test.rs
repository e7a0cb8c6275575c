mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;

use startlist::flight_tracker::LaunchClassifier;
use startlist::{FlightRecord, FlightTracker, LaunchType, MemoryStore, Store};

const DRAIN: Duration = Duration::from_secs(300);

async fn flight_of(store: &MemoryStore, aircraft_id: &str) -> FlightRecord {
    store
        .flights()
        .await
        .unwrap()
        .into_iter()
        .find(|f| f.aircraft_id == aircraft_id)
        .expect("flight should exist")
}

async fn fly(tracker: &FlightTracker, aircraft_id: &str, climb: &[(i64, f64)]) {
    let mut reports = vec![on_ground(aircraft_id, 0)];
    reports.extend(
        climb
            .iter()
            .map(|&(offset, altitude)| airborne(aircraft_id, offset, altitude)),
    );
    feed(tracker, reports).await;
}

#[tokio::test(start_paused = true)]
async fn test_steep_climb_alone_is_winch() {
    let (tracker, store) = tracker();

    // 600 m above the field within the observation delay
    fly(&tracker, "WINCH1", &[(10, 600.0), (20, 850.0), (28, 1000.0)]).await;
    assert_eq!(tracker.scheduler().pending_count(), 1);

    let abandoned = tracker.shutdown(DRAIN).await;
    assert!(abandoned.is_empty());

    let flight = flight_of(&store, "WINCH1").await;
    assert_eq!(flight.launch_type, LaunchType::Winch);
    assert_eq!(flight.tow_partner_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_shallow_climb_alone_is_self_launch() {
    let (tracker, store) = tracker();

    // 150 m above the field
    fly(&tracker, "MOTOR1", &[(10, 480.0), (20, 520.0), (28, 550.0)]).await;
    tracker.shutdown(DRAIN).await;

    let flight = flight_of(&store, "MOTOR1").await;
    assert_eq!(flight.launch_type, LaunchType::SelfLaunch);
    assert_eq!(flight.tow_partner_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_starts_at_matching_altitude_are_mutual_aerotow() {
    let (tracker, store) = tracker();

    fly(&tracker, "GLIDER", &[(10, 600.0), (20, 650.0), (30, 700.0)]).await;
    fly(&tracker, "TOWPLN", &[(10, 610.0), (20, 660.0), (30, 710.0)]).await;
    tracker.shutdown(DRAIN).await;

    let glider = flight_of(&store, "GLIDER").await;
    let towplane = flight_of(&store, "TOWPLN").await;

    assert_eq!(glider.launch_type, LaunchType::Aerotow);
    assert_eq!(towplane.launch_type, LaunchType::Aerotow);
    assert_eq!(glider.tow_partner_id.as_deref(), Some("TOWPLN"));
    assert_eq!(towplane.tow_partner_id.as_deref(), Some("GLIDER"));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_starts_at_different_altitudes_are_not_aerotow() {
    let (tracker, store) = tracker();

    fly(&tracker, "WINCH1", &[(10, 700.0), (20, 900.0), (28, 1000.0)]).await;
    fly(&tracker, "MOTOR1", &[(15, 450.0), (25, 500.0), (29, 540.0)]).await;
    tracker.shutdown(DRAIN).await;

    let winch = flight_of(&store, "WINCH1").await;
    let motor = flight_of(&store, "MOTOR1").await;
    assert_eq!(winch.launch_type, LaunchType::Winch);
    assert_eq!(winch.tow_partner_id, None);
    assert_eq!(motor.launch_type, LaunchType::SelfLaunch);
    assert_eq!(motor.tow_partner_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_starts_outside_parallel_window_are_independent() {
    let (tracker, store) = tracker();

    fly(&tracker, "FIRST1", &[(10, 600.0), (20, 650.0), (30, 700.0)]).await;
    fly(&tracker, "SECOND", &[(60, 600.0), (70, 650.0), (80, 700.0)]).await;
    tracker.shutdown(DRAIN).await;

    for id in ["FIRST1", "SECOND"] {
        let flight = flight_of(&store, id).await;
        assert_eq!(flight.launch_type, LaunchType::Winch);
        assert_eq!(flight.tow_partner_id, None);
    }
}

#[tokio::test]
async fn test_reclassifying_unchanged_data_gives_identical_record() {
    let (tracker, store) = tracker();
    fly(&tracker, "WINCH1", &[(10, 600.0), (20, 850.0), (28, 1000.0)]).await;

    let classifier = LaunchClassifier::new(store.clone(), Arc::new(config()));
    classifier.classify_and_record("WINCH1", at(10)).await.unwrap();
    let first = flight_of(&store, "WINCH1").await;

    classifier.classify_and_record("WINCH1", at(10)).await.unwrap();
    let second = flight_of(&store, "WINCH1").await;

    assert_eq!(first, second);
    assert_eq!(second.launch_type, LaunchType::Winch);
    assert_eq!(store.flight_count(), 1);
}

#[tokio::test]
async fn test_no_altitude_data_is_unknown() {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_flight(&FlightRecord::new_started("GHOST1", "", at(0)))
        .await
        .unwrap();

    let classifier = LaunchClassifier::new(store.clone(), Arc::new(config()));
    let classification = classifier.classify_and_record("GHOST1", at(0)).await.unwrap();

    assert_eq!(classification.launch_type, LaunchType::Unknown);
    assert_eq!(flight_of(&store, "GHOST1").await.launch_type, LaunchType::Unknown);
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_during_classification_leaves_flight_unknown() {
    let (tracker, store) = tracker();
    fly(&tracker, "WINCH1", &[(10, 600.0), (20, 850.0), (28, 1000.0)]).await;

    store.set_available(false);
    let abandoned = tracker.shutdown(DRAIN).await;
    assert!(abandoned.is_empty());

    store.set_available(true);
    assert_eq!(
        flight_of(&store, "WINCH1").await.launch_type,
        LaunchType::Unknown
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_reports_unfinished_classifications() {
    let (tracker, store) = tracker();
    fly(&tracker, "WINCH1", &[(10, 600.0)]).await;

    let abandoned = tracker.shutdown(Duration::from_secs(1)).await;
    assert_eq!(abandoned.len(), 1);
    assert_eq!(abandoned[0].aircraft_id, "WINCH1");
    assert_eq!(abandoned[0].start_time, at(10));
    assert_eq!(
        flight_of(&store, "WINCH1").await.launch_type,
        LaunchType::Unknown
    );
}
