use anyhow::{Context, Result};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use startlist::ddb::DeviceDatabase;
use startlist::message_sources::{FileReportSource, ReportSource};
use startlist::{FlightTracker, MemoryStore, PositionReport, Store, TrackerConfig};

/// Per-worker channel capacity
const WORKER_QUEUE_SIZE: usize = 1_000;

/// How often idle aircraft locks are dropped during long replays
const LOCK_CLEANUP_INTERVAL_SECS: u64 = 300;

pub struct ReplayOptions {
    pub file: PathBuf,
    pub ddb: Option<PathBuf>,
    pub fetch_ddb: bool,
    pub workers: usize,
    pub metrics_port: Option<u16>,
}

/// Worker index for an aircraft. All reports of one aircraft go to the same worker,
/// which keeps them in file order.
fn shard_for(aircraft_id: &str, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    aircraft_id.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}

fn spawn_report_workers(
    tracker: &FlightTracker,
    workers: usize,
) -> (Vec<flume::Sender<PositionReport>>, Vec<JoinHandle<()>>) {
    let mut senders = Vec::with_capacity(workers);
    let mut handles = Vec::with_capacity(workers);

    for worker_id in 0..workers {
        let (tx, rx) = flume::bounded::<PositionReport>(WORKER_QUEUE_SIZE);
        let tracker = tracker.clone();

        handles.push(tokio::spawn(async move {
            let mut processed = 0u64;
            while let Ok(report) = rx.recv_async().await {
                // Errors are logged and counted by the tracker
                if let Ok(outcome) = tracker.process_report(report).await
                    && outcome.event.is_some()
                {
                    metrics::counter!("startlist.replay.events_total").increment(1);
                }
                processed += 1;
                metrics::gauge!("startlist.replay.queue_depth", "worker" => worker_id.to_string())
                    .set(rx.len() as f64);
            }
            info!(
                "Replay worker {} stopped after {} reports",
                worker_id, processed
            );
        }));
        senders.push(tx);
    }
    info!("Spawned {} replay workers", workers);

    (senders, handles)
}

async fn load_device_database(options: &ReplayOptions) -> Result<Option<DeviceDatabase>> {
    if let Some(path) = &options.ddb {
        return DeviceDatabase::load(path).map(Some);
    }
    if options.fetch_ddb {
        let mut db = DeviceDatabase::new();
        db.fetch().await?;
        return Ok(Some(db));
    }
    Ok(None)
}

pub async fn handle_replay(config: TrackerConfig, options: ReplayOptions) -> Result<()> {
    if let Some(port) = options.metrics_port {
        startlist::metrics::start_metrics_server(port).await?;
    }

    let ddb = load_device_database(&options).await?;
    let workers = options.workers.max(1);

    // Long enough for the last start's classification including every retry
    let drain_timeout = Duration::from_secs(config.classification_delay_s)
        + config.classification_retry_delay() * (config.classification_max_retries + 1)
        + Duration::from_secs(5);

    let store = Arc::new(MemoryStore::new());
    let tracker = FlightTracker::new(store.clone(), config);
    tracker.start_lock_cleanup(LOCK_CLEANUP_INTERVAL_SECS);

    let (senders, handles) = spawn_report_workers(&tracker, workers);

    let mut source = FileReportSource::from_file(&options.file)
        .await
        .with_context(|| format!("Failed to open {:?}", options.file))?;

    while let Some(mut report) = source.next_report().await? {
        if report.callsign.trim().is_empty()
            && let Some(callsign) = ddb
                .as_ref()
                .and_then(|db| db.callsign_for(&report.aircraft_id))
        {
            report.callsign = callsign;
        }

        let shard = shard_for(&report.aircraft_id, workers);
        senders[shard]
            .send_async(report)
            .await
            .context("Replay worker stopped unexpectedly")?;
    }
    info!(
        "Read {} reports from {:?} ({} skipped)",
        source.reports_read(),
        options.file,
        source.lines_skipped()
    );

    // Closing the channels lets the workers finish their queues and exit
    drop(senders);
    for handle in handles {
        handle.await.context("Replay worker panicked")?;
    }

    info!(
        "Waiting up to {:?} for pending launch classifications",
        drain_timeout
    );
    let abandoned = tracker.shutdown(drain_timeout).await;
    if !abandoned.is_empty() {
        warn!(
            "{} launch classifications did not finish",
            abandoned.len()
        );
    }

    let flights = store.flights().await?;
    info!("Replay produced {} flights", flights.len());
    println!(
        "{}",
        serde_json::to_string_pretty(&flights).context("Failed to serialize flights")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_is_stable_and_in_range() {
        for id in ["DDA5BA", "123456", "FLR3F1234", ""] {
            let shard = shard_for(id, 7);
            assert!(shard < 7);
            assert_eq!(shard, shard_for(id, 7));
        }
        assert_eq!(shard_for("DDA5BA", 1), 0);
    }
}
