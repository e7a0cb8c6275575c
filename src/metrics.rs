use anyhow::{Context, Result};
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Install the Prometheus recorder
/// Returns a handle that can be used to render metrics for scraping
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        // Report processing and classification latencies, in milliseconds
        .set_buckets_for_metric(
            Matcher::Suffix("_ms".to_string()),
            &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0],
        )
        .context("failed to set latency buckets")?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Background task to update process metrics
/// Updates uptime and memory usage metrics every 5 seconds
pub async fn process_metrics_task() {
    let start_time = Instant::now();

    loop {
        metrics::gauge!("process.uptime.seconds").set(start_time.elapsed().as_secs() as f64);
        metrics::gauge!("process.is_up").set(1.0);

        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status")
                && let Some(line) = status.lines().find(|line| line.starts_with("VmRSS:"))
                && let Some(kb_str) = line.split_whitespace().nth(1)
                && let Ok(kb) = kb_str.parse::<f64>()
            {
                metrics::gauge!("process.memory.bytes").set(kb * 1024.0);
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// Initialize start list metrics to zero/default values
/// This ensures metrics always appear in Prometheus queries even if no events have occurred
pub fn initialize_startlist_metrics() {
    // Report source
    metrics::counter!("startlist.source.malformed_lines_total").absolute(0);

    // Flight tracker
    metrics::counter!("startlist.tracker.invalid_reports_total").absolute(0);
    metrics::counter!("startlist.tracker.store_errors_total").absolute(0);
    metrics::counter!("startlist.tracker.starts_total").absolute(0);
    metrics::counter!("startlist.tracker.landings_total").absolute(0);
    metrics::counter!("startlist.tracker.unmatched_landings_total").absolute(0);
    metrics::counter!("startlist.tracker.flights_timed_out_total").absolute(0);
    metrics::gauge!("startlist.tracker.aircraft_locks").set(0.0);

    // Launch classification
    metrics::counter!("startlist.classifier.retries_total").absolute(0);
    metrics::counter!("startlist.classifier.failed_total").absolute(0);

    // Scheduler
    metrics::gauge!("startlist.scheduler.pending").set(0.0);
    metrics::counter!("startlist.scheduler.cancelled_total").absolute(0);
    metrics::counter!("startlist.scheduler.rejected_total").absolute(0);
}

/// Start a standalone metrics server on the specified port
pub async fn start_metrics_server(port: u16) -> Result<()> {
    let handle = init_metrics()?;
    initialize_startlist_metrics();

    tokio::spawn(process_metrics_task());

    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", addr))?;
    info!("Starting metrics server on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server failed: {}", e);
        }
    });
    Ok(())
}
