//! Prometheus metrics HTTP server.
//!
//! Exposes monitor statistics in Prometheus text format via HTTP endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tracing::info;

use crate::stats::MonitorStats;

/// Start the Prometheus metrics HTTP server.
///
/// Runs until the task is dropped and serves metrics at `/metrics`.
/// Returns an error if the server fails to bind to the port.
pub async fn start_metrics_server(
    port: u16,
    stats: Arc<MonitorStats>,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let app = router(stats);

    let listener = TcpListener::bind(addr).await?;
    info!("Prometheus metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))
}

fn router(stats: Arc<MonitorStats>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(stats)
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Prometheus metrics endpoint.
async fn metrics_handler(State(stats): State<Arc<MonitorStats>>) -> impl IntoResponse {
    let output = format_prometheus_metrics(&stats);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}

fn push_metric(output: &mut String, name: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
    output.push_str(&format!("# HELP {} {}\n", name, help));
    output.push_str(&format!("# TYPE {} {}\n", name, kind));
    output.push_str(&format!("{} {}\n", name, value));
}

fn push_labeled(
    output: &mut String,
    name: &str,
    help: &str,
    label: &str,
    counts: &HashMap<String, u64>,
) {
    output.push_str(&format!("# HELP {} {}\n", name, help));
    output.push_str(&format!("# TYPE {} counter\n", name));
    let mut sorted: Vec<_> = counts.iter().collect();
    sorted.sort();
    for (value, count) in sorted {
        output.push_str(&format!("{}{{{}=\"{}\"}} {}\n", name, label, value, count));
    }
}

/// Format statistics as Prometheus text format.
fn format_prometheus_metrics(stats: &MonitorStats) -> String {
    let summary = stats.summary();
    let mut output = String::with_capacity(4096);

    push_metric(
        &mut output,
        "js8_uptime_seconds",
        "gauge",
        "Time since the monitor started",
        format!("{:.3}", summary.elapsed_secs),
    );
    push_metric(
        &mut output,
        "js8_events_total",
        "counter",
        "Envelopes received from JS8Call",
        summary.events_received,
    );
    push_metric(
        &mut output,
        "js8_malformed_total",
        "counter",
        "Envelopes that failed to parse",
        summary.malformed,
    );
    push_metric(
        &mut output,
        "js8_bytes_received_total",
        "counter",
        "Total bytes of envelope text received",
        summary.bytes_received,
    );
    push_metric(
        &mut output,
        "js8_records_forwarded_total",
        "counter",
        "Records forwarded to the sinks",
        summary.records_forwarded,
    );
    push_metric(
        &mut output,
        "js8_sink_failures_total",
        "counter",
        "Failed sends to downstream sinks",
        summary.sink_failures,
    );
    push_metric(
        &mut output,
        "js8_lookup_hits_total",
        "counter",
        "Grid lookups that found a grid",
        summary.lookup_hits,
    );
    push_metric(
        &mut output,
        "js8_lookup_misses_total",
        "counter",
        "Grid lookups every backend missed",
        summary.lookup_misses,
    );
    push_metric(
        &mut output,
        "js8_commands_queued_total",
        "counter",
        "Commands queued for relay",
        summary.commands_queued,
    );
    push_metric(
        &mut output,
        "js8_commands_dropped_total",
        "counter",
        "Commands dropped for auth or an unknown radio",
        summary.commands_dropped,
    );
    push_metric(
        &mut output,
        "js8_commands_relayed_total",
        "counter",
        "Commands sent to a radio",
        summary.commands_relayed,
    );

    push_labeled(
        &mut output,
        "js8_events_by_type_total",
        "Envelopes broken down by API type",
        "type",
        &summary.events_by_type,
    );
    push_labeled(
        &mut output,
        "js8_directed_total",
        "Directed messages broken down by branch",
        "branch",
        &summary.directed_by_branch,
    );
    push_labeled(
        &mut output,
        "js8_lookup_hits_by_backend_total",
        "Grid lookup hits broken down by backend",
        "backend",
        &summary.hits_by_backend,
    );
    push_labeled(
        &mut output,
        "js8_sink_failures_by_sink_total",
        "Sink failures broken down by sink",
        "sink",
        &summary.failures_by_sink,
    );

    if let Some(ref latency) = summary.lookup_latency_us {
        output.push_str("# HELP js8_lookup_latency_microseconds Grid lookup latency\n");
        output.push_str("# TYPE js8_lookup_latency_microseconds summary\n");
        output.push_str(&format!(
            "js8_lookup_latency_microseconds{{quantile=\"0.5\"}} {}\n",
            latency.p50
        ));
        output.push_str(&format!(
            "js8_lookup_latency_microseconds{{quantile=\"0.9\"}} {}\n",
            latency.p90
        ));
        output.push_str(&format!(
            "js8_lookup_latency_microseconds{{quantile=\"0.99\"}} {}\n",
            latency.p99
        ));
        output.push_str(&format!(
            "js8_lookup_latency_microseconds_count {}\n",
            summary.lookup_hits + summary.lookup_misses
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DirectedBranch;
    use std::time::Duration;

    #[test]
    fn test_format_prometheus_metrics_empty() {
        let stats = MonitorStats::new();
        let output = format_prometheus_metrics(&stats);

        assert!(output.contains("js8_uptime_seconds"));
        assert!(output.contains("js8_events_total 0"));
        assert!(output.contains("js8_malformed_total 0"));
        assert!(!output.contains("js8_lookup_latency_microseconds{"));
    }

    #[test]
    fn test_format_prometheus_metrics_with_data() {
        let stats = MonitorStats::new();
        stats.record_event(100);
        stats.record_event_type("RX.DIRECTED");
        stats.record_directed(DirectedBranch::Cq);
        stats.record_lookup_hit("fcc");
        stats.record_lookup_latency(Duration::from_millis(2));

        let output = format_prometheus_metrics(&stats);

        assert!(output.contains("js8_events_total 1"));
        assert!(output.contains("js8_bytes_received_total 100"));
        assert!(output.contains("js8_events_by_type_total{type=\"RX.DIRECTED\"} 1"));
        assert!(output.contains("js8_directed_total{branch=\"cq\"} 1"));
        assert!(output.contains("js8_lookup_hits_by_backend_total{backend=\"fcc\"} 1"));
        assert!(output.contains("js8_lookup_latency_microseconds_count 1"));
    }

    #[test]
    fn test_prometheus_format_validity() {
        let stats = MonitorStats::new();
        stats.record_sink_failure("n1mm");
        let output = format_prometheus_metrics(&stats);

        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            assert_eq!(parts.len(), 2, "Invalid metric line: {}", line);
        }
    }

    #[tokio::test]
    async fn test_endpoints() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(MonitorStats::new());
        stats.record_event(10);
        tokio::spawn(async move {
            axum::serve(listener, router(stats)).await.unwrap();
        });

        let client = reqwest::Client::new();
        let health = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(health.status(), 200);

        let body = client
            .get(format!("http://{}/metrics", addr))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("js8_events_total 1"));
    }
}
