//! Statistics tracking for the monitor.
//!
//! Counters are updated from the pipeline, the lookup layer, the sinks and
//! the command relay, and read by the periodic summary and the metrics
//! endpoint.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::event::DirectedBranch;

/// Thread-safe statistics collector.
#[derive(Debug)]
pub struct MonitorStats {
    /// Envelopes received, parsed or not
    pub events_received: AtomicU64,

    /// Envelopes that failed to parse
    pub malformed: AtomicU64,

    /// Bytes of raw envelope text
    pub bytes_received: AtomicU64,

    /// Records handed to the sink dispatcher
    pub records_forwarded: AtomicU64,

    /// Failed sink sends
    pub sink_failures: AtomicU64,

    pub lookup_hits: AtomicU64,
    pub lookup_misses: AtomicU64,

    /// Commands that passed auth and found their radio
    pub commands_queued: AtomicU64,

    /// Commands dropped for auth or an unknown radio
    pub commands_dropped: AtomicU64,

    /// Commands actually sent to a radio
    pub commands_relayed: AtomicU64,

    /// Grid lookup latency in microseconds
    lookup_latency: RwLock<Histogram<u64>>,

    events_by_type: RwLock<HashMap<String, u64>>,
    directed_by_branch: RwLock<HashMap<DirectedBranch, u64>>,
    hits_by_backend: RwLock<HashMap<String, u64>>,
    failures_by_sink: RwLock<HashMap<String, u64>>,

    start_time: Instant,
}

impl MonitorStats {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            records_forwarded: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            lookup_hits: AtomicU64::new(0),
            lookup_misses: AtomicU64::new(0),
            commands_queued: AtomicU64::new(0),
            commands_dropped: AtomicU64::new(0),
            commands_relayed: AtomicU64::new(0),
            // 1us to 60s, 3 significant figures
            lookup_latency: RwLock::new(
                Histogram::new_with_bounds(1, 60_000_000, 3)
                    .expect("Failed to create latency histogram"),
            ),
            events_by_type: RwLock::new(HashMap::new()),
            directed_by_branch: RwLock::new(HashMap::new()),
            hits_by_backend: RwLock::new(HashMap::new()),
            failures_by_sink: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a received envelope.
    pub fn record_event(&self, bytes: u64) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record the type of a parsed envelope.
    pub fn record_event_type(&self, kind: &str) {
        if let Ok(mut map) = self.events_by_type.write() {
            *map.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_directed(&self, branch: DirectedBranch) {
        if let Ok(mut map) = self.directed_by_branch.write() {
            *map.entry(branch).or_insert(0) += 1;
        }
    }

    pub fn record_forward(&self) {
        self.records_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self, sink: &str) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut map) = self.failures_by_sink.write() {
            *map.entry(sink.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_lookup_latency(&self, latency: Duration) {
        let micros = latency.as_micros().min(60_000_000) as u64;
        if let Ok(mut hist) = self.lookup_latency.write() {
            let _ = hist.record(micros.max(1));
        }
    }

    pub fn record_lookup_hit(&self, backend: &str) {
        self.lookup_hits.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut map) = self.hits_by_backend.write() {
            *map.entry(backend.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_lookup_miss(&self) {
        self.lookup_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_queued(&self) {
        self.commands_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_dropped(&self) {
        self.commands_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_relayed(&self) {
        self.commands_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn events_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.events_received.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Generate a summary report.
    pub fn summary(&self) -> StatsSummary {
        let lookup_latency_us = self
            .lookup_latency
            .read()
            .ok()
            .filter(|h| !h.is_empty())
            .map(|h| HistogramPercentiles {
                p50: h.value_at_quantile(0.50),
                p90: h.value_at_quantile(0.90),
                p99: h.value_at_quantile(0.99),
                min: h.min(),
                max: h.max(),
                mean: h.mean(),
            });

        let events_by_type = self
            .events_by_type
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();

        let directed_by_branch = self
            .directed_by_branch
            .read()
            .map(|m| m.iter().map(|(k, v)| (k.to_string(), *v)).collect())
            .unwrap_or_default();

        let hits_by_backend = self
            .hits_by_backend
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();

        let failures_by_sink = self
            .failures_by_sink
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();

        StatsSummary {
            elapsed_secs: self.elapsed().as_secs_f64(),
            events_received: self.events_received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            events_per_second: self.events_per_second(),
            records_forwarded: self.records_forwarded.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            lookup_hits: self.lookup_hits.load(Ordering::Relaxed),
            lookup_misses: self.lookup_misses.load(Ordering::Relaxed),
            commands_queued: self.commands_queued.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
            commands_relayed: self.commands_relayed.load(Ordering::Relaxed),
            lookup_latency_us,
            events_by_type,
            directed_by_branch,
            hits_by_backend,
            failures_by_sink,
        }
    }
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile values from a histogram.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Summary of collected statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub elapsed_secs: f64,
    pub events_received: u64,
    pub malformed: u64,
    pub bytes_received: u64,
    pub events_per_second: f64,
    pub records_forwarded: u64,
    pub sink_failures: u64,
    pub lookup_hits: u64,
    pub lookup_misses: u64,
    pub commands_queued: u64,
    pub commands_dropped: u64,
    pub commands_relayed: u64,
    pub lookup_latency_us: Option<HistogramPercentiles>,
    pub events_by_type: HashMap<String, u64>,
    pub directed_by_branch: HashMap<String, u64>,
    pub hits_by_backend: HashMap<String, u64>,
    pub failures_by_sink: HashMap<String, u64>,
}

fn write_counts(
    f: &mut std::fmt::Formatter<'_>,
    title: &str,
    counts: &HashMap<String, u64>,
) -> std::fmt::Result {
    if counts.is_empty() {
        return Ok(());
    }
    writeln!(f, "{}:", title)?;
    let mut sorted: Vec<_> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (name, count) in sorted {
        writeln!(f, "  {}: {}", name, count)?;
    }
    writeln!(f)
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f, "                  JS8 MONITOR STATISTICS")?;
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f)?;
        writeln!(f, "Runtime: {:.1}s", self.elapsed_secs)?;
        writeln!(f, "Events received: {}", self.events_received)?;
        writeln!(f, "Malformed: {}", self.malformed)?;
        writeln!(f, "Bytes received: {} KB", self.bytes_received / 1024)?;
        writeln!(f, "Rate: {:.2} events/sec", self.events_per_second)?;
        writeln!(f, "Records forwarded: {}", self.records_forwarded)?;
        writeln!(f, "Sink failures: {}", self.sink_failures)?;
        writeln!(
            f,
            "Grid lookups: {} hits, {} misses",
            self.lookup_hits, self.lookup_misses
        )?;
        writeln!(
            f,
            "Commands: {} queued, {} dropped, {} relayed",
            self.commands_queued, self.commands_dropped, self.commands_relayed
        )?;
        writeln!(f)?;

        if let Some(ref p) = self.lookup_latency_us {
            writeln!(f, "Lookup Latency (us):")?;
            writeln!(f, "  Min: {}, Max: {}, Mean: {:.1}", p.min, p.max, p.mean)?;
            writeln!(f, "  P50: {}, P90: {}, P99: {}", p.p50, p.p90, p.p99)?;
            writeln!(f)?;
        }

        write_counts(f, "Events by Type", &self.events_by_type)?;
        write_counts(f, "Directed by Branch", &self.directed_by_branch)?;
        write_counts(f, "Lookup Hits by Backend", &self.hits_by_backend)?;
        write_counts(f, "Failures by Sink", &self.failures_by_sink)?;

        Ok(())
    }
}
