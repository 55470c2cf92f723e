//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): total proxied requests
//! - `proxy_request_duration_seconds` (histogram): entry to response completion
//!
//! # Design Decisions
//! - Each `ProxyMetrics` owns its own Prometheus recorder instead of installing
//!   a global one, so tests and embedders get isolated instances
//! - Updates are atomic; no lock is taken on the request path
//! - Recording happens when a [`RequestTimer`] drops, so every exit path counts

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use metrics::{Counter, Histogram, Key, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const REQUESTS_TOTAL: &str = "proxy_requests_total";
pub const REQUEST_DURATION: &str = "proxy_request_duration_seconds";

/// Histogram bucket upper bounds, in seconds.
pub const DURATION_BUCKETS: [f64; 6] = [0.1, 0.5, 1.0, 2.0, 5.0, 10.0];

/// Read-only view of the process-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub durations_recorded: u64,
}

/// Request counter and duration histogram for one proxy instance.
pub struct ProxyMetrics {
    requests_total: Counter,
    request_duration: Histogram,
    handle: PrometheusHandle,
    started: AtomicU64,
    finished: AtomicU64,
}

impl ProxyMetrics {
    pub fn new() -> Result<Self, BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_DURATION.to_string()),
                &DURATION_BUCKETS,
            )?
            .build_recorder();

        recorder.describe_counter(
            REQUESTS_TOTAL.into(),
            None,
            "Total number of proxy requests".into(),
        );
        recorder.describe_histogram(
            REQUEST_DURATION.into(),
            None,
            "Proxy request duration in seconds".into(),
        );

        let metadata = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));
        let requests_total =
            recorder.register_counter(&Key::from_static_name(REQUESTS_TOTAL), &metadata);
        let request_duration =
            recorder.register_histogram(&Key::from_static_name(REQUEST_DURATION), &metadata);

        Ok(Self {
            requests_total,
            request_duration,
            handle: recorder.handle(),
            started: AtomicU64::new(0),
            finished: AtomicU64::new(0),
        })
    }

    /// Count a request as started.
    pub fn on_request_start(&self) {
        self.requests_total.increment(1);
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completed request's duration.
    pub fn on_request_end(&self, duration_secs: f64) {
        self.request_duration.record(duration_secs);
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    /// Start timing a request. The duration is recorded when the timer drops.
    pub fn start_request(self: &Arc<Self>) -> RequestTimer {
        self.on_request_start();
        RequestTimer {
            metrics: Arc::clone(self),
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.started.load(Ordering::Relaxed),
            durations_recorded: self.finished.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for ProxyMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyMetrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Guard spanning one request from entry to response completion.
///
/// For streamed responses it travels with the body, so the duration covers
/// the transfer and is still recorded if the caller disconnects.
#[derive(Debug)]
pub struct RequestTimer {
    metrics: Arc<ProxyMetrics>,
    started_at: Instant,
}

impl RequestTimer {
    pub fn elapsed_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.metrics.on_request_end(self.elapsed_secs());
    }
}
