use hyper::StatusCode;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

use crate::metrics::gather_metrics_string;

/// Up/down flag of the target service.
///
/// Starts up and goes down the first time a request is slower than the
/// latency threshold. Nothing sets it back up.
#[derive(Debug)]
pub struct ServiceStatus {
    up: AtomicBool,
}

impl ServiceStatus {
    pub fn new() -> Self {
        Self {
            up: AtomicBool::new(true),
        }
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Relaxed)
    }

    pub fn mark_down(&self) {
        self.up.store(false, Ordering::Relaxed);
    }

    pub fn text(&self) -> &'static str {
        if self.is_up() {
            "Service is UP"
        } else {
            "Service is DOWN"
        }
    }
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Request metrics exposed on `/metrics`.
///
/// Kept in a private registry so the target and the load generator can share
/// a process (as they do in tests) without their collectors colliding.
pub struct TargetMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
}

impl TargetMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["path", "method", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Histogram of response time for handler in seconds",
            ),
            &["path", "method", "status"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
        })
    }

    pub fn observe(&self, path: &str, method: &str, status: StatusCode, elapsed: Duration) {
        let status = status.canonical_reason().unwrap_or("Unknown");
        let labels = [path, method, status];
        self.requests_total.with_label_values(&labels).inc();
        self.request_duration
            .with_label_values(&labels)
            .observe(elapsed.as_secs_f64());
    }

    pub fn requests(&self, path: &str, method: &str, status: StatusCode) -> u64 {
        let status = status.canonical_reason().unwrap_or("Unknown");
        self.requests_total
            .with_label_values(&[path, method, status])
            .get()
    }

    /// Text exposition of every target metric.
    pub fn encode(&self) -> String {
        gather_metrics_string(&self.registry)
    }
}

/// Everything the target's handlers share.
pub struct TargetState {
    pub status: ServiceStatus,
    pub metrics: TargetMetrics,
    pub latency_threshold: Duration,
}

impl TargetState {
    pub fn new(latency_threshold: Duration) -> Result<Self, prometheus::Error> {
        Ok(Self {
            status: ServiceStatus::new(),
            metrics: TargetMetrics::new()?,
            latency_threshold,
        })
    }

    /// Records a handled request and flips the service down if it was slow.
    pub fn record(&self, path: &str, method: &str, status: StatusCode, elapsed: Duration) {
        self.metrics.observe(path, method, status, elapsed);

        if elapsed > self.latency_threshold && self.status.is_up() {
            warn!(
                path = path,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.latency_threshold.as_millis() as u64,
                "Request exceeded latency threshold, marking service down"
            );
            self.status.mark_down();
        }
    }
}
