use prometheus::{Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::env;
use tracing::warn;

lazy_static::lazy_static! {
    pub static ref METRIC_NAMESPACE: String =
        env::var("METRIC_NAMESPACE").unwrap_or_else(|_| "rust_loadgen".to_string());

    pub static ref REQUEST_TOTAL: IntCounter =
        IntCounter::with_opts(
            Opts::new("requests_total", "Total number of HTTP requests attempted")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref REQUEST_STATUS_CODES: IntCounterVec =
        IntCounterVec::new(
            Opts::new("requests_status_codes_total", "Number of HTTP requests by status code")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["status_code"]
        ).unwrap();

    pub static ref REQUEST_ERRORS_BY_CATEGORY: IntCounterVec =
        IntCounterVec::new(
            Opts::new("request_errors_by_category_total", "Number of failed requests by error category")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["category"]
        ).unwrap();

    pub static ref REQUEST_DURATION_SECONDS: Histogram =
        Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "request_duration_seconds",
                "HTTP request latencies in seconds, including the body drain."
            ).namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref ACTIVE_WORKERS: IntGauge =
        IntGauge::with_opts(
            Opts::new("active_workers", "Workers spawned and not yet finished")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();
}

/// Registers all metrics with the default Prometheus registry.
///
/// Fails if called twice in the same process.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let registry = prometheus::default_registry();
    registry.register(Box::new(REQUEST_TOTAL.clone()))?;
    registry.register(Box::new(REQUEST_STATUS_CODES.clone()))?;
    registry.register(Box::new(REQUEST_ERRORS_BY_CATEGORY.clone()))?;
    registry.register(Box::new(REQUEST_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(ACTIVE_WORKERS.clone()))?;
    Ok(())
}

/// Encodes every metric in `registry` in the text exposition format.
pub fn gather_metrics_string(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return String::from("# ERROR ENCODING METRICS");
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        warn!(error = %e, "Metrics output is not valid UTF-8");
        String::from("# ERROR ENCODING METRICS TO UTF-8")
    })
}

/// Returns a static string label for common HTTP status codes.
///
/// Avoids a heap `String` allocation on every request in the hot path.
/// Uncommon codes fall back to "other" rather than allocating a unique string.
pub fn status_code_label(code: u16) -> &'static str {
    match code {
        200 => "200",
        201 => "201",
        202 => "202",
        204 => "204",
        301 => "301",
        302 => "302",
        304 => "304",
        400 => "400",
        404 => "404",
        405 => "405",
        408 => "408",
        413 => "413",
        429 => "429",
        500 => "500",
        502 => "502",
        503 => "503",
        504 => "504",
        _ => "other",
    }
}
