use bytes::Bytes;
use std::fmt;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, warn};

use crate::errors::ErrorCategory;
use crate::metrics::{
    status_code_label, REQUEST_DURATION_SECONDS, REQUEST_ERRORS_BY_CATEGORY,
    REQUEST_STATUS_CODES, REQUEST_TOTAL,
};
use crate::workload::{RequestMethod, PAYLOAD_CONTENT_TYPE};

/// Configuration for a worker task.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub task_id: usize,
    pub url: String,
    pub method: RequestMethod,
    /// Shared POST body. Cloning `Bytes` only bumps a reference count.
    pub payload: Option<Bytes>,
    /// Number of sequential requests this worker sends.
    pub requests: u64,
    pub request_delay: Duration,
}

/// Result of a single request attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// A status line was received and the body has been read. `body_error` is
    /// set when the body broke off before its end.
    Response {
        status: u16,
        body_error: Option<String>,
    },

    /// No response: connection failure, timeout, reset.
    Failed {
        category: ErrorCategory,
        message: String,
    },
}

impl RequestOutcome {
    pub fn is_response(&self) -> bool {
        matches!(self, RequestOutcome::Response { .. })
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOutcome::Response {
                status,
                body_error: None,
            } => write!(f, "Response code: {}", status),
            RequestOutcome::Response {
                status,
                body_error: Some(error),
            } => write!(f, "Response code: {} (body read failed: {})", status, error),
            RequestOutcome::Failed { message, .. } => write!(f, "Request failed: {}", message),
        }
    }
}

/// What a worker did, returned when its loop ends.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub task_id: usize,
    /// Always equals the assigned request count; failures never cut the loop short.
    pub iterations: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub elapsed: Duration,
}

/// Runs a single worker: `config.requests` sequential requests, each followed
/// by `config.request_delay`.
///
/// A failed request is printed and skipped; it is never retried and never
/// ends the loop early. The client is owned by this worker for its lifetime.
pub async fn run_worker(client: reqwest::Client, config: WorkerConfig) -> WorkerReport {
    debug!(
        task_id = config.task_id,
        url = %config.url,
        method = %config.method,
        requests = config.requests,
        "Worker starting"
    );

    let started = Instant::now();
    let mut report = WorkerReport {
        task_id: config.task_id,
        iterations: 0,
        succeeded: 0,
        failed: 0,
        elapsed: Duration::ZERO,
    };

    for _ in 0..config.requests {
        let outcome = send_request(&client, &config).await;
        println!("{}", outcome);

        report.iterations += 1;
        if outcome.is_response() {
            report.succeeded += 1;
        } else {
            report.failed += 1;
        }

        if !config.request_delay.is_zero() {
            time::sleep(config.request_delay).await;
        }
    }

    report.elapsed = started.elapsed();
    debug!(
        task_id = config.task_id,
        iterations = report.iterations,
        succeeded = report.succeeded,
        failed = report.failed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Worker finished"
    );
    report
}

/// Sends one request and drains its response body.
pub async fn send_request(client: &reqwest::Client, config: &WorkerConfig) -> RequestOutcome {
    REQUEST_TOTAL.inc();
    let request_start_time = Instant::now();

    let outcome = match build_request(client, config).send().await {
        Ok(mut response) => {
            let status = response.status().as_u16();
            REQUEST_STATUS_CODES
                .with_label_values(&[status_code_label(status)])
                .inc();

            // The body must be read to the end before the next request, or the
            // connection is never returned to the pool. Chunks are dropped as
            // they arrive so large bodies are never buffered whole.
            let mut body_error = None;
            loop {
                match response.chunk().await {
                    Ok(Some(_chunk)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        REQUEST_ERRORS_BY_CATEGORY
                            .with_label_values(&[ErrorCategory::BodyError.label()])
                            .inc();
                        warn!(
                            task_id = config.task_id,
                            status_code = status,
                            error = %e,
                            "Response body ended early"
                        );
                        body_error = Some(e.to_string());
                        break;
                    }
                }
            }

            debug!(
                task_id = config.task_id,
                url = %config.url,
                status_code = status,
                "Request completed"
            );
            RequestOutcome::Response { status, body_error }
        }
        Err(e) => {
            REQUEST_STATUS_CODES.with_label_values(&["error"]).inc();

            let category = ErrorCategory::from_reqwest_error(&e);
            REQUEST_ERRORS_BY_CATEGORY
                .with_label_values(&[category.label()])
                .inc();

            debug!(
                task_id = config.task_id,
                url = %config.url,
                error = %e,
                error_category = %category.label(),
                "Request failed"
            );
            RequestOutcome::Failed {
                category,
                message: e.to_string(),
            }
        }
    };

    REQUEST_DURATION_SECONDS.observe(request_start_time.elapsed().as_secs_f64());
    outcome
}

fn build_request(client: &reqwest::Client, config: &WorkerConfig) -> reqwest::RequestBuilder {
    match config.method {
        RequestMethod::Get => client.get(&config.url),
        RequestMethod::Post => client
            .post(&config.url)
            .header(reqwest::header::CONTENT_TYPE, PAYLOAD_CONTENT_TYPE)
            .body(config.payload.clone().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_lines() {
        assert_eq!(
            RequestOutcome::Response {
                status: 200,
                body_error: None,
            }
            .to_string(),
            "Response code: 200"
        );
        let truncated = RequestOutcome::Response {
            status: 200,
            body_error: Some("connection closed".to_string()),
        };
        assert_eq!(
            truncated.to_string(),
            "Response code: 200 (body read failed: connection closed)"
        );
        assert!(truncated.is_response());
        let failed = RequestOutcome::Failed {
            category: ErrorCategory::NetworkError,
            message: "connection refused".to_string(),
        };
        assert_eq!(failed.to_string(), "Request failed: connection refused");
        assert!(!failed.is_response());
    }

    #[test]
    fn post_request_carries_payload() {
        let client = reqwest::Client::new();
        let config = WorkerConfig {
            task_id: 0,
            url: "http://localhost:8081/".to_string(),
            method: RequestMethod::Post,
            payload: Some(Bytes::from_static(b"AAAA")),
            requests: 1,
            request_delay: Duration::ZERO,
        };

        let request = build_request(&client, &config).build().unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(
            request.headers()[reqwest::header::CONTENT_TYPE],
            PAYLOAD_CONTENT_TYPE
        );
        assert_eq!(
            request.body().and_then(|b| b.as_bytes()),
            Some(&b"AAAA"[..])
        );
    }

    #[test]
    fn get_request_has_no_body() {
        let client = reqwest::Client::new();
        let config = WorkerConfig {
            task_id: 0,
            url: "http://localhost:8081/".to_string(),
            method: RequestMethod::Get,
            payload: None,
            requests: 1,
            request_delay: Duration::ZERO,
        };

        let request = build_request(&client, &config).build().unwrap();
        assert_eq!(request.method(), reqwest::Method::GET);
        assert!(request.body().is_none());
    }

    #[tokio::test]
    async fn zero_requests_returns_immediately() {
        let config = WorkerConfig {
            task_id: 3,
            url: "http://127.0.0.1:9/".to_string(),
            method: RequestMethod::Get,
            payload: None,
            requests: 0,
            request_delay: Duration::from_secs(60),
        };

        let report = run_worker(reqwest::Client::new(), config).await;
        assert_eq!(report.task_id, 3);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.succeeded + report.failed, 0);
    }
}
