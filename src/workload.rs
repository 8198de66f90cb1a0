//! Workload definition: profiles, partitioning and the request payload.
//!
//! A workload is a fixed number of requests split evenly across a fixed number
//! of workers. The split uses floor division; when the worker count does not
//! divide the total, the remainder is dropped rather than redistributed, so
//! the run may issue fewer requests than configured.

use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use tokio::time::Duration;

/// Default target of both profiles.
pub const DEFAULT_TARGET_URL: &str = "http://localhost:8081/";

/// Filler byte used for POST payloads.
pub const PAYLOAD_FILLER: u8 = b'A';

/// Content type sent with POST payloads.
pub const PAYLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// HTTP method used by every request of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(RequestMethod::Get),
            "POST" => Ok(RequestMethod::Post),
            other => Err(format!(
                "Unsupported request type '{}'. Expected GET or POST",
                other
            )),
        }
    }
}

/// Predefined workload shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Small GETs with a short client timeout and a 100ms pause between requests.
    Light,

    /// 10 MiB POSTs with no client timeout and a 50ms pause between requests.
    ///
    /// The missing timeout is deliberate: a target that accepts the
    /// connection but never answers keeps the worker, and therefore the whole
    /// run, waiting forever.
    Heavy,
}

impl Profile {
    pub fn label(&self) -> &'static str {
        match self {
            Profile::Light => "light",
            Profile::Heavy => "heavy",
        }
    }

    /// Returns the full default workload for this profile.
    pub fn defaults(&self) -> WorkloadConfig {
        match self {
            Profile::Light => WorkloadConfig {
                target_url: DEFAULT_TARGET_URL.to_string(),
                total_requests: 50_000,
                worker_count: 200,
                method: RequestMethod::Get,
                payload_size: 0,
                request_delay: Duration::from_millis(100),
                client_timeout: Some(Duration::from_secs(1)),
            },
            Profile::Heavy => WorkloadConfig {
                target_url: DEFAULT_TARGET_URL.to_string(),
                total_requests: 100_000,
                worker_count: 500,
                method: RequestMethod::Post,
                payload_size: 10 * 1024 * 1024,
                request_delay: Duration::from_millis(50),
                client_timeout: None,
            },
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Profile::Light),
            "heavy" => Ok(Profile::Heavy),
            other => Err(format!(
                "Unknown profile '{}'. Expected light or heavy",
                other
            )),
        }
    }
}

/// A fully resolved workload.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadConfig {
    pub target_url: String,
    pub total_requests: u64,
    /// Must be greater than zero; enforced by the config loader.
    pub worker_count: usize,
    pub method: RequestMethod,
    /// Payload bytes per request. Only sent with POST.
    pub payload_size: usize,
    /// Pause after every request, successful or not.
    pub request_delay: Duration,
    /// Per-request client timeout. `None` waits indefinitely.
    pub client_timeout: Option<Duration>,
}

impl WorkloadConfig {
    /// Requests assigned to each worker.
    pub fn requests_per_worker(&self) -> u64 {
        requests_per_worker(self.total_requests, self.worker_count)
    }

    /// Requests the run will actually issue.
    pub fn issued_requests(&self) -> u64 {
        issued_requests(self.total_requests, self.worker_count)
    }

    /// Builds the payload shared by every worker of this workload.
    pub fn payload(&self) -> Option<Bytes> {
        match self.method {
            RequestMethod::Post => Some(build_payload(self.payload_size)),
            RequestMethod::Get => None,
        }
    }
}

/// Splits `total` requests across `workers` using floor division.
///
/// The remainder is silently dropped. `workers == 0` yields zero, since no
/// worker can be assigned anything.
pub fn requests_per_worker(total: u64, workers: usize) -> u64 {
    if workers == 0 {
        return 0;
    }
    total / workers as u64
}

/// Total requests issued by `workers` workers sharing `total`.
pub fn issued_requests(total: u64, workers: usize) -> u64 {
    requests_per_worker(total, workers) * workers as u64
}

/// Builds a payload of `size` filler bytes.
pub fn build_payload(size: usize) -> Bytes {
    Bytes::from(vec![PAYLOAD_FILLER; size])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heavy_scenario_partition() {
        assert_eq!(requests_per_worker(100_000, 500), 200);
        assert_eq!(issued_requests(100_000, 500), 100_000);
    }

    #[test]
    fn light_scenario_partition() {
        assert_eq!(requests_per_worker(50_000, 200), 250);
        assert_eq!(issued_requests(50_000, 200), 50_000);
    }

    #[test]
    fn remainder_is_dropped() {
        assert_eq!(requests_per_worker(7, 3), 2);
        assert_eq!(issued_requests(7, 3), 6);
    }

    #[test]
    fn fewer_requests_than_workers() {
        assert_eq!(requests_per_worker(3, 10), 0);
        assert_eq!(issued_requests(3, 10), 0);
    }

    #[test]
    fn issued_never_exceeds_total() {
        for total in 0..200u64 {
            for workers in 1..40usize {
                let issued = issued_requests(total, workers);
                assert!(issued <= total);
                assert!(total - issued < workers as u64);
                if total % workers as u64 == 0 {
                    assert_eq!(issued, total);
                }
            }
        }
    }

    #[test]
    fn zero_workers_assigns_nothing() {
        assert_eq!(requests_per_worker(10, 0), 0);
    }

    #[test]
    fn light_defaults() {
        let config = Profile::Light.defaults();
        assert_eq!(config.method, RequestMethod::Get);
        assert_eq!(config.client_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.request_delay, Duration::from_millis(100));
        assert_eq!(config.requests_per_worker(), 250);
        assert!(config.payload().is_none());
    }

    #[test]
    fn heavy_defaults() {
        let config = Profile::Heavy.defaults();
        assert_eq!(config.method, RequestMethod::Post);
        assert_eq!(config.client_timeout, None);
        assert_eq!(config.payload_size, 10 * 1024 * 1024);
        assert_eq!(config.request_delay, Duration::from_millis(50));
        assert_eq!(config.requests_per_worker(), 200);
    }

    #[test]
    fn payload_is_filler() {
        let payload = build_payload(16);
        assert_eq!(payload.len(), 16);
        assert!(payload.iter().all(|b| *b == PAYLOAD_FILLER));
    }

    #[test]
    fn post_with_zero_payload_sends_empty_body() {
        let mut config = Profile::Heavy.defaults();
        config.payload_size = 0;
        assert_eq!(config.payload().map(|p| p.len()), Some(0));
    }

    #[test]
    fn parse_method_and_profile() {
        assert_eq!("get".parse::<RequestMethod>().unwrap(), RequestMethod::Get);
        assert_eq!(" POST ".parse::<RequestMethod>().unwrap(), RequestMethod::Post);
        assert!("PUT".parse::<RequestMethod>().is_err());
        assert_eq!("Heavy".parse::<Profile>().unwrap(), Profile::Heavy);
        assert!("medium".parse::<Profile>().is_err());
    }
}
