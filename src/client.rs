use std::time::Duration;
use tracing::debug;

use crate::workload::WorkloadConfig;

/// Connection pool settings applied to each worker's client.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Maximum idle connections to keep per host. A worker sends one request
    /// at a time, so a single idle connection is all it can reuse.
    pub max_idle_per_host: usize,

    /// How long idle connections stay in the pool before cleanup
    pub idle_timeout: Duration,

    /// TCP keepalive duration
    pub tcp_keepalive: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 1,
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

impl PoolConfig {
    pub fn with_max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_tcp_keepalive(mut self, keepalive: Option<Duration>) -> Self {
        self.tcp_keepalive = keepalive;
        self
    }

    /// Apply this configuration to a reqwest ClientBuilder.
    pub fn apply_to_builder(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        let mut builder = builder
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(self.idle_timeout);

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }

        builder
    }
}

/// Configuration for building a worker's HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Applied to every request the client sends. `None` never times out.
    pub timeout: Option<Duration>,
    pub pool: PoolConfig,
}

impl ClientConfig {
    pub fn for_workload(workload: &WorkloadConfig) -> Self {
        Self {
            timeout: workload.client_timeout,
            pool: PoolConfig::default(),
        }
    }
}

/// Builds the client owned by a single worker.
///
/// Clients are never shared between workers; each call returns a client with
/// its own connection pool.
pub fn build_worker_client(config: &ClientConfig) -> Result<reqwest::Client, reqwest::Error> {
    let mut client_builder = config.pool.apply_to_builder(reqwest::Client::builder());

    // reqwest has no timeout unless one is set, which is what the heavy
    // profile relies on.
    if let Some(timeout) = config.timeout {
        client_builder = client_builder.timeout(timeout);
    }

    debug!(
        timeout = ?config.timeout,
        max_idle_per_host = config.pool.max_idle_per_host,
        "Building worker client"
    );

    client_builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::Profile;

    #[test]
    fn pool_defaults() {
        let pool = PoolConfig::default();
        assert_eq!(pool.max_idle_per_host, 1);
        assert_eq!(pool.idle_timeout, Duration::from_secs(90));
        assert_eq!(pool.tcp_keepalive, Some(Duration::from_secs(60)));
    }

    #[test]
    fn pool_builder() {
        let pool = PoolConfig::default()
            .with_max_idle_per_host(4)
            .with_idle_timeout(Duration::from_secs(5))
            .with_tcp_keepalive(None);
        assert_eq!(pool.max_idle_per_host, 4);
        assert_eq!(pool.idle_timeout, Duration::from_secs(5));
        assert_eq!(pool.tcp_keepalive, None);
    }

    #[test]
    fn timeout_follows_profile() {
        let light = ClientConfig::for_workload(&Profile::Light.defaults());
        assert_eq!(light.timeout, Some(Duration::from_secs(1)));

        let heavy = ClientConfig::for_workload(&Profile::Heavy.defaults());
        assert_eq!(heavy.timeout, None);
    }

    #[test]
    fn builds_bounded_and_unbounded_clients() {
        let bounded = ClientConfig {
            timeout: Some(Duration::from_millis(250)),
            pool: PoolConfig::default(),
        };
        assert!(build_worker_client(&bounded).is_ok());

        let unbounded = ClientConfig {
            timeout: None,
            pool: PoolConfig::default(),
        };
        assert!(build_worker_client(&unbounded).is_ok());
    }
}
