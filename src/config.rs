use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::client::{ClientConfig, PoolConfig};
use crate::utils::{parse_duration_string, parse_flag, parse_timeout_string};
use crate::workload::{Profile, RequestMethod, WorkloadConfig};
use crate::yaml_config::{YamlConfig, YamlConfigError};

/// Errors raised while resolving the run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {var} value '{value}': {message}")]
    InvalidVar {
        var: &'static str,
        value: String,
        message: String,
    },

    #[error("Worker count must be greater than 0")]
    ZeroWorkers,

    #[error("Target URL '{0}' must start with http:// or https://")]
    InvalidUrl(String),

    #[error(transparent)]
    Yaml(#[from] YamlConfigError),
}

/// Main configuration for a load run.
#[derive(Debug, Clone)]
pub struct Config {
    pub profile: Profile,
    pub workload: WorkloadConfig,
    /// Connection pool settings for every worker's client.
    pub pool: PoolConfig,
    pub print_final_metrics: bool,
    pub cancel_on_interrupt: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// When `CONFIG_FILE` is set, the YAML file it names is layered between
    /// the profile defaults and the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var("CONFIG_FILE").ok().filter(|p| !p.is_empty()) {
            Some(path) => {
                let yaml = YamlConfig::from_file(&path)?;
                Self::from_yaml_with_env_overrides(&yaml)
            }
            None => Self::from_yaml_with_env_overrides(&YamlConfig::default()),
        }
    }

    /// Resolves configuration with precedence env > YAML > profile defaults.
    pub fn from_yaml_with_env_overrides(yaml: &YamlConfig) -> Result<Self, ConfigError> {
        let profile = match env_var("PROFILE") {
            Some(value) => parse_var("PROFILE", &value)?,
            None => yaml.profile()?.unwrap_or(Profile::Light),
        };

        let mut workload = profile.defaults();
        yaml.apply_to(&mut workload)?;

        if let Some(url) = env_var("TARGET_URL") {
            workload.target_url = url;
        }
        if let Some(value) = env_var("TOTAL_REQUESTS") {
            workload.total_requests = parse_var("TOTAL_REQUESTS", &value)?;
        }
        if let Some(value) = env_var("NUM_CONCURRENT_TASKS") {
            workload.worker_count = parse_var("NUM_CONCURRENT_TASKS", &value)?;
        }
        if let Some(value) = env_var("REQUEST_TYPE") {
            workload.method = parse_var::<RequestMethod>("REQUEST_TYPE", &value)?;
        }
        if let Some(value) = env_var("PAYLOAD_SIZE") {
            workload.payload_size = parse_var("PAYLOAD_SIZE", &value)?;
        }
        if let Some(value) = env_var("REQUEST_DELAY") {
            workload.request_delay =
                parse_duration_string(&value).map_err(|message| ConfigError::InvalidVar {
                    var: "REQUEST_DELAY",
                    value: value.clone(),
                    message,
                })?;
        }
        if let Some(value) = env_var("CLIENT_TIMEOUT") {
            workload.client_timeout =
                parse_timeout_string(&value).map_err(|message| ConfigError::InvalidVar {
                    var: "CLIENT_TIMEOUT",
                    value: value.clone(),
                    message,
                })?;
        }

        validate(&workload)?;

        let pool = pool_from_env()?;

        Ok(Config {
            profile,
            workload,
            pool,
            print_final_metrics: env_var("PRINT_FINAL_METRICS").is_some_and(|v| parse_flag(&v)),
            cancel_on_interrupt: env_var("CANCEL_ON_INTERRUPT").is_some_and(|v| parse_flag(&v)),
        })
    }

    /// Creates the per-worker client settings for this run.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            pool: self.pool.clone(),
            ..ClientConfig::for_workload(&self.workload)
        }
    }

    /// Prints the configuration summary.
    pub fn print_summary(&self) {
        let workload = &self.workload;
        println!("Starting load run:");
        println!("  Profile: {}", self.profile.label());
        println!("  Target URL: {}", workload.target_url);
        println!("  Request type: {}", workload.method);
        println!("  Total requests: {}", workload.total_requests);
        println!("  Concurrent workers: {}", workload.worker_count);
        println!(
            "  Requests per worker: {} ({} issued in total)",
            workload.requests_per_worker(),
            workload.issued_requests()
        );
        if workload.method == RequestMethod::Post {
            println!("  Payload size: {} bytes", workload.payload_size);
        }
        println!("  Delay between requests: {:?}", workload.request_delay);
        match workload.client_timeout {
            Some(timeout) => println!("  Client timeout: {:?}", timeout),
            None => println!("  Client timeout: none (requests may wait indefinitely)"),
        }
        println!(
            "  Pool: {} idle per host, {:?} idle timeout, keepalive {:?}",
            self.pool.max_idle_per_host, self.pool.idle_timeout, self.pool.tcp_keepalive
        );
    }
}

/// Checks the invariants every workload must satisfy before a run.
pub fn validate(workload: &WorkloadConfig) -> Result<(), ConfigError> {
    if workload.worker_count == 0 {
        return Err(ConfigError::ZeroWorkers);
    }
    let url = workload.target_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidUrl(workload.target_url.clone()));
    }
    Ok(())
}

/// Reads `POOL_MAX_IDLE_PER_HOST`, `POOL_IDLE_TIMEOUT` and `POOL_TCP_KEEPALIVE`.
fn pool_from_env() -> Result<PoolConfig, ConfigError> {
    let mut pool = PoolConfig::default();

    if let Some(value) = env_var("POOL_MAX_IDLE_PER_HOST") {
        pool = pool.with_max_idle_per_host(parse_var("POOL_MAX_IDLE_PER_HOST", &value)?);
    }
    if let Some(value) = env_var("POOL_IDLE_TIMEOUT") {
        let timeout =
            parse_duration_string(&value).map_err(|message| ConfigError::InvalidVar {
                var: "POOL_IDLE_TIMEOUT",
                value: value.clone(),
                message,
            })?;
        pool = pool.with_idle_timeout(timeout);
    }
    if let Some(value) = env_var("POOL_TCP_KEEPALIVE") {
        // Same spelling as CLIENT_TIMEOUT: `0` or `none` turns keepalive off.
        let keepalive =
            parse_timeout_string(&value).map_err(|message| ConfigError::InvalidVar {
                var: "POOL_TCP_KEEPALIVE",
                value: value.clone(),
                message,
            })?;
        pool = pool.with_tcp_keepalive(keepalive);
    }

    Ok(pool)
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidVar {
            var,
            value: value.to_string(),
            message: e.to_string(),
        })
}
