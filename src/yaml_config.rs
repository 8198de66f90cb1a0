//! YAML workload file support.
//!
//! A YAML file is an alternative to setting every knob through environment
//! variables. Every field is optional; missing fields fall back to the
//! selected profile's defaults, and environment variables still win over the
//! file (see [`crate::config::Config::from_yaml_with_env_overrides`]).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration as StdDuration;
use thiserror::Error;

use crate::utils::{non_zero, parse_duration_string, parse_timeout_string};
use crate::workload::{Profile, RequestMethod, WorkloadConfig};

/// Errors that can occur when loading or parsing a YAML workload file.
#[derive(Error, Debug)]
pub enum YamlConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Duration format for YAML (e.g., 30, "50ms", "1s").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YamlDuration {
    Seconds(u64),
    String(String),
}

impl YamlDuration {
    pub fn to_std_duration(&self) -> Result<StdDuration, YamlConfigError> {
        match self {
            YamlDuration::Seconds(s) => Ok(StdDuration::from_secs(*s)),
            YamlDuration::String(s) => parse_duration_string(s).map_err(|e| {
                YamlConfigError::Validation(format!("Invalid duration '{}': {}", s, e))
            }),
        }
    }

    /// Like [`Self::to_std_duration`], but `0` and `none` mean no timeout.
    pub fn to_timeout(&self) -> Result<Option<StdDuration>, YamlConfigError> {
        match self {
            YamlDuration::Seconds(s) => Ok(non_zero(StdDuration::from_secs(*s))),
            YamlDuration::String(s) => parse_timeout_string(s).map_err(|e| {
                YamlConfigError::Validation(format!("Invalid timeout '{}': {}", s, e))
            }),
        }
    }
}

/// Workload file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct YamlConfig {
    pub profile: Option<String>,
    pub target_url: Option<String>,
    pub total_requests: Option<u64>,
    pub workers: Option<usize>,
    pub request_type: Option<String>,
    pub payload_size: Option<usize>,
    pub request_delay: Option<YamlDuration>,
    pub client_timeout: Option<YamlDuration>,
}

impl YamlConfig {
    /// Parses a workload from a YAML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, YamlConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Reads and parses a workload file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, YamlConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Profile named in the file, if any.
    pub fn profile(&self) -> Result<Option<Profile>, YamlConfigError> {
        self.profile
            .as_deref()
            .map(|p| p.parse().map_err(YamlConfigError::Validation))
            .transpose()
    }

    /// Overlays the fields present in the file onto `base`.
    pub fn apply_to(&self, base: &mut WorkloadConfig) -> Result<(), YamlConfigError> {
        if let Some(ref url) = self.target_url {
            base.target_url = url.clone();
        }
        if let Some(total) = self.total_requests {
            base.total_requests = total;
        }
        if let Some(workers) = self.workers {
            base.worker_count = workers;
        }
        if let Some(ref method) = self.request_type {
            base.method = method
                .parse::<RequestMethod>()
                .map_err(YamlConfigError::Validation)?;
        }
        if let Some(size) = self.payload_size {
            base.payload_size = size;
        }
        if let Some(ref delay) = self.request_delay {
            base.request_delay = delay.to_std_duration()?;
        }
        if let Some(ref timeout) = self.client_timeout {
            base.client_timeout = timeout.to_timeout()?;
        }
        Ok(())
    }
}
