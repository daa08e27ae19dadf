// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: TOML file with command-line overrides

use fence_adapters::{AwsCliConfig, StorageTools, DEFAULT_COMMAND_TIMEOUT};
use fence_core::events::DEFAULT_QUEUE_CAPACITY;
use fence_engine::RetryPolicy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudConfig {
    pub region: String,
    pub profile: Option<String>,
    pub aws_path: String,
    /// Only instances carrying every one of these tags are watched
    pub tags: BTreeMap<String, String>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            region: "eu-west-1".to_string(),
            profile: None,
            aws_path: "aws".to_string(),
            tags: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollerConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub bootstrap_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub bootstrap_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            bootstrap_attempts: 3,
            bootstrap_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Restrict unlocking to one pool
    pub pool: Option<String>,
    pub rbd_path: String,
    pub ceph_path: String,
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pool: None,
            rbd_path: "rbd".to_string(),
            ceph_path: "ceph".to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FencingConfig {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for FencingConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            backoff: policy.backoff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Exclusive lock file holding the daemon's PID
    pub lock_path: Option<PathBuf>,
    /// Log file; stderr when absent
    pub log_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            lock_path: None,
            log_path: None,
            log_level: "info".to_string(),
        }
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub cloud: CloudConfig,
    pub poller: PollerConfig,
    pub storage: StorageConfig,
    pub fencing: FencingConfig,
    pub bus: BusConfig,
    pub daemon: DaemonConfig,
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub tags: Vec<(String, String)>,
    pub interval: Option<Duration>,
    pub pool: Option<String>,
    pub lock_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Config {
    /// Parse and validate TOML text
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or use defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Apply command-line overrides, then re-validate
    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        if let Some(region) = overrides.region {
            self.cloud.region = region;
        }
        if let Some(profile) = overrides.profile {
            self.cloud.profile = Some(profile);
        }
        self.cloud.tags.extend(overrides.tags);
        if let Some(interval) = overrides.interval {
            self.poller.interval = interval;
        }
        if let Some(pool) = overrides.pool {
            self.storage.pool = Some(pool);
        }
        if let Some(lock_path) = overrides.lock_path {
            self.daemon.lock_path = Some(lock_path);
        }
        if let Some(log_path) = overrides.log_path {
            self.daemon.log_path = Some(log_path);
        }
        if let Some(log_level) = overrides.log_level {
            self.daemon.log_level = log_level;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cloud.region.trim().is_empty() {
            return invalid("cloud.region", "must not be empty");
        }
        if self.poller.interval.is_zero() {
            return invalid("poller.interval", "must be greater than zero");
        }
        if self.poller.bootstrap_attempts == 0 {
            return invalid("poller.bootstrap_attempts", "must be at least 1");
        }
        if self.fencing.max_attempts == 0 {
            return invalid("fencing.max_attempts", "must be at least 1");
        }
        if self.bus.queue_capacity == 0 {
            return invalid("bus.queue_capacity", "must be at least 1");
        }
        Ok(())
    }

    pub fn aws(&self) -> AwsCliConfig {
        AwsCliConfig {
            aws: self.cloud.aws_path.clone(),
            region: self.cloud.region.clone(),
            profile: self.cloud.profile.clone(),
            tags: self.cloud.tags.clone(),
            timeout: self.storage.command_timeout,
        }
    }

    pub fn storage_tools(&self) -> StorageTools {
        StorageTools {
            ceph: self.storage.ceph_path.clone(),
            rbd: self.storage.rbd_path.clone(),
            timeout: self.storage.command_timeout,
            pool: self.storage.pool.clone().filter(|p| !p.is_empty()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fencing.max_attempts,
            backoff: self.fencing.backoff,
        }
    }
}

/// Parse a `KEY=VALUE` tag filter
pub fn parse_tag(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", text)),
    }
}

fn invalid(field: &'static str, reason: &'static str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid { field, reason })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
