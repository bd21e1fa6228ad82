//! Process-wide controller settings, fixed at startup.

use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKERS: usize = 3;
pub const DEFAULT_QUEUE_CAP: usize = 2048;
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers.
    pub workers: usize,
    /// Feature gate; when false the controller is not started at all.
    pub enabled: bool,
    /// Restrict watches to one namespace (all namespaces when `None`).
    pub namespace: Option<String>,
    /// Capacity of each cache ingest channel.
    pub queue_cap: usize,
    /// How long to wait for the initial list of every watched kind.
    pub sync_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            enabled: true,
            namespace: None,
            queue_cap: DEFAULT_QUEUE_CAP,
            sync_timeout_secs: DEFAULT_SYNC_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("queue capacity must be at least 1")]
    NoQueueCap,
    #[error("namespace must not be empty when set")]
    EmptyNamespace,
}

impl ControllerConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.queue_cap == 0 {
            return Err(ConfigError::NoQueueCap);
        }
        if matches!(self.namespace.as_deref(), Some(ns) if ns.trim().is_empty()) {
            return Err(ConfigError::EmptyNamespace);
        }
        Ok(self)
    }
}
