use std::time::Duration;

use thiserror::Error;

/// Malformed endpoint catalogue. Always fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("endpoint #{index} has no id")]
    MissingId { index: usize },

    #[error("duplicate endpoint id '{0}'")]
    DuplicateId(String),

    #[error("endpoint '{id}' has unknown category '{category}'")]
    UnknownCategory { id: String, category: String },

    #[error("endpoint '{id}' has an invalid probe: {reason}")]
    InvalidProbe { id: String, reason: String },

    #[error("registry contains no endpoints")]
    Empty,
}

/// Programming errors raised by a prober. Expected failure modes
/// (timeouts, refused connections, bad statuses) are never reported here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("sweep interval must be greater than zero")]
    ZeroInterval,

    #[error("sweep interval {interval:?} is shorter than the probe timeout {timeout:?}")]
    IntervalBelowTimeout { interval: Duration, timeout: Duration },

    #[error("periodic sweeps are already running")]
    AlreadyRunning,
}

/// Errors surfaced by the service binary itself
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}
