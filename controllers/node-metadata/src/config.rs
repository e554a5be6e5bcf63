//! Operator configuration, read once from the environment at startup.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_NAMESPACE: &str = "openshift-machine-api";
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8082";
pub const DEFAULT_RECONCILE_CONCURRENCY: u16 = 4;
pub const DEFAULT_BACKOFF_MIN_SECONDS: u64 = 5;
pub const DEFAULT_BACKOFF_MAX_SECONDS: u64 = 300;
pub const DEFAULT_RESYNC_INTERVAL_SECONDS: u64 = 600;

/// Runtime settings for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace holding the MachineSets and Machines
    pub namespace: String,
    pub metrics_bind_address: SocketAddr,
    /// Maximum number of MachineSets reconciled at once
    pub reconcile_concurrency: u16,
    pub backoff_min_seconds: u64,
    pub backoff_max_seconds: u64,
    /// Delay before a synced MachineSet is reconciled again, so drift on its Nodes is repaired
    pub resync_interval_seconds: u64,
}

impl OperatorConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let namespace = lookup("WATCH_NAMESPACE")
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let metrics_bind_address = parse_or(
            &lookup,
            "METRICS_BIND_ADDRESS",
            DEFAULT_METRICS_BIND_ADDRESS.parse().map_err(|e| {
                ControllerError::InvalidConfig(format!("default metrics address: {}", e))
            })?,
        )?;
        let reconcile_concurrency = parse_or(&lookup, "RECONCILE_CONCURRENCY", DEFAULT_RECONCILE_CONCURRENCY)?;
        let backoff_min_seconds = parse_or(&lookup, "BACKOFF_MIN_SECONDS", DEFAULT_BACKOFF_MIN_SECONDS)?;
        let backoff_max_seconds = parse_or(&lookup, "BACKOFF_MAX_SECONDS", DEFAULT_BACKOFF_MAX_SECONDS)?;
        let resync_interval_seconds =
            parse_or(&lookup, "RESYNC_INTERVAL_SECONDS", DEFAULT_RESYNC_INTERVAL_SECONDS)?;

        if reconcile_concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if backoff_min_seconds == 0 || backoff_min_seconds > backoff_max_seconds {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_MIN_SECONDS ({}) must be positive and not exceed BACKOFF_MAX_SECONDS ({})",
                backoff_min_seconds, backoff_max_seconds
            )));
        }

        if resync_interval_seconds == 0 {
            return Err(ControllerError::InvalidConfig(
                "RESYNC_INTERVAL_SECONDS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            namespace,
            metrics_bind_address,
            reconcile_concurrency,
            backoff_min_seconds,
            backoff_max_seconds,
            resync_interval_seconds,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{}={:?}: {}", key, raw, e))),
        _ => Ok(default),
    }
}
