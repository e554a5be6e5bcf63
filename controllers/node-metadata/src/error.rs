//! Controller-specific error types.
//!
//! This module defines error types specific to the node metadata controller
//! that are not covered by upstream library errors.

use crate::reconciler::selector::SelectorError;
use cluster_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the node metadata controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Resource store (Kubernetes API) error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// MachineSet selector is malformed or cannot match its own template
    #[error("Invalid MachineSet {machine_set}: {source}")]
    Selector {
        machine_set: String,
        #[source]
        source: SelectorError,
    },

    /// The pass was cancelled before it finished
    #[error("Reconciliation cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registry or exporter failure
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl From<prometheus::Error> for ControllerError {
    fn from(err: prometheus::Error) -> Self {
        ControllerError::Metrics(err.to_string())
    }
}

impl ControllerError {
    /// Short reason used as a metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            ControllerError::Store(e) => e.reason(),
            ControllerError::Selector { .. } => "InvalidSelector",
            ControllerError::Cancelled => "Cancelled",
            ControllerError::InvalidConfig(_) => "InvalidConfig",
            ControllerError::Metrics(_) => "Metrics",
            ControllerError::Watch(_) => "Watch",
        }
    }
}
