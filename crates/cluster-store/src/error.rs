//! Resource store errors

use thiserror::Error;

/// Errors that can occur when reading or writing cluster resources
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency failure: the stored object changed since it was read
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other Kubernetes API failure
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object could not be converted to or from its wire form
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object is missing a field the store needs (name, usually)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Injected failure (test doubles only)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Short, low-cardinality reason string (for metric labels).
    pub fn reason(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NotFound",
            StoreError::Conflict(_) => "Conflict",
            StoreError::Kube(_) => "ApiError",
            StoreError::Serialization(_) => "Serialization",
            StoreError::InvalidObject(_) => "InvalidObject",
            StoreError::Unavailable(_) => "Unavailable",
        }
    }

    /// Classify a kube error by HTTP status, keeping the object description for context.
    pub fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => {
                StoreError::NotFound(what.to_string())
            }
            kube::Error::Api(ref response) if response.code == 409 => {
                StoreError::Conflict(format!("{}: {}", what, response.message))
            }
            other => StoreError::Kube(other),
        }
    }
}
