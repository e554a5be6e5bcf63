//! ResourceStore trait for mocking
//!
//! Abstracts the cluster API so the reconciler can run against the real
//! API server or an in-memory store in unit tests.

use crate::error::StoreError;
use crds::{Machine, MachineSet};
use k8s_openapi::api::core::v1::Node;

/// Cluster resource operations used by the node metadata reconciler.
///
/// Updates are whole-object replaces carrying the resource version that was
/// read, so a concurrent writer makes them fail with [`StoreError::Conflict`].
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    // MachineSets
    async fn get_machine_set(&self, namespace: &str, name: &str) -> Result<MachineSet, StoreError>;
    async fn list_machine_sets(&self, namespace: &str) -> Result<Vec<MachineSet>, StoreError>;

    // Machines
    async fn list_machines(&self, namespace: &str) -> Result<Vec<Machine>, StoreError>;
    async fn update_machine(&self, machine: &Machine) -> Result<Machine, StoreError>;

    // Nodes (cluster-scoped)
    async fn get_node(&self, name: &str) -> Result<Node, StoreError>;
    async fn update_node(&self, node: &Node) -> Result<Node, StoreError>;
}
