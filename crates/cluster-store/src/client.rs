//! Kubernetes-backed resource store
//!
//! Implements [`ResourceStore`] on top of `kube::Api`. Updates use `replace`,
//! which sends the object's resource version and lets the API server reject
//! stale writes.

use crate::error::StoreError;
use crate::store_trait::ResourceStore;
use crds::{Machine, MachineSet};
use k8s_openapi::api::core::v1::Node;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

/// Resource store talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    /// Create a store from an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a store from the in-cluster or kubeconfig environment
    pub async fn try_default() -> Result<Self, StoreError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Underlying client, shared with the watch layer
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    fn machine_sets(&self, namespace: &str) -> Api<MachineSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn machines(&self, namespace: &str) -> Api<Machine> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }
}

fn required_name<'a>(name: Option<&'a String>, kind: &str) -> Result<&'a str, StoreError> {
    name.map(String::as_str)
        .ok_or_else(|| StoreError::InvalidObject(format!("{} missing metadata.name", kind)))
}

#[async_trait::async_trait]
impl ResourceStore for KubeStore {
    async fn get_machine_set(&self, namespace: &str, name: &str) -> Result<MachineSet, StoreError> {
        debug!("GET MachineSet {}/{}", namespace, name);
        self.machine_sets(namespace)
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("MachineSet {}/{}", namespace, name)))
    }

    async fn list_machine_sets(&self, namespace: &str) -> Result<Vec<MachineSet>, StoreError> {
        debug!("LIST MachineSets in {}", namespace);
        let list = self
            .machine_sets(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("MachineSets in {}", namespace)))?;
        Ok(list.items)
    }

    async fn list_machines(&self, namespace: &str) -> Result<Vec<Machine>, StoreError> {
        debug!("LIST Machines in {}", namespace);
        let list = self
            .machines(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("Machines in {}", namespace)))?;
        Ok(list.items)
    }

    async fn update_machine(&self, machine: &Machine) -> Result<Machine, StoreError> {
        let name = required_name(machine.metadata.name.as_ref(), "Machine")?;
        let namespace = machine.metadata.namespace.as_deref().unwrap_or("default");
        debug!("UPDATE Machine {}/{}", namespace, name);
        self.machines(namespace)
            .replace(name, &PostParams::default(), machine)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("Machine {}/{}", namespace, name)))
    }

    async fn get_node(&self, name: &str) -> Result<Node, StoreError> {
        debug!("GET Node {}", name);
        self.nodes()
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("Node {}", name)))
    }

    async fn update_node(&self, node: &Node) -> Result<Node, StoreError> {
        let name = required_name(node.metadata.name.as_ref(), "Node")?;
        debug!("UPDATE Node {}", name);
        self.nodes()
            .replace(name, &PostParams::default(), node)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("Node {}", name)))
    }
}
