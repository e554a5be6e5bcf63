//! Mock ResourceStore for unit testing
//!
//! In-memory implementation of [`ResourceStore`] that behaves like the API
//! server where the reconciler cares: objects carry resource versions, stale
//! updates conflict, missing objects are `NotFound`. Tests can inject one-shot
//! failures per operation and inspect every write that went through.
//!
//! The mock is organized into kind-specific modules:
//! - `machine.rs` - MachineSet and Machine operations
//! - `node.rs` - Node operations

mod machine;
mod node;

use crate::error::StoreError;
use crate::store_trait::ResourceStore;
use crds::{Machine, MachineSet};
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Operations that can be made to fail with [`MockStore::fail_next`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    GetMachineSet,
    ListMachineSets,
    ListMachines,
    UpdateMachine,
    GetNode,
    UpdateNode,
}

/// One successful write recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecord {
    pub kind: &'static str,
    pub name: String,
}

/// Mock ResourceStore for testing
#[derive(Clone, Default)]
pub struct MockStore {
    pub(crate) machine_sets: Arc<Mutex<BTreeMap<(String, String), MachineSet>>>,
    pub(crate) machines: Arc<Mutex<BTreeMap<(String, String), Machine>>>,
    pub(crate) nodes: Arc<Mutex<BTreeMap<String, Node>>>,
    pub(crate) pending_failures: Arc<Mutex<HashMap<MockOp, u32>>>,
    pub(crate) updates: Arc<Mutex<Vec<UpdateRecord>>>,
    pub(crate) next_version: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("updates", &self.updates.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl MockStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a MachineSet (for test setup). Assigns a UID if it has none.
    pub fn add_machine_set(&self, mut machine_set: MachineSet) -> MachineSet {
        self.admit(&mut machine_set.metadata);
        let key = machine::key(&machine_set.metadata);
        self.machine_sets.lock().unwrap().insert(key, machine_set.clone());
        machine_set
    }

    /// Add a Machine (for test setup)
    pub fn add_machine(&self, mut machine: Machine) -> Machine {
        self.admit(&mut machine.metadata);
        let key = machine::key(&machine.metadata);
        self.machines.lock().unwrap().insert(key, machine.clone());
        machine
    }

    /// Add a Node (for test setup)
    pub fn add_node(&self, mut node: Node) -> Node {
        self.admit(&mut node.metadata);
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.lock().unwrap().insert(name, node.clone());
        node
    }

    /// Remove a MachineSet, as if it had been deleted
    pub fn remove_machine_set(&self, namespace: &str, name: &str) {
        self.machine_sets
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Current stored copy of a MachineSet
    pub fn machine_set(&self, namespace: &str, name: &str) -> Option<MachineSet> {
        self.machine_sets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Replace a stored MachineSet in place, as an external edit would
    pub fn edit_machine_set(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut MachineSet)) {
        let version = self.bump_version();
        if let Some(ms) = self
            .machine_sets
            .lock()
            .unwrap()
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            edit(ms);
            ms.metadata.resource_version = Some(version.to_string());
        }
    }

    /// Current stored copy of a Machine
    pub fn machine(&self, namespace: &str, name: &str) -> Option<Machine> {
        self.machines
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Current stored copy of a Node
    pub fn node(&self, name: &str) -> Option<Node> {
        self.nodes.lock().unwrap().get(name).cloned()
    }

    /// Modify a stored Node out-of-band, bumping its resource version
    pub fn edit_node(&self, name: &str, edit: impl FnOnce(&mut Node)) {
        let version = self.bump_version();
        if let Some(node) = self.nodes.lock().unwrap().get_mut(name) {
            edit(node);
            node.metadata.resource_version = Some(version.to_string());
        }
    }

    /// Make the next call to `op` fail with [`StoreError::Unavailable`]
    pub fn fail_next(&self, op: MockOp) {
        *self.pending_failures.lock().unwrap().entry(op).or_insert(0) += 1;
    }

    /// Every successful write, in order
    pub fn updates(&self) -> Vec<UpdateRecord> {
        self.updates.lock().unwrap().clone()
    }

    /// Number of successful writes so far
    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    /// Forget recorded writes (stored objects are kept)
    pub fn clear_updates(&self) {
        self.updates.lock().unwrap().clear();
    }

    pub(crate) fn take_failure(&self, op: MockOp) -> Result<(), StoreError> {
        let mut failures = self.pending_failures.lock().unwrap();
        match failures.get_mut(&op) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Err(StoreError::Unavailable(format!("injected failure for {:?}", op)))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn record_update(&self, kind: &'static str, name: &str) {
        self.updates.lock().unwrap().push(UpdateRecord {
            kind,
            name: name.to_string(),
        });
    }

    pub(crate) fn bump_version(&self) -> u64 {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        *version
    }

    /// Fill in the fields the API server would set on create.
    fn admit(&self, meta: &mut ObjectMeta) {
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        meta.resource_version = Some(self.bump_version().to_string());
    }
}

/// Check the caller's resource version against the stored one and stamp a new one.
pub(crate) fn check_and_bump(
    store: &MockStore,
    stored: &ObjectMeta,
    incoming: &mut ObjectMeta,
    what: &str,
) -> Result<(), StoreError> {
    if let Some(version) = incoming.resource_version.as_deref() {
        if stored.resource_version.as_deref() != Some(version) {
            return Err(StoreError::Conflict(format!(
                "{}: the object has been modified; please apply your changes to the latest version and try again",
                what
            )));
        }
    }
    incoming.uid = stored.uid.clone();
    incoming.resource_version = Some(store.bump_version().to_string());
    Ok(())
}

#[async_trait::async_trait]
impl ResourceStore for MockStore {
    async fn get_machine_set(&self, namespace: &str, name: &str) -> Result<MachineSet, StoreError> {
        machine::get_machine_set(self, namespace, name).await
    }

    async fn list_machine_sets(&self, namespace: &str) -> Result<Vec<MachineSet>, StoreError> {
        machine::list_machine_sets(self, namespace).await
    }

    async fn list_machines(&self, namespace: &str) -> Result<Vec<Machine>, StoreError> {
        machine::list_machines(self, namespace).await
    }

    async fn update_machine(&self, machine: &Machine) -> Result<Machine, StoreError> {
        machine::update_machine(self, machine).await
    }

    async fn get_node(&self, name: &str) -> Result<Node, StoreError> {
        node::get_node(self, name).await
    }

    async fn update_node(&self, node: &Node) -> Result<Node, StoreError> {
        node::update_node(self, node).await
    }
}
