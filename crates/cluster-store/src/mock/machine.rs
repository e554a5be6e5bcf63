//! MachineSet and Machine operations for MockStore

use super::{check_and_bump, MockOp, MockStore};
use crate::error::StoreError;
use crds::{Machine, MachineSet};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub(crate) fn key(meta: &ObjectMeta) -> (String, String) {
    (
        meta.namespace.clone().unwrap_or_else(|| "default".to_string()),
        meta.name.clone().unwrap_or_default(),
    )
}

pub async fn get_machine_set(store: &MockStore, namespace: &str, name: &str) -> Result<MachineSet, StoreError> {
    store.take_failure(MockOp::GetMachineSet)?;
    store
        .machine_sets
        .lock()
        .unwrap()
        .get(&(namespace.to_string(), name.to_string()))
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("MachineSet {}/{}", namespace, name)))
}

pub async fn list_machine_sets(store: &MockStore, namespace: &str) -> Result<Vec<MachineSet>, StoreError> {
    store.take_failure(MockOp::ListMachineSets)?;
    Ok(store
        .machine_sets
        .lock()
        .unwrap()
        .iter()
        .filter(|((ns, _), _)| ns == namespace)
        .map(|(_, ms)| ms.clone())
        .collect())
}

pub async fn list_machines(store: &MockStore, namespace: &str) -> Result<Vec<Machine>, StoreError> {
    store.take_failure(MockOp::ListMachines)?;
    Ok(store
        .machines
        .lock()
        .unwrap()
        .iter()
        .filter(|((ns, _), _)| ns == namespace)
        .map(|(_, m)| m.clone())
        .collect())
}

pub async fn update_machine(store: &MockStore, machine: &Machine) -> Result<Machine, StoreError> {
    store.take_failure(MockOp::UpdateMachine)?;
    let key = key(&machine.metadata);
    let what = format!("Machine {}/{}", key.0, key.1);

    let mut machines = store.machines.lock().unwrap();
    let stored = machines
        .get(&key)
        .ok_or_else(|| StoreError::NotFound(what.clone()))?;

    let mut updated = machine.clone();
    check_and_bump(store, &stored.metadata, &mut updated.metadata, &what)?;
    // Status is a subresource; a plain update never changes it.
    updated.status = stored.status.clone();

    machines.insert(key.clone(), updated.clone());
    drop(machines);

    store.record_update("Machine", &key.1);
    Ok(updated)
}
