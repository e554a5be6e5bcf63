//! Node operations for MockStore

use super::{check_and_bump, MockOp, MockStore};
use crate::error::StoreError;
use k8s_openapi::api::core::v1::Node;

pub async fn get_node(store: &MockStore, name: &str) -> Result<Node, StoreError> {
    store.take_failure(MockOp::GetNode)?;
    store
        .nodes
        .lock()
        .unwrap()
        .get(name)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("Node {}", name)))
}

pub async fn update_node(store: &MockStore, node: &Node) -> Result<Node, StoreError> {
    store.take_failure(MockOp::UpdateNode)?;
    let name = node
        .metadata
        .name
        .clone()
        .ok_or_else(|| StoreError::InvalidObject("Node missing metadata.name".to_string()))?;
    let what = format!("Node {}", name);

    let mut nodes = store.nodes.lock().unwrap();
    let stored = nodes
        .get(&name)
        .ok_or_else(|| StoreError::NotFound(what.clone()))?;

    let mut updated = node.clone();
    check_and_bump(store, &stored.metadata, &mut updated.metadata, &what)?;
    updated.status = stored.status.clone();

    nodes.insert(name.clone(), updated.clone());
    drop(nodes);

    store.record_update("Node", &name);
    Ok(updated)
}
