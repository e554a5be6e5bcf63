//! Integration tests for the Kubernetes-backed store
//!
//! These tests require a cluster with the machine-api CRDs installed and a
//! kubeconfig (or in-cluster credentials). Set WATCH_NAMESPACE to override the
//! default `openshift-machine-api`.

use cluster_store::{KubeStore, ResourceStore};

fn namespace() -> String {
    std::env::var("WATCH_NAMESPACE").unwrap_or_else(|_| "openshift-machine-api".to_string())
}

#[tokio::test]
#[ignore] // Requires a running cluster
async fn test_list_machine_sets_and_machines() {
    let store = KubeStore::try_default().await.expect("Failed to create store");
    let ns = namespace();

    let machine_sets = store.list_machine_sets(&ns).await.expect("Failed to list MachineSets");
    let machines = store.list_machines(&ns).await.expect("Failed to list Machines");

    println!("Found {} MachineSets and {} Machines in {}", machine_sets.len(), machines.len(), ns);
}

#[tokio::test]
#[ignore] // Requires a running cluster
async fn test_missing_machine_set_is_not_found() {
    let store = KubeStore::try_default().await.expect("Failed to create store");

    let err = store
        .get_machine_set(&namespace(), "does-not-exist-mnmo")
        .await
        .expect_err("MachineSet should not exist");
    assert!(err.is_not_found(), "expected NotFound, got {}", err);
}

#[tokio::test]
#[ignore] // Requires a running cluster
async fn test_provisioned_machine_node_exists() {
    let store = KubeStore::try_default().await.expect("Failed to create store");
    let machines = store.list_machines(&namespace()).await.expect("Failed to list Machines");
    let Some(node_name) = machines.iter().find_map(|m| m.node_name().map(str::to_string)) else {
        println!("No provisioned machines, skipping");
        return;
    };

    let node = store.get_node(&node_name).await.expect("Failed to get node");
    assert_eq!(node.metadata.name.as_deref(), Some(node_name.as_str()));
}
