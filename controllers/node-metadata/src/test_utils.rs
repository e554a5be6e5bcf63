//! Test utilities for unit testing the reconciler
//!
//! Builders for MachineSets, Machines, Nodes and Taints shaped the way
//! machine-api creates them, plus a metrics sink that records what it is told.

use crate::metrics::{FailureLabels, MetricsSink};
use crate::reconciler::labels::CUSTOM_LABELS_ANNOTATION;
use crds::{Machine, MachineSet, MachineSetSpec, MachineSpec, MachineStatus};
use k8s_openapi::api::core::v1::{Node, NodeSpec, ObjectReference, Taint};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub const TEST_NAMESPACE: &str = "openshift-machine-api";

/// Label that ties machines to their MachineSet in these tests
pub const OWNER_LABEL: &str = "owner";

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// MachineSet selecting `owner=<name>` whose template requests `node_labels`.
pub fn machine_set(name: &str, node_labels: &[(&str, &str)]) -> MachineSet {
    let selector_labels = string_map(&[(OWNER_LABEL, name)]);
    let mut ms = MachineSet::new(
        name,
        MachineSetSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels.clone()),
                match_expressions: None,
            },
            ..Default::default()
        },
    );
    ms.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    ms.spec.template.metadata.labels = selector_labels;
    ms.spec.template.spec.metadata.labels = string_map(node_labels);
    ms
}

pub fn with_uid(mut machine_set: MachineSet, uid: &str) -> MachineSet {
    machine_set.metadata.uid = Some(uid.to_string());
    machine_set
}

pub fn with_taints(mut machine_set: MachineSet, taints: Vec<Taint>) -> MachineSet {
    machine_set.spec.template.spec.taints = taints;
    machine_set
}

/// Unprovisioned Machine with the given object labels.
pub fn machine(name: &str, labels: &[(&str, &str)]) -> Machine {
    let mut m = Machine::new(name, MachineSpec::default());
    m.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    if !labels.is_empty() {
        m.metadata.labels = Some(string_map(labels));
    }
    m
}

/// Point the machine at its backing node.
pub fn provisioned(mut machine: Machine, node_name: &str) -> Machine {
    machine.status = Some(MachineStatus {
        node_ref: Some(ObjectReference {
            kind: Some("Node".to_string()),
            name: Some(node_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    });
    machine
}

/// Add a controller owner reference to a MachineSet.
pub fn owned_by(mut machine: Machine, machine_set_name: &str, uid: &str) -> Machine {
    machine.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "machine.openshift.io/v1beta1".to_string(),
        kind: "MachineSet".to_string(),
        name: machine_set_name.to_string(),
        uid: uid.to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]);
    machine
}

/// Mark the machine as terminating.
pub fn deleting(mut machine: Machine) -> Machine {
    machine.metadata.deletion_timestamp =
        Some(serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap());
    machine
}

/// Node with labels and, optionally, a provenance annotation value.
pub fn node(name: &str, labels: &[(&str, &str)], custom_labels: Option<&str>) -> Node {
    let mut n = Node::default();
    n.metadata.name = Some(name.to_string());
    n.metadata.labels = Some(string_map(labels));
    if let Some(value) = custom_labels {
        n.metadata.annotations = Some(string_map(&[(CUSTOM_LABELS_ANNOTATION, value)]));
    }
    n
}

pub fn with_node_taints(mut node: Node, taints: Vec<Taint>) -> Node {
    node.spec.get_or_insert_with(NodeSpec::default).taints = Some(taints);
    node
}

/// Taint; an empty value is left unset, as kubectl does.
pub fn taint(key: &str, value: &str, effect: &str) -> Taint {
    Taint {
        key: key.to_string(),
        value: (!value.is_empty()).then(|| value.to_string()),
        effect: effect.to_string(),
        time_added: None,
    }
}

pub fn node_taints(node: &Node) -> Vec<Taint> {
    node.spec.as_ref().and_then(|s| s.taints.clone()).unwrap_or_default()
}

pub fn node_labels(node: &Node) -> BTreeMap<String, String> {
    node.metadata.labels.clone().unwrap_or_default()
}

pub fn provenance(node: &Node) -> Option<String> {
    node.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(CUSTOM_LABELS_ANNOTATION).cloned())
}

/// Which counter a recorded failure went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Label,
    Taint,
}

/// A failure as the sink saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFailure {
    pub kind: FailureKind,
    pub name: String,
    pub namespace: String,
    pub reason: String,
}

/// MetricsSink double that keeps every report
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    failures: Mutex<Vec<RecordedFailure>>,
}

impl RecordingMetrics {
    pub fn failures(&self) -> Vec<RecordedFailure> {
        self.failures.lock().unwrap().clone()
    }

    fn record(&self, kind: FailureKind, labels: &FailureLabels<'_>) {
        self.failures.lock().unwrap().push(RecordedFailure {
            kind,
            name: labels.name.to_string(),
            namespace: labels.namespace.to_string(),
            reason: labels.reason.to_string(),
        });
    }
}

impl MetricsSink for RecordingMetrics {
    fn label_update_failed(&self, labels: &FailureLabels<'_>) {
        self.record(FailureKind::Label, labels);
    }

    fn taint_update_failed(&self, labels: &FailureLabels<'_>) {
        self.record(FailureKind::Taint, labels);
    }
}
