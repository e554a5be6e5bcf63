//! Machine resource
//!
//! Mirrors `machine.openshift.io/v1beta1` Machine. Only the fields the operator
//! reads or writes are typed; everything else is carried through `extra` so an
//! update never strips provider configuration or lifecycle hooks.

use k8s_openapi::api::core::v1::{ObjectReference, Taint};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Metadata propagated to the backing Node
    #[serde(default, skip_serializing_if = "MachineMetadata::is_empty")]
    pub metadata: MachineMetadata,

    /// Taints propagated to the backing Node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,

    /// Provider spec, provider ID, lifecycle hooks and anything else
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Subset of object metadata that machine-api embeds in machine specs and templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MachineMetadata {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.annotations.is_empty() && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Node backing this machine, set once the kubelet has registered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<ObjectReference>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Machine {
    /// Name of the backing Node, if the machine has been provisioned.
    ///
    /// An empty node reference name counts as unprovisioned.
    pub fn node_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.node_ref.as_ref())
            .and_then(|r| r.name.as_deref())
            .filter(|name| !name.is_empty())
    }

    /// Labels the machine currently wants on its Node (`spec.metadata.labels`).
    pub fn custom_labels(&self) -> &BTreeMap<String, String> {
        &self.spec.metadata.labels
    }

    /// Labels on the Machine object itself, used for selector matching.
    pub fn object_labels(&self) -> BTreeMap<String, String> {
        self.metadata.labels.clone().unwrap_or_default()
    }
}
