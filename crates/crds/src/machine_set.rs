//! MachineSet resource
//!
//! Mirrors `machine.openshift.io/v1beta1` MachineSet: a selector plus a machine
//! template whose `spec.metadata.labels` and `spec.taints` are the desired node
//! metadata for every machine the set owns.

use crate::machine::{MachineMetadata, MachineSpec};
use k8s_openapi::api::core::v1::Taint;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "MachineSet",
    namespaced,
    status = "MachineSetStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Label query over machines that should be managed by this set
    #[serde(default)]
    pub selector: LabelSelector,

    /// Template for machines created by this set
    #[serde(default)]
    pub template: MachineTemplateSpec,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineTemplateSpec {
    /// Labels stamped onto the Machine objects themselves
    #[serde(default)]
    pub metadata: MachineMetadata,

    /// Spec copied into every machine, including node labels and taints
    #[serde(default)]
    pub spec: MachineSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetStatus {
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MachineSet {
    /// Node labels requested by the template (`spec.template.spec.metadata.labels`).
    pub fn template_node_labels(&self) -> &BTreeMap<String, String> {
        &self.spec.template.spec.metadata.labels
    }

    /// Node taints requested by the template, in declaration order.
    pub fn template_taints(&self) -> &[Taint] {
        &self.spec.template.spec.taints
    }

    /// Labels the template stamps onto Machine objects.
    pub fn template_machine_labels(&self) -> &BTreeMap<String, String> {
        &self.spec.template.metadata.labels
    }
}
