//! Machine selection for a MachineSet.
//!
//! A Machine belongs to a MachineSet when it is not controlled by some other
//! owner, is not terminating, and its labels satisfy the set's selector.
//! Selectors are evaluated the Kubernetes way (`matchLabels` AND every
//! `matchExpressions` requirement), except that an empty selector selects
//! nothing: a MachineSet without a selector must never claim the whole fleet.

use crds::{Machine, MachineSet};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use kube::Resource;
use kube::core::{Selector, SelectorExt};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Why a MachineSet selector cannot be used.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector requirement has an empty key")]
    EmptyKey,

    #[error("selector operator {operator} for key {key:?} requires at least one value")]
    MissingValues { key: String, operator: String },

    #[error("selector operator {operator} for key {key:?} does not take values")]
    UnexpectedValues { key: String, operator: String },

    #[error("invalid selector: {0}")]
    Invalid(String),

    #[error("selector does not match the template labels, cannot match any machines")]
    TemplateMismatch,
}

/// A compiled label selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMatcher {
    selector: Selector,
}

impl LabelMatcher {
    /// Compile a `LabelSelector`, rejecting malformed expressions.
    ///
    /// `kube` accepts `In` with an empty value list and `Exists` with values;
    /// the API server does not, so neither do we.
    pub fn compile(selector: &LabelSelector) -> Result<Self, SelectorError> {
        if selector.match_labels.iter().flatten().any(|(key, _)| key.is_empty()) {
            return Err(SelectorError::EmptyKey);
        }

        for expr in selector.match_expressions.iter().flatten() {
            if expr.key.is_empty() {
                return Err(SelectorError::EmptyKey);
            }
            let has_values = expr.values.as_ref().is_some_and(|v| !v.is_empty());
            match expr.operator.as_str() {
                "In" | "NotIn" if !has_values => {
                    return Err(SelectorError::MissingValues {
                        key: expr.key.clone(),
                        operator: expr.operator.clone(),
                    });
                }
                "Exists" | "DoesNotExist" if has_values => {
                    return Err(SelectorError::UnexpectedValues {
                        key: expr.key.clone(),
                        operator: expr.operator.clone(),
                    });
                }
                _ => {}
            }
        }

        let selector = Selector::try_from(selector.clone()).map_err(|e| SelectorError::Invalid(e.to_string()))?;
        Ok(Self { selector })
    }

    /// True when the selector has no requirements at all.
    pub fn is_empty(&self) -> bool {
        self.selector.selects_all()
    }

    /// Standard selector semantics: every requirement must hold.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.selector.matches(labels)
    }
}

/// Compile the MachineSet selector and check it can match the set's own template.
///
/// A selector that does not match the template labels would select zero
/// machines, which is a misconfiguration rather than an empty set.
pub fn validate_machine_set(machine_set: &MachineSet) -> Result<LabelMatcher, SelectorError> {
    let matcher = LabelMatcher::compile(&machine_set.spec.selector)?;
    if !matcher.matches(machine_set.template_machine_labels()) {
        return Err(SelectorError::TemplateMismatch);
    }
    Ok(matcher)
}

/// Return the machines that belong to `machine_set`, in input order.
pub fn select_machines(machine_set: &MachineSet, machines: Vec<Machine>) -> Result<Vec<Machine>, SelectorError> {
    let matcher = validate_machine_set(machine_set)?;
    Ok(machines
        .into_iter()
        .filter(|m| !should_exclude_machine(machine_set, &matcher, m))
        .collect())
}

/// Returns true if the machine should be filtered out.
pub fn should_exclude_machine(machine_set: &MachineSet, matcher: &LabelMatcher, machine: &Machine) -> bool {
    let name = machine.metadata.name.as_deref().unwrap_or("<unknown>");

    if controller_of(&machine.metadata.owner_references).is_some() && !is_controlled_by(machine, machine_set) {
        debug!("Machine {} not controlled by MachineSet {:?}", name, machine_set.metadata.name);
        return true;
    }

    if machine.metadata.deletion_timestamp.is_some() {
        debug!("Machine {} is being deleted", name);
        return true;
    }

    if matcher.is_empty() {
        debug!("MachineSet {:?} has an empty selector", machine_set.metadata.name);
        return true;
    }

    if !matcher.matches(&machine.object_labels()) {
        debug!("Machine {} has mismatched labels", name);
        return true;
    }

    false
}

/// Whether `labels` satisfy the MachineSet selector.
///
/// Fails closed: a malformed or empty selector matches nothing.
pub fn has_matching_labels(machine_set: &MachineSet, labels: &BTreeMap<String, String>) -> bool {
    match LabelMatcher::compile(&machine_set.spec.selector) {
        Ok(matcher) => !matcher.is_empty() && matcher.matches(labels),
        Err(e) => {
            debug!("Unable to compile selector of MachineSet {:?}: {}", machine_set.metadata.name, e);
            false
        }
    }
}

/// The owner reference marked as managing controller, if any.
pub fn controller_of(owners: &Option<Vec<OwnerReference>>) -> Option<&OwnerReference> {
    owners.iter().flatten().find(|r| r.controller == Some(true))
}

/// Whether `owner` refers to an OpenShift Machine API MachineSet.
///
/// Cluster API also has a `MachineSet` kind; only the group tells them apart.
pub fn is_machine_set_reference(owner: &OwnerReference) -> bool {
    let group = MachineSet::group(&());
    owner.kind == MachineSet::kind(&())
        && owner
            .api_version
            .split_once('/')
            .is_some_and(|(owner_group, _)| owner_group == group)
}

/// Whether the machine's controller owner reference points at `machine_set` (by UID).
pub fn is_controlled_by(machine: &Machine, machine_set: &MachineSet) -> bool {
    let owner_uid = machine_set.metadata.uid.as_deref().unwrap_or_default();
    controller_of(&machine.metadata.owner_references).is_some_and(|r| r.uid == owner_uid)
}
